//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → validation.rs (method, host, path traversal, declared size)
//!     → limits.rs (hard body cap while streaming)
//!     → auth.rs (block check, then credential check)
//!     → rate_limit.rs (per-client token bucket)
//!     → headers.rs (strip sensitive and hop-by-hop, add X-Forwarded-*)
//!     → Pass to forwarding
//!
//! Background:
//!     janitor.rs → sweeps idle buckets and expired blocks
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input, including X-Forwarded-For

pub mod auth;
pub mod headers;
pub mod janitor;
pub mod limits;
pub mod rate_limit;
pub mod validation;

pub use auth::AuthGuard;
pub use rate_limit::RateLimiter;
pub use validation::RequestValidator;
