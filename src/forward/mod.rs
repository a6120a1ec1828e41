//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted request
//!     → engine.rs (URI rewrite, header policy, deadline, error mapping)
//!     → transport.rs (pooled hyper-util client, handshake deadline)
//!     → tls.rs (rustls config for the origin's trust tier)
//!     → origin
//! Origin response
//!     → engine.rs (response header policy)
//!     → preview.rs (diagnostic body preview, debug mode only)
//!     → client
//! ```

pub mod engine;
pub mod preview;
pub mod tls;
pub mod transport;

pub use engine::{EngineError, ForwardingEngine, OriginTarget};
