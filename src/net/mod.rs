//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake, rustls via axum-server)
//!     → client_ip.rs (peer address → ClientIdentity)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Client identity is the peer IP only; forwarded-for headers are never trusted
//! - TLS is optional and handled transparently

pub mod client_ip;
pub mod tls;

pub use client_ip::ClientIdentity;
