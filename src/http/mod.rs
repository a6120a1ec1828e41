//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, listeners)
//!     → request.rs (request ID)
//!     → pipeline.rs (validate, authenticate, rate limit, forward)
//!     → response.rs (rejections and their status codes)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::Pipeline;
pub use request::X_REQUEST_ID;
pub use response::GatewayError;
pub use server::{HttpServer, StartupError};
