//! Request body size enforcement.
//!
//! # Responsibilities
//! - Wrap every inbound body in a hard byte cap, declared length or not
//! - Record an overrun so the forwarding layer can answer 413 instead of 502
//!
//! # Design Decisions
//! - The cap is enforced while streaming; nothing is buffered up front
//! - The overrun is signalled through a flag in the request extensions, since
//!   by the time it trips the body has been handed to the HTTP client

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use http_body_util::{BodyExt, LengthLimitError, Limited};

/// Set once a capped body has produced more bytes than allowed.
#[derive(Debug, Clone, Default)]
pub struct BodyOverflow(Arc<AtomicBool>);

impl BodyOverflow {
    pub fn tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Replace the body of `request` with one that fails after `max_bytes`.
///
/// The returned request carries a [`BodyOverflow`] extension tied to the cap.
pub fn cap_body(request: Request<Body>, max_bytes: usize) -> Request<Body> {
    let (mut parts, body) = request.into_parts();

    let overflow = BodyOverflow::default();
    let flag = overflow.clone();
    let capped = Limited::new(body, max_bytes).map_err(move |err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            flag.trip();
        }
        err
    });

    parts.extensions.insert(overflow);
    Request::from_parts(parts, Body::new(capped))
}
