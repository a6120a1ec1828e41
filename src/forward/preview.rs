//! Read-through preview of an origin response body for diagnostics.

use axum::body::Body;
use hyper::body::{Body as HttpBody, Bytes};
use http_body_util::BodyExt;

use super::transport::BoxError;

/// Bytes of the first data frame shown in the log.
pub const PREVIEW_LIMIT: usize = 1024;

/// Wrap `body` so its first data frame is logged (up to `limit` bytes).
/// Frames are passed on unchanged.
pub fn inspect<B>(body: B, limit: usize) -> Body
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let mut logged = false;
    Body::new(body.map_frame(move |frame| {
        if !logged {
            if let Some(data) = frame.data_ref() {
                logged = true;
                let shown = &data[..data.len().min(limit)];
                tracing::debug!(
                    frame_bytes = data.len(),
                    preview = %String::from_utf8_lossy(shown),
                    "Origin response body preview"
                );
            }
        }
        frame
    }))
}
