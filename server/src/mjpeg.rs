use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, error};

use crate::poller::FrameSlot;

/// Multipart boundary. Browsers match it against the Content-Type header,
/// so it only has to be consistent, not unguessable.
pub const BOUNDARY: &str = "frame";

/// Frame one JPEG as a multipart part: boundary line, part headers,
/// blank line, payload, trailing CRLF.
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// `multipart/x-mixed-replace` response that serves the slot's frames
/// paced at `fps`, skipping ticks where the frame has not changed.
/// While the camera is offline the stream idles; it ends only when the
/// client disconnects.
pub fn stream_response(slot: Arc<FrameSlot>, fps: f64) -> Response {
    let tick = Duration::from_secs_f64(1.0 / fps.max(0.1));
    let interval = tokio::time::interval(tick);

    let stream = futures_util::stream::unfold(
        (slot, interval, 0u64),
        |(slot, mut interval, last_seq)| async move {
            loop {
                interval.tick().await;
                if let Some(frame) = slot.latest() {
                    if frame.seq != last_seq {
                        let seq = frame.seq;
                        let part = encode_part(&frame.data);
                        debug!(seq, bytes = part.len(), "streaming frame");
                        return Some((Ok::<_, Infallible>(part), (slot, interval, seq)));
                    }
                }
            }
        },
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(stream));

    match response {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "failed to build stream response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
