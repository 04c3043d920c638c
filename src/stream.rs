//! Multipart frame streaming.
//!
//! Annotated JPEG frames are published on a per-session broadcast channel and
//! wrapped in `multipart/x-mixed-replace` framing: a fixed boundary token and
//! a per-part `Content-Type` header, the format browser `<img>` tags consume
//! directly. A stream ends when its session leaves the active phase.

use std::sync::Arc;

use log::debug;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const BOUNDARY: &str = "frame";

/// Value for the `Content-Type` header of the overall response.
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

/// Wrap one encoded JPEG as a multipart part.
pub(crate) fn encode_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// One consumer's view of a session's annotated frames.
///
/// Subscribers that fall behind the broadcast buffer skip frames rather than
/// stall the capture loop.
pub struct FrameStream {
    rx: broadcast::Receiver<Arc<Vec<u8>>>,
    cancel: CancellationToken,
}

impl FrameStream {
    pub(crate) fn new(rx: broadcast::Receiver<Arc<Vec<u8>>>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next multipart-framed part, or `None` once the session has stopped.
    pub async fn next_part(&mut self) -> Option<Vec<u8>> {
        loop {
            tokio::select! {
                result = self.rx.recv() => match result {
                    Ok(jpeg) => return Some(encode_part(&jpeg)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("stream consumer lagged, skipped {skipped} frames");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                _ = self.cancel.cancelled() => return None,
            }
        }
    }
}
