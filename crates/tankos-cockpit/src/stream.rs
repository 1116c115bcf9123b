//! `GET /video_feed` – MJPEG over `multipart/x-mixed-replace`.
//!
//! Each client gets its own cursor over the shared frame slot.  A cursor
//! never resends a frame: it waits at least `frame_interval` between parts,
//! then short-polls the slot until a newer frame appears.  The slot's lock
//! is only held for an `Arc` clone, so any number of slow clients leave the
//! producer untouched.  Disconnecting drops the cursor mid-wait; a stop
//! request ends every stream at its next poll.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use futures_util::Stream;
use futures_util::stream;
use tankos_middleware::{Latest, StopSignal};
use tankos_perception::AnnotatedFrame;
use tracing::{Span, info};

use crate::server::GatewayState;

pub const BOUNDARY: &str = "frame";

/// Per-client pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTiming {
    pub frame_interval: Duration,
    pub poll_interval: Duration,
}

/// Serialise one frame as a multipart part, boundary line included.
pub fn encode_part(frame: &AnnotatedFrame) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nX-Sequence: {}\r\nX-Timestamp: {}\r\nContent-Length: {}\r\n\r\n",
        frame.sequence,
        frame.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        frame.jpeg.len(),
    );
    let mut part = Vec::with_capacity(header.len() + frame.jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(&frame.jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

struct FrameCursor {
    frames: Latest<AnnotatedFrame>,
    stop: StopSignal,
    timing: StreamTiming,
    last_sequence: u64,
    last_sent: Option<Instant>,
    sent: u64,
    span: Span,
}

impl FrameCursor {
    async fn next_part(&mut self) -> Option<Bytes> {
        if let Some(last) = self.last_sent {
            let since = last.elapsed();
            if since < self.timing.frame_interval {
                tokio::time::sleep(self.timing.frame_interval - since).await;
            }
        }
        loop {
            if self.stop.is_stop_requested() {
                return None;
            }
            if let Some((sequence, frame)) = self.frames.latest_after(self.last_sequence) {
                self.last_sequence = sequence;
                self.last_sent = Some(Instant::now());
                self.sent += 1;
                return Some(encode_part(&frame));
            }
            tokio::time::sleep(self.timing.poll_interval).await;
        }
    }
}

impl Drop for FrameCursor {
    fn drop(&mut self) {
        info!(parent: &self.span, frames_sent = self.sent, "stream client gone");
    }
}

/// Endless stream of multipart parts for one client.
pub fn frame_stream(
    frames: Latest<AnnotatedFrame>,
    stop: StopSignal,
    timing: StreamTiming,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let cursor = FrameCursor {
        frames,
        stop,
        timing,
        last_sequence: 0,
        last_sent: None,
        sent: 0,
        span: Span::current(),
    };
    stream::unfold(cursor, |mut cursor| async move {
        let part = cursor.next_part().await?;
        Some((Ok(part), cursor))
    })
}

/// `GET /video_feed`
pub async fn video_feed(State(state): State<GatewayState>) -> Response {
    info!("stream client connected");
    let parts = frame_stream(state.vision.frames.clone(), state.stop.clone(), state.timing);
    (
        [
            (CONTENT_TYPE, format!("multipart/x-mixed-replace; boundary={BOUNDARY}")),
            (CACHE_CONTROL, "no-cache, no-store".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}
