//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive from the HTTP body in arbitrary chunks; [`SseDecoder`]
//! reassembles lines across chunk boundaries and dispatches one
//! [`SseFrame`] per blank-line-terminated event, following the WHATWG
//! event-stream parsing rules.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::Error;

const BOM: &str = "\u{FEFF}";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Value of the `event:` field, if the server named the event.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id in effect when this event was dispatched.
    pub id: Option<String>,
}

impl SseFrame {
    /// A bare `message` frame carrying `data`.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

/// Line-oriented decoder state.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    /// Previous chunk ended on `\r`; a leading `\n` belongs to that line break.
    pending_cr: bool,
    seen_first_line: bool,

    event: Option<String>,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\r' => {
                    self.pending_cr = true;
                    frames.extend(self.end_line());
                }
                b'\n' => frames.extend(self.end_line()),
                _ => self.line.push(byte),
            }
        }

        frames
    }

    /// Reconnection time most recently advertised via `retry:`.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Last event id seen on the stream.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn end_line(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();

        if !self.seen_first_line {
            self.seen_first_line = true;
            if let Some(stripped) = line.strip_prefix(BOM) {
                line = stripped.to_owned();
            }
        }

        if line.is_empty() {
            return self.dispatch();
        }

        // Comment line, typically a keep-alive from the server.
        if line.starts_with(':') {
            tracing::trace!(comment = %&line[1..], "SSE comment");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        self.apply_field(field, value);
        None
    }

    fn apply_field(&mut self, field: &str, value: &str) {
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_owned());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            other => tracing::trace!(field = other, "ignoring unknown SSE field"),
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseFrame {
            event: event.filter(|e| !e.is_empty()),
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        })
    }
}

/// Decode a response body into a stream of [`SseFrame`]s.
///
/// A body error ends the stream with [`Error::Stream`]. An event left
/// incomplete at end-of-body is discarded.
pub fn frames<S, E>(body: S) -> impl Stream<Item = Result<SseFrame, Error>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        futures_util::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Stream(e.to_string()))?;
            for frame in decoder.feed(&chunk) {
                yield frame;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_single_data_event() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed(b"data: {\"entityId\":\"c1\"}\n\n");
        assert_eq!(frames, vec![SseFrame::message("{\"entityId\":\"c1\"}")]);
    }

    #[test]
    fn joins_multiline_data() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed(b"data: first\ndata: second\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "first\nsecond");
    }

    #[test]
    fn reassembles_across_chunk_boundaries() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"event: heart").is_empty());
        assert!(dec.feed(b"beat\r").is_empty());
        assert!(dec.feed(b"\ndata: {}\r").is_empty());
        let frames = dec.feed(b"\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("heartbeat"));
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn accepts_bare_carriage_returns() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed(b"data: a\r\rdata: b\r\r");
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b"]);
    }

    #[test]
    fn skips_comments_and_empty_events() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed(b": keep-alive\n\nevent: ping\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn event_type_does_not_leak_into_next_event() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed(b"event: custom\ndata: 1\n\ndata: 2\n\n");
        assert_eq!(frames[0].event.as_deref(), Some("custom"));
        assert_eq!(frames[1].event, None);
    }

    #[test]
    fn tracks_id_and_retry() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed(b"id: 42\nretry: 1500\ndata: x\n\ndata: y\n\n");
        assert_eq!(frames[0].id.as_deref(), Some("42"));
        assert_eq!(frames[1].id.as_deref(), Some("42"));
        assert_eq!(dec.last_event_id(), Some("42"));
        assert_eq!(dec.retry(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn ignores_non_numeric_retry() {
        let mut dec = SseDecoder::new();
        dec.feed(b"retry: soon\n\n");
        assert_eq!(dec.retry(), None);
    }

    #[test]
    fn strips_leading_bom_and_handles_fieldless_colon() {
        let mut dec = SseDecoder::new();
        let frames = dec.feed("\u{FEFF}data\ndata:no-space\n\n".as_bytes());
        assert_eq!(frames[0].data, "\nno-space");
    }

    #[tokio::test]
    async fn frames_stream_surfaces_body_errors() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err("connection reset".into()),
        ];
        let stream = frames(futures_util::stream::iter(chunks));
        futures_util::pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.data, "one");

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Stream(ref msg) if msg.contains("reset")));
        assert!(stream.next().await.is_none());
    }
}
