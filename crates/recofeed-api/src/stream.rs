//! Push-endpoint transport adapter.
//!
//! One [`TransportHandle`] owns one connection to the event stream. The
//! adapter reports its lifecycle through a [`TransportSink`] as tagged
//! [`TransportEvent`]s (open, message, error, close) and never retries on
//! its own: reconnection policy belongs entirely to the consumer.
//!
//! # Example
//!
//! ```rust,ignore
//! use recofeed_api::stream::{Connector, EventSourceConnector, TransportSink};
//! use tokio::sync::mpsc;
//! use url::Url;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let connector = EventSourceConnector::new(&TransportConfig::default())?;
//! let url = Url::parse("http://localhost:8080/recommendations/stream")?;
//!
//! let handle = connector.open(&url, TransportSink::new(1, tx));
//! while let Some(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! handle.close();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::sse::{self, SseFrame};
use crate::transport::TransportConfig;

/// Tag identifying one adapter instance. Strictly increasing per consumer.
pub type Generation = u64;

// ── Events ───────────────────────────────────────────────────────────

/// Failure details reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// HTTP status of the rejected handshake, when there was one.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Returns `true` for 401/403 rejections.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }
}

impl From<&Error> for TransportError {
    fn from(err: &Error) -> Self {
        Self::new(err.status(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Message(SseFrame),
    Error(TransportError),
    Closed,
}

/// A lifecycle event tagged with the generation of the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

// ── TransportSink ────────────────────────────────────────────────────

/// Where an adapter delivers its events.
///
/// Clones share one "closed" latch: the first `closed()` call from any
/// clone emits [`TransportEventKind::Closed`], and every emission after
/// that is suppressed.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl TransportSink {
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            generation,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn opened(&self) {
        self.emit(TransportEventKind::Opened);
    }

    pub fn message(&self, frame: SseFrame) {
        self.emit(TransportEventKind::Message(frame));
    }

    pub fn error(&self, error: TransportError) {
        self.emit(TransportEventKind::Error(error));
    }

    /// Report termination. Only the first call has any effect.
    pub fn closed(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.send(TransportEventKind::Closed);
    }

    fn emit(&self, kind: TransportEventKind) {
        if self.is_closed() {
            return;
        }
        self.send(kind);
    }

    fn send(&self, kind: TransportEventKind) {
        // Ignore send errors -- the consumer is gone and nobody is listening.
        let _ = self.tx.send(TransportEvent {
            generation: self.generation,
            kind,
        });
    }
}

// ── TransportHandle ──────────────────────────────────────────────────

/// Handle to one live adapter instance.
#[derive(Debug)]
pub struct TransportHandle {
    sink: TransportSink,
    cancel: CancellationToken,
}

impl TransportHandle {
    pub fn new(sink: TransportSink) -> Self {
        Self {
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.sink.generation()
    }

    /// Token the connection task watches; cancelled by [`close`](Self::close).
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Close the connection.
    ///
    /// Safe to call repeatedly and from any phase (before the handshake
    /// completes, while streaming, or after the remote end hung up).
    /// Emits `Closed` at most once across local and remote termination.
    pub fn close(&self) {
        self.cancel.cancel();
        self.sink.closed();
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Opens adapter instances. Must be called from within a Tokio runtime.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url, sink: TransportSink) -> TransportHandle;
}

/// Production adapter: HTTP GET with `Accept: text/event-stream`.
#[derive(Debug, Clone)]
pub struct EventSourceConnector {
    client: reqwest::Client,
}

impl EventSourceConnector {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            client: config.build_client()?,
        })
    }

    /// Wrap an existing `reqwest::Client` (used by tests).
    pub fn from_reqwest(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Connector for EventSourceConnector {
    fn open(&self, url: &Url, sink: TransportSink) -> TransportHandle {
        let handle = TransportHandle::new(sink.clone());
        let cancel = handle.cancellation();
        let client = self.client.clone();
        let url = url.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(generation = sink.generation(), "event stream cancelled");
                }
                () = connect_and_read(&client, &url, &sink) => {}
            }
            sink.closed();
        });

        handle
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one stream connection and read frames until it drops.
async fn connect_and_read(client: &reqwest::Client, url: &Url, sink: &TransportSink) {
    let generation = sink.generation();
    // The query string may carry the session token; keep it out of logs.
    tracing::info!(
        host = url.host_str().unwrap_or(""),
        path = url.path(),
        generation,
        "Connecting to event stream"
    );

    let response = match client
        .get(url.clone())
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let err = Error::Transport(e.without_url());
            tracing::warn!(error = %err, generation, "Event stream connect failed");
            sink.error(TransportError::from(&err));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let err = Error::Http {
            status: status.as_u16(),
        };
        tracing::warn!(status = status.as_u16(), generation, "Event stream handshake rejected");
        sink.error(TransportError::from(&err));
        return;
    }

    tracing::info!(generation, "Event stream connected");
    sink.opened();

    let frames = sse::frames(response.bytes_stream());
    futures_util::pin_mut!(frames);

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => sink.message(frame),
            Err(err) => {
                tracing::warn!(error = %err, generation, "Event stream interrupted");
                sink.error(TransportError::from(&err));
                return;
            }
        }
    }

    tracing::info!(generation, "Event stream ended");
}

// ── Tests ────────────────────────────────────────────────────────────
