// ── Public facade ──
//
// `RecommendationFeed` is the only type consumers touch. It holds the
// command channel into the controller loop plus read-only views of what
// the loop publishes. Cheaply cloneable; dropping the last clone tears
// the feed down.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

use recofeed_api::{Connector, EventSourceConnector, TlsMode, TransportConfig};

use crate::command::{CommandEnvelope, FeedCommand};
use crate::config::{FeedConfig, TlsVerification};
use crate::controller::{ConnectionState, FeedController, Observers, RetryState};
use crate::dedup::{DedupCache, EventSnapshot};
use crate::error::FeedError;
use crate::stream::EventStream;

const COMMAND_CHANNEL_SIZE: usize = 64;

/// A live, deduplicated recommendation feed.
///
/// # Example
///
/// ```rust,ignore
/// let config = FeedConfig::new(Url::parse("http://localhost:8080/api")?)
///     .with_token(token);
/// let feed = RecommendationFeed::connect(&config)?;
///
/// let mut events = feed.subscribe();
/// while let Some(snapshot) = events.changed().await {
///     println!("{} recommendations", snapshot.len());
/// }
/// ```
#[derive(Clone)]
pub struct RecommendationFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    command_tx: mpsc::Sender<CommandEnvelope>,
    events: watch::Receiver<EventSnapshot>,
    state: watch::Receiver<ConnectionState>,
    error: watch::Receiver<Option<FeedError>>,
    retry: watch::Receiver<RetryState>,
    _teardown: DropGuard,
}

impl RecommendationFeed {
    /// Spawn the controller loop in [`ConnectionState::Idle`].
    /// Call [`restart()`](Self::restart) to begin connecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<C: Connector>(config: &FeedConfig, connector: C) -> Self {
        Self::spawn(config, connector, false)
    }

    /// Spawn the controller loop and open the first connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<C: Connector>(config: &FeedConfig, connector: C) -> Self {
        Self::spawn(config, connector, true)
    }

    /// Start a feed over the production SSE adapter.
    pub fn connect(config: &FeedConfig) -> Result<Self, FeedError> {
        let connector = EventSourceConnector::new(&build_transport(config))?;
        Ok(Self::start(config, connector))
    }

    fn spawn<C: Connector>(config: &FeedConfig, connector: C, autostart: bool) -> Self {
        let cache = DedupCache::new();
        let events = cache.subscribe();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);
        let (error_tx, error) = watch::channel(None);
        let (retry_tx, retry) = watch::channel(RetryState::default());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let mut controller = FeedController::new(
            connector,
            config.stream_url(),
            config.reconnect.clone(),
            cache,
            Observers {
                state: state_tx,
                error: error_tx,
                retry: retry_tx,
            },
            transport_tx,
        );
        if autostart {
            controller.start();
        }
        tokio::spawn(controller.run(command_rx, transport_rx, cancel.clone()));

        Self {
            inner: Arc::new(FeedInner {
                command_tx,
                events,
                state,
                error,
                retry,
                _teardown: cancel.drop_guard(),
            }),
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Drop all backoff and error state and connect again immediately.
    /// This is the only way out of [`ConnectionState::Failed`].
    pub async fn reconnect(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Reconnect).await
    }

    /// Empty the live list. Previously seen ids may be admitted again.
    pub async fn clear(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Clear).await
    }

    /// Start connecting again after [`shutdown()`](Self::shutdown), or for
    /// the first time after [`new()`](Self::new). No-op while running.
    pub async fn restart(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Start).await
    }

    /// Stop the feed: close the connection and cancel both timers.
    ///
    /// Idempotent, and safe before start or after the loop is gone. The
    /// live list survives; [`restart()`](Self::restart) resumes the feed.
    pub async fn shutdown(&self) {
        // `Closed` means the loop already tore everything down.
        let _ = self.send(FeedCommand::Stop).await;
    }

    async fn send(&self, command: FeedCommand) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| FeedError::Closed)?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    // ── Observation ──────────────────────────────────────────────

    /// The live list, in admission order.
    pub fn events(&self) -> EventSnapshot {
        self.inner.events.borrow().clone()
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.events.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_open()
    }

    /// User-facing error string, if any.
    pub fn error(&self) -> Option<&'static str> {
        self.inner
            .error
            .borrow()
            .as_ref()
            .and_then(FeedError::user_message)
    }

    /// The underlying failure behind [`error()`](Self::error).
    pub fn last_error(&self) -> Option<FeedError> {
        self.inner.error.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        let mut rx = self.inner.state.clone();
        rx.borrow_and_update();
        rx
    }

    pub fn retry_state(&self) -> RetryState {
        *self.inner.retry.borrow()
    }
}

/// Build a `TransportConfig` from the feed's TLS and timeout settings.
fn build_transport(config: &FeedConfig) -> TransportConfig {
    let tls = match &config.tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    };
    TransportConfig {
        tls,
        connect_timeout: config.connect_timeout,
    }
}
