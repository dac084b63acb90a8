// ── Reconnection controller ──
//
// The single event loop that owns one feed: the current transport
// adapter, the retry timer, the heartbeat watchdog and the dedup cache.
// Transport events, facade commands and both timers are branches of one
// `select!`, so no two transitions can interleave.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use recofeed_api::{
    Connector, Generation, SseFrame, TransportError, TransportEvent, TransportEventKind,
    TransportHandle, TransportSink,
};

use crate::classify::{Classified, classify};
use crate::command::{CommandEnvelope, FeedCommand};
use crate::config::ReconnectConfig;
use crate::dedup::DedupCache;
use crate::error::FeedError;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created but never started.
    Idle,
    Connecting,
    Open,
    /// A retry is scheduled after `delay`.
    AwaitingRetry { attempt: u32, delay: Duration },
    /// Credentials rejected. Only a manual reconnect leaves this state.
    Failed,
    Stopped,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Backoff bookkeeping, published after every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive failures since the last open, message or manual reconnect.
    pub attempt: u32,
    /// When the last open event or message (heartbeats included) arrived.
    pub last_message_at: Option<Instant>,
    /// Delay of the pending retry, if one is scheduled.
    pub scheduled_delay: Option<Duration>,
}

/// Delay before retry number `attempt`: `min(max_delay, base_delay * 2^(attempt-1))`.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.saturating_sub(1);
    2u32.checked_pow(exponent)
        .and_then(|factor| config.base_delay.checked_mul(factor))
        .map_or(config.max_delay, |delay| delay.min(config.max_delay))
}

/// Watch senders the controller publishes through.
pub(crate) struct Observers {
    pub state: watch::Sender<ConnectionState>,
    pub error: watch::Sender<Option<FeedError>>,
    pub retry: watch::Sender<RetryState>,
}

// ── FeedController ───────────────────────────────────────────────

pub(crate) struct FeedController<C> {
    connector: C,
    url: Url,
    reconnect: ReconnectConfig,
    cache: DedupCache,
    observers: Observers,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    generation: Generation,
    current: Option<TransportHandle>,
    retry: RetryState,
    retry_deadline: Option<Instant>,
    watchdog: Option<Interval>,
    /// When the current adapter was opened; bounds a handshake that never completes.
    connecting_since: Option<Instant>,
    manual_disconnect: bool,
}

impl<C: Connector> FeedController<C> {
    pub(crate) fn new(
        connector: C,
        url: Url,
        reconnect: ReconnectConfig,
        cache: DedupCache,
        observers: Observers,
        transport_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            connector,
            url,
            reconnect,
            cache,
            observers,
            transport_tx,
            generation: 0,
            current: None,
            retry: RetryState::default(),
            retry_deadline: None,
            watchdog: None,
            connecting_since: None,
            manual_disconnect: false,
        }
    }

    /// Drive the feed until cancelled or every facade handle is gone.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<CommandEnvelope>,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.stop();
                    break;
                }
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else {
                        self.stop();
                        break;
                    };
                    self.handle_command(envelope.command);
                    let _ = envelope.response_tx.send(());
                }
                Some(event) = transport_rx.recv() => self.handle_transport(event),
                () = sleep_until_opt(self.retry_deadline) => self.on_retry_due(),
                () = tick_opt(&mut self.watchdog) => self.on_watchdog_tick(),
            }
        }
        debug!(generation = self.generation, "feed controller exited");
    }

    fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Start => self.start(),
            FeedCommand::Reconnect => self.manual_reconnect(),
            FeedCommand::Clear => {
                self.cache.clear();
                debug!("live list cleared");
            }
            FeedCommand::Stop => self.stop(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Begin connecting. Ignored unless idle or stopped.
    pub(crate) fn start(&mut self) {
        let state = self.state();
        if !matches!(state, ConnectionState::Idle | ConnectionState::Stopped) {
            debug!(?state, "start ignored, feed already running");
            return;
        }
        self.manual_disconnect = false;
        self.retry.attempt = 0;
        self.observers.error.send_replace(None);
        self.connect();
    }

    fn manual_reconnect(&mut self) {
        info!(generation = self.generation, "manual reconnect requested");
        self.manual_disconnect = false;
        self.retry.attempt = 0;
        self.observers.error.send_replace(None);
        self.connect();
    }

    /// Manual stop. Safe in every state, including before start.
    fn stop(&mut self) {
        self.manual_disconnect = true;
        self.watchdog = None;
        self.connecting_since = None;
        self.retry_deadline = None;
        self.retry.scheduled_delay = None;
        self.close_current();

        if self.state() != ConnectionState::Stopped {
            info!(generation = self.generation, "feed stopped");
            self.set_state(ConnectionState::Stopped);
        }
        self.publish_retry();
    }

    /// Replace the current adapter with a fresh one.
    fn connect(&mut self) {
        self.close_current();
        self.retry_deadline = None;
        self.retry.scheduled_delay = None;

        self.generation += 1;
        let sink = TransportSink::new(self.generation, self.transport_tx.clone());
        debug!(
            generation = self.generation,
            attempt = self.retry.attempt,
            "opening transport adapter"
        );
        self.current = Some(self.connector.open(&self.url, sink));

        let now = Instant::now();
        self.connecting_since = Some(now);
        self.arm_watchdog(now);
        self.set_state(ConnectionState::Connecting);
        self.publish_retry();
    }

    fn close_current(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.close();
        }
    }

    // ── Transport events ─────────────────────────────────────────

    fn handle_transport(&mut self, event: TransportEvent) {
        if event.generation != self.generation || self.current.is_none() {
            trace!(
                generation = event.generation,
                current = self.generation,
                "ignoring event from retired adapter"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_open(),
            TransportEventKind::Message(frame) => self.on_message(&frame),
            TransportEventKind::Error(err) => self.on_error(&err),
            TransportEventKind::Closed => self.on_close(),
        }
    }

    fn on_open(&mut self) {
        let now = Instant::now();
        info!(generation = self.generation, "event stream open");

        self.retry = RetryState {
            attempt: 0,
            last_message_at: Some(now),
            scheduled_delay: None,
        };
        self.retry_deadline = None;
        self.observers.error.send_replace(None);
        self.set_state(ConnectionState::Open);
        self.arm_watchdog(now);
        self.publish_retry();
    }

    fn on_message(&mut self, frame: &SseFrame) {
        match classify(frame) {
            Classified::Heartbeat => {
                trace!(generation = self.generation, "heartbeat");
                self.retry.last_message_at = Some(Instant::now());
            }
            Classified::Recommendation(event) => {
                self.retry.last_message_at = Some(Instant::now());
                self.retry.attempt = 0;

                let entity_id = event.entity_id.clone();
                if self.cache.admit(event) {
                    debug!(entity_id = %entity_id, "recommendation admitted");
                } else {
                    debug!(entity_id = %entity_id, "duplicate recommendation dropped");
                }
            }
            Classified::ParseError { reason } => {
                debug!(
                    error = %FeedError::Parse { reason },
                    generation = self.generation,
                    "dropping frame"
                );
                return;
            }
        }
        self.publish_retry();
    }

    fn on_error(&mut self, err: &TransportError) {
        let failure = FeedError::from_transport(err);

        if failure.is_terminal() {
            error!(
                status = ?err.status,
                generation = self.generation,
                "stream endpoint rejected credentials, not retrying"
            );
            self.watchdog = None;
            self.connecting_since = None;
            self.retry_deadline = None;
            self.retry.scheduled_delay = None;
            self.close_current();
            self.observers.error.send_replace(Some(failure));
            self.set_state(ConnectionState::Failed);
            self.publish_retry();
            return;
        }

        warn!(
            error = %err.message,
            status = ?err.status,
            generation = self.generation,
            "event stream error"
        );
        self.observers.error.send_replace(Some(failure));
        self.schedule_retry();
    }

    fn on_close(&mut self) {
        match self.state() {
            ConnectionState::Failed
            | ConnectionState::Stopped
            | ConnectionState::AwaitingRetry { .. } => {}
            _ => {
                info!(generation = self.generation, "event stream closed by server");
                self.schedule_retry();
            }
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    /// Count one failure and arm the retry timer. A failure reported as
    /// both an error and a close is only counted once.
    fn schedule_retry(&mut self) {
        if self.manual_disconnect || self.retry_deadline.is_some() {
            return;
        }

        self.retry.attempt = self.retry.attempt.saturating_add(1);
        let attempt = self.retry.attempt;
        let delay = calculate_backoff(attempt, &self.reconnect);

        self.retry_deadline = Some(Instant::now() + delay);
        self.retry.scheduled_delay = Some(delay);
        self.close_current();

        warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        self.set_state(ConnectionState::AwaitingRetry { attempt, delay });
        self.publish_retry();
    }

    fn on_retry_due(&mut self) {
        self.retry_deadline = None;
        if self.manual_disconnect {
            return;
        }
        info!(attempt = self.retry.attempt, "reconnecting");
        self.connect();
    }

    /// Start the watchdog unless it is already ticking. A zero heartbeat
    /// interval disables it.
    fn arm_watchdog(&mut self, now: Instant) {
        let period = self.reconnect.heartbeat_interval;
        if self.watchdog.is_none() && !period.is_zero() {
            let mut interval = tokio::time::interval_at(now + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.watchdog = Some(interval);
        }
    }

    /// Replace an adapter that has been silent, or stuck in its handshake,
    /// for longer than `stale_after`.
    fn on_watchdog_tick(&mut self) {
        if !matches!(
            self.state(),
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            return;
        }
        let Some(last) = self.retry.last_message_at.max(self.connecting_since) else {
            return;
        };

        let idle = last.elapsed();
        if idle <= self.reconnect.stale_after {
            return;
        }

        let timeout = FeedError::LivenessTimeout {
            idle_secs: idle.as_secs(),
        };
        warn!(error = %timeout, generation = self.generation, "forcing reconnect");
        self.connect();
    }

    // ── Publishing ───────────────────────────────────────────────

    fn state(&self) -> ConnectionState {
        *self.observers.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.observers.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn publish_retry(&self) {
        self.observers.retry.send_replace(self.retry);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(watchdog: &mut Option<Interval>) {
    match watchdog {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let config = ReconnectConfig::fast();
        let delays: Vec<u64> = (1..=5)
            .map(|n| calculate_backoff(n, &config).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn backoff_is_capped() {
        let config = ReconnectConfig::default();
        assert_eq!(calculate_backoff(5, &config), Duration::from_secs(48));
        assert_eq!(calculate_backoff(6, &config), Duration::from_secs(60));
        assert_eq!(calculate_backoff(40, &config), Duration::from_secs(60));
        assert_eq!(calculate_backoff(u32::MAX, &config), Duration::from_secs(60));
    }

    #[test]
    fn backoff_never_decreases() {
        let config = ReconnectConfig::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..100 {
            let delay = calculate_backoff(attempt, &config);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn only_open_counts_as_connected() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(
            !ConnectionState::AwaitingRetry {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .is_open()
        );
    }
}
