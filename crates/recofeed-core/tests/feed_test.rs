// Controller behaviour tests using a scripted connector and paused time.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::{Instant, advance};
use tokio_util::sync::CancellationToken;
use url::Url;

use recofeed_api::{Connector, SseFrame, TransportError, TransportHandle, TransportSink};
use recofeed_core::{
    AUTH_EXPIRED_MESSAGE, CONNECTION_ERROR_MESSAGE, ConnectionState, EventSnapshot, FeedConfig,
    ReconnectConfig, RecommendationFeed,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct Opened {
    at: Instant,
    sink: TransportSink,
    cancel: CancellationToken,
}

/// Records every adapter the controller opens and lets the test drive it.
///
/// The returned handle closes over a detached sink, so closing it never
/// silences the recorded one: events pushed through an old sink reach the
/// controller exactly like a straggling adapter would.
#[derive(Clone, Default)]
struct ScriptedConnector {
    opens: Arc<Mutex<Vec<Opened>>>,
}

impl Connector for ScriptedConnector {
    fn open(&self, _url: &Url, sink: TransportSink) -> TransportHandle {
        let (detached_tx, _) = mpsc::unbounded_channel();
        let handle = TransportHandle::new(TransportSink::new(sink.generation(), detached_tx));
        self.opens.lock().unwrap().push(Opened {
            at: Instant::now(),
            sink,
            cancel: handle.cancellation(),
        });
        handle
    }
}

impl ScriptedConnector {
    fn count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    fn sink(&self, index: usize) -> TransportSink {
        self.opens.lock().unwrap()[index].sink.clone()
    }

    fn opened_at(&self, index: usize) -> Instant {
        self.opens.lock().unwrap()[index].at
    }

    fn cancel(&self, index: usize) -> CancellationToken {
        self.opens.lock().unwrap()[index].cancel.clone()
    }

    fn latest(&self) -> TransportSink {
        let opens = self.opens.lock().unwrap();
        opens.last().unwrap().sink.clone()
    }
}

fn config() -> FeedConfig {
    FeedConfig::new(Url::parse("http://localhost:8080").unwrap())
        .with_reconnect(ReconnectConfig::fast())
}

fn start() -> (RecommendationFeed, ScriptedConnector) {
    let connector = ScriptedConnector::default();
    let feed = RecommendationFeed::start(&config(), connector.clone());
    (feed, connector)
}

/// Let the controller task drain everything queued so far.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn elapse(duration: Duration) {
    advance(duration).await;
    settle().await;
}

fn recommendation(id: &str) -> SseFrame {
    SseFrame::message(format!(r#"{{"entityId":"{id}","message":"update for {id}"}}"#))
}

fn heartbeat() -> SseFrame {
    SseFrame::message(r#"{"entityId":"heartbeat","message":"Conexión activa"}"#)
}

fn unavailable() -> TransportError {
    TransportError::new(Some(503), "service unavailable")
}

fn ids(snapshot: &EventSnapshot) -> Vec<String> {
    snapshot.iter().map(|e| e.entity_id.clone()).collect()
}

fn awaiting(attempt: u32, secs: u64) -> ConnectionState {
    ConnectionState::AwaitingRetry {
        attempt,
        delay: Duration::from_secs(secs),
    }
}

// ── Deduplication ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn duplicate_ids_are_admitted_once() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    for id in ["c1", "c1", "c2"] {
        sink.message(recommendation(id));
    }
    settle().await;

    assert_eq!(ids(&feed.events()), vec!["c1", "c2"]);
}

#[tokio::test(start_paused = true)]
async fn clear_allows_readmission() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    sink.message(recommendation("c1"));
    settle().await;

    feed.clear().await.unwrap();
    assert!(feed.events().is_empty());

    sink.message(recommendation("c1"));
    settle().await;
    assert_eq!(ids(&feed.events()), vec!["c1"]);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_admissions() {
    let (feed, conn) = start();
    let mut stream = feed.subscribe();
    assert!(stream.current().is_empty());

    let sink = conn.sink(0);
    sink.opened();
    sink.message(recommendation("c1"));

    let snapshot = stream.changed().await.unwrap();
    assert_eq!(ids(&snapshot), vec!["c1"]);
    assert_eq!(ids(&stream.latest()), vec!["c1"]);
}

#[tokio::test(start_paused = true)]
async fn stream_adapter_yields_current_then_updates() {
    use futures_util::StreamExt;

    let (feed, conn) = start();
    let mut stream = feed.subscribe().into_stream();
    assert!(stream.next().await.unwrap().is_empty());

    let sink = conn.sink(0);
    sink.opened();
    sink.message(recommendation("c1"));
    sink.message(recommendation("c2"));
    settle().await;
    assert_eq!(ids(&stream.next().await.unwrap()), vec!["c1", "c2"]);

    feed.clear().await.unwrap();
    assert!(stream.next().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_change_nothing() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    sink.message(SseFrame::message("not json"));
    sink.message(SseFrame::message(r#"{"message":"no id"}"#));
    settle().await;

    assert!(feed.events().is_empty());
    assert!(feed.is_connected());
    assert_eq!(feed.error(), None);
}

// ── Heartbeats ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn heartbeats_never_reach_the_live_list() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    sink.message(heartbeat());
    sink.message(recommendation("c1"));
    sink.message(heartbeat());
    settle().await;

    assert_eq!(ids(&feed.events()), vec!["c1"]);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_refresh_liveness() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    settle().await;

    let before = Instant::now();
    elapse(Duration::from_secs(5)).await;
    sink.message(heartbeat());
    settle().await;

    assert_eq!(
        feed.retry_state().last_message_at,
        Some(before + Duration::from_secs(5))
    );
}

// ── Backoff ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retry_delays_double() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(unavailable());
    settle().await;
    assert_eq!(feed.state(), awaiting(1, 1));
    assert_eq!(feed.error(), Some(CONNECTION_ERROR_MESSAGE));
    assert!(!feed.is_connected());

    elapse(Duration::from_millis(999)).await;
    assert_eq!(conn.count(), 1);
    elapse(Duration::from_millis(1)).await;
    assert_eq!(conn.count(), 2);
    assert_eq!(feed.state(), ConnectionState::Connecting);

    conn.sink(1).error(unavailable());
    settle().await;
    assert_eq!(feed.state(), awaiting(2, 2));
    elapse(Duration::from_secs(2)).await;
    assert_eq!(conn.count(), 3);

    conn.sink(2).error(unavailable());
    settle().await;
    assert_eq!(feed.state(), awaiting(3, 4));
    elapse(Duration::from_secs(4)).await;
    assert_eq!(conn.count(), 4);

    let gaps: Vec<Duration> = (1..4)
        .map(|i| conn.opened_at(i) - conn.opened_at(i - 1))
        .collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn retry_delay_is_capped() {
    let (feed, conn) = start();
    settle().await;

    let mut delays = Vec::new();
    for _ in 0..8 {
        conn.latest().error(unavailable());
        settle().await;
        let delay = feed.retry_state().scheduled_delay.unwrap();
        delays.push(delay.as_secs());
        elapse(delay).await;
    }

    assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    assert_eq!(conn.count(), 9);
}

#[tokio::test(start_paused = true)]
async fn error_then_close_counts_once() {
    let (feed, conn) = start();
    settle().await;

    let sink = conn.sink(0);
    sink.error(unavailable());
    sink.closed();
    settle().await;

    assert_eq!(feed.state(), awaiting(1, 1));
    assert_eq!(feed.retry_state().attempt, 1);

    elapse(Duration::from_secs(1)).await;
    assert_eq!(conn.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn server_close_schedules_retry() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    sink.closed();
    settle().await;

    assert_eq!(feed.state(), awaiting(1, 1));
    assert_eq!(feed.error(), None);

    elapse(Duration::from_secs(1)).await;
    assert_eq!(conn.count(), 2);
}

// ── Attempt reset ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn open_resets_attempt_and_error() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(unavailable());
    elapse(Duration::from_secs(1)).await;
    conn.sink(1).opened();
    settle().await;

    assert_eq!(feed.state(), ConnectionState::Open);
    assert_eq!(feed.retry_state().attempt, 0);
    assert_eq!(feed.error(), None);

    conn.sink(1).error(unavailable());
    settle().await;
    assert_eq!(feed.state(), awaiting(1, 1));
}

#[tokio::test(start_paused = true)]
async fn recommendations_reset_attempt_but_heartbeats_do_not() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(unavailable());
    elapse(Duration::from_secs(1)).await;
    assert_eq!(feed.retry_state().attempt, 1);

    let sink = conn.sink(1);
    sink.message(heartbeat());
    settle().await;
    assert_eq!(feed.retry_state().attempt, 1);

    sink.message(recommendation("c1"));
    settle().await;
    assert_eq!(feed.retry_state().attempt, 0);
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_resets_backoff_and_cancels_retry() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(unavailable());
    elapse(Duration::from_secs(1)).await;
    conn.sink(1).error(unavailable());
    settle().await;
    assert_eq!(feed.state(), awaiting(2, 2));

    feed.reconnect().await.unwrap();
    assert_eq!(conn.count(), 3);
    assert_eq!(feed.state(), ConnectionState::Connecting);
    assert_eq!(feed.retry_state().attempt, 0);
    assert_eq!(feed.retry_state().scheduled_delay, None);
    assert_eq!(feed.error(), None);

    elapse(Duration::from_secs(10)).await;
    assert_eq!(conn.count(), 3);
}

// ── Terminal authentication failure ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unauthorized_is_terminal() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(TransportError::new(Some(401), "unauthorized"));
    settle().await;

    assert_eq!(feed.state(), ConnectionState::Failed);
    assert_eq!(feed.error(), Some(AUTH_EXPIRED_MESSAGE));
    assert!(conn.cancel(0).is_cancelled());

    elapse(Duration::from_secs(120)).await;
    assert_eq!(conn.count(), 1);
    assert_eq!(feed.state(), ConnectionState::Failed);

    feed.reconnect().await.unwrap();
    assert_eq!(conn.count(), 2);
    assert_eq!(feed.error(), None);

    conn.sink(1).opened();
    settle().await;
    assert!(feed.is_connected());
}

#[tokio::test(start_paused = true)]
async fn forbidden_is_terminal() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.error(TransportError::new(Some(403), "forbidden"));
    sink.closed();
    settle().await;

    assert_eq!(feed.state(), ConnectionState::Failed);
    elapse(Duration::from_secs(60)).await;
    assert_eq!(conn.count(), 1);
}

// ── Heartbeat watchdog ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_stream_is_replaced() {
    let (feed, conn) = start();
    conn.sink(0).opened();
    settle().await;
    let opened = Instant::now();

    for _ in 0..4 {
        elapse(Duration::from_secs(10)).await;
    }
    assert_eq!(conn.count(), 1);
    assert!(feed.is_connected());

    elapse(Duration::from_secs(10)).await;
    assert_eq!(conn.count(), 2);
    assert_eq!(conn.opened_at(1) - opened, Duration::from_secs(50));
    assert!(conn.cancel(0).is_cancelled());
    assert_eq!(feed.state(), ConnectionState::Connecting);
    assert_eq!(feed.retry_state().attempt, 0);
}

#[tokio::test(start_paused = true)]
async fn hung_handshake_after_watchdog_is_replaced() {
    let (feed, conn) = start();
    conn.sink(0).opened();
    settle().await;

    for _ in 0..5 {
        elapse(Duration::from_secs(10)).await;
    }
    assert_eq!(conn.count(), 2);
    assert_eq!(feed.state(), ConnectionState::Connecting);

    // Adapter #2 never completes its handshake.
    for _ in 0..5 {
        elapse(Duration::from_secs(10)).await;
    }
    assert_eq!(conn.count(), 3);
    assert_eq!(conn.opened_at(2) - conn.opened_at(1), Duration::from_secs(50));
    assert!(conn.cancel(1).is_cancelled());
    assert_eq!(feed.state(), ConnectionState::Connecting);
    assert_eq!(feed.error(), None);

    conn.sink(2).opened();
    settle().await;
    assert!(feed.is_connected());
}

#[tokio::test(start_paused = true)]
async fn first_handshake_that_never_completes_is_replaced() {
    let (feed, conn) = start();
    settle().await;

    for _ in 0..4 {
        elapse(Duration::from_secs(10)).await;
    }
    assert_eq!(conn.count(), 1);

    elapse(Duration::from_secs(10)).await;
    assert_eq!(conn.count(), 2);
    assert!(conn.cancel(0).is_cancelled());
    assert_eq!(feed.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_stream_alive() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    settle().await;

    for _ in 0..12 {
        elapse(Duration::from_secs(10)).await;
        sink.message(heartbeat());
        settle().await;
    }

    assert_eq!(conn.count(), 1);
    assert!(feed.is_connected());
}

// ── Generations ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retired_adapter_events_are_ignored() {
    let (feed, conn) = start();
    settle().await;
    feed.reconnect().await.unwrap();
    assert_eq!(conn.count(), 2);

    let stale = conn.sink(0);
    stale.opened();
    stale.message(recommendation("stale"));
    stale.error(TransportError::new(Some(401), "unauthorized"));
    stale.closed();
    settle().await;

    assert_eq!(feed.state(), ConnectionState::Connecting);
    assert!(feed.events().is_empty());
    assert_eq!(feed.error(), None);

    conn.sink(1).opened();
    settle().await;
    assert!(feed.is_connected());
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent() {
    let (feed, conn) = start();
    let sink = conn.sink(0);
    sink.opened();
    sink.message(recommendation("c1"));
    settle().await;

    feed.shutdown().await;
    feed.shutdown().await;

    assert_eq!(feed.state(), ConnectionState::Stopped);
    assert!(!feed.is_connected());
    assert!(conn.cancel(0).is_cancelled());
    assert_eq!(ids(&feed.events()), vec!["c1"]);

    elapse(Duration::from_secs(120)).await;
    assert_eq!(conn.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_retry() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(unavailable());
    settle().await;
    feed.shutdown().await;

    elapse(Duration::from_secs(60)).await;
    assert_eq!(conn.count(), 1);
    assert_eq!(feed.retry_state().scheduled_delay, None);

    feed.restart().await.unwrap();
    assert_eq!(conn.count(), 2);
    assert_eq!(feed.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn restart_after_auth_failure_clears_error() {
    let (feed, conn) = start();
    settle().await;

    conn.sink(0).error(TransportError::new(Some(401), "unauthorized"));
    settle().await;
    assert_eq!(feed.error(), Some(AUTH_EXPIRED_MESSAGE));

    feed.shutdown().await;
    assert_eq!(feed.error(), Some(AUTH_EXPIRED_MESSAGE));

    feed.restart().await.unwrap();
    assert_eq!(conn.count(), 2);
    assert_eq!(feed.state(), ConnectionState::Connecting);
    assert_eq!(feed.error(), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_start() {
    let connector = ScriptedConnector::default();
    let feed = RecommendationFeed::new(&config(), connector.clone());
    assert_eq!(feed.state(), ConnectionState::Idle);

    feed.shutdown().await;
    feed.shutdown().await;
    assert_eq!(feed.state(), ConnectionState::Stopped);
    assert_eq!(connector.count(), 0);

    feed.restart().await.unwrap();
    assert_eq!(connector.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_while_running_is_a_no_op() {
    let (feed, conn) = start();
    conn.sink(0).opened();
    settle().await;

    feed.restart().await.unwrap();
    assert_eq!(conn.count(), 1);
    assert!(feed.is_connected());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_feed_closes_the_adapter() {
    let (feed, conn) = start();
    conn.sink(0).opened();
    settle().await;

    let clone = feed.clone();
    drop(feed);
    settle().await;
    assert!(!conn.cancel(0).is_cancelled());

    drop(clone);
    settle().await;
    assert!(conn.cancel(0).is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn connection_state_watch_reports_transitions() {
    let (feed, conn) = start();
    let mut states = feed.connection_state();
    assert_eq!(*states.borrow(), ConnectionState::Connecting);

    conn.sink(0).opened();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Open);
}
