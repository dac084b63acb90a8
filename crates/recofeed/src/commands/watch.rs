//! `recofeed watch`: print recommendations as they are admitted.

use std::sync::Arc;

use tokio::time::Instant;

use recofeed_core::{
    ConnectionState, EventSnapshot, FeedError, RecommendationEvent, RecommendationFeed,
};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (profile_name, config) = crate::config::build_feed_config(global)?;
    let feed = RecommendationFeed::connect(&config)
        .map_err(|e| CliError::from_feed(e, &profile_name))?;

    let result = watch(&feed, args, global, &profile_name).await;
    feed.shutdown().await;
    result
}

async fn watch(
    feed: &RecommendationFeed,
    args: &WatchArgs,
    global: &GlobalOpts,
    profile_name: &str,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let deadline = args.duration.map(|d| Instant::now() + d);
    let mut events = feed.subscribe();
    let mut states = feed.connection_state();
    let mut cursor = Cursor::default();

    // Anything admitted or failed before the subscriptions existed.
    let initial = *states.borrow();
    if let Some(line) = output::render_state(initial, feed.error(), color) {
        output::print_status(&line, global.quiet);
    }
    if print_new(events.current(), &mut cursor, args, color)? {
        return Ok(());
    }
    check_state(initial, feed, args, profile_name)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                return Ok(());
            }
            () = sleep_until_opt(deadline) => return Ok(()),
            snapshot = events.changed() => {
                let Some(snapshot) = snapshot else {
                    return Err(CliError::FeedClosed);
                };
                if print_new(&snapshot, &mut cursor, args, color)? {
                    return Ok(());
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Err(CliError::FeedClosed);
                }
                let state = *states.borrow_and_update();
                if let Some(line) = output::render_state(state, feed.error(), color) {
                    output::print_status(&line, global.quiet);
                }
                check_state(state, feed, args, profile_name)?;
            }
        }
    }
}

/// Position in the live list across snapshots.
#[derive(Debug, Default)]
struct Cursor {
    last: Option<Arc<RecommendationEvent>>,
    printed: usize,
}

impl Cursor {
    /// Entries admitted since the previous call. The last printed entry is
    /// matched by identity; once a clear has dropped it, the whole list is new.
    fn advance<'a>(&mut self, snapshot: &'a EventSnapshot) -> &'a [Arc<RecommendationEvent>] {
        let start = self
            .last
            .as_ref()
            .and_then(|last| snapshot.iter().position(|e| Arc::ptr_eq(e, last)))
            .map_or(0, |i| i + 1);
        let fresh = snapshot.get(start..).unwrap_or_default();
        if let Some(last) = fresh.last() {
            self.last = Some(Arc::clone(last));
        }
        self.printed += fresh.len();
        fresh
    }
}

/// Print entries not printed yet. Returns `true` once `--exit-after` is met.
fn print_new(
    snapshot: &EventSnapshot,
    cursor: &mut Cursor,
    args: &WatchArgs,
    color: bool,
) -> Result<bool, CliError> {
    for event in cursor.advance(snapshot) {
        let line = if args.json {
            output::render_event_json(event)?
        } else {
            output::render_event(event, color)
        };
        output::print_line(&line);
    }

    Ok(args.exit_after.is_some_and(|n| cursor.printed >= n))
}

/// Turn terminal or exhausted states into an exit error.
fn check_state(
    state: ConnectionState,
    feed: &RecommendationFeed,
    args: &WatchArgs,
    profile_name: &str,
) -> Result<(), CliError> {
    match state {
        ConnectionState::Failed => Err(CliError::from_feed(
            feed.last_error()
                .unwrap_or(FeedError::TerminalAuth { status: 401 }),
            profile_name,
        )),
        ConnectionState::AwaitingRetry { attempt, .. }
            if args.max_attempts.is_some_and(|max| attempt >= max) =>
        {
            Err(CliError::ConnectionFailed {
                attempts: attempt,
                reason: feed
                    .last_error()
                    .map_or_else(|| "connection closed".into(), |e| e.to_string()),
            })
        }
        _ => Ok(()),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
