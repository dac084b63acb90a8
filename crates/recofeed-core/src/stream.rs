// ── Reactive live-list subscription ──
//
// Consumers get point-in-time snapshots of the live list plus change
// notification, without ever holding a mutable path into it.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::dedup::EventSnapshot;

/// A subscription to the live recommendation list.
pub struct EventStream {
    current: EventSnapshot,
    receiver: watch::Receiver<EventSnapshot>,
}

impl EventStream {
    pub(crate) fn new(mut receiver: watch::Receiver<EventSnapshot>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time (or the last `changed()`).
    pub fn current(&self) -> &EventSnapshot {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> EventSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the feed controller has shut down.
    pub async fn changed(&mut self) -> Option<EventSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> EventWatchStream {
        EventWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one after every
/// admission or clear.
pub struct EventWatchStream {
    inner: WatchStream<EventSnapshot>,
}

impl Stream for EventWatchStream {
    type Item = EventSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
