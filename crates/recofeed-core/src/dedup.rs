// ── Deduplicating live list ──
//
// The admitted-id set and the ordered live list live in one struct and
// are only ever mutated together through `&mut self`, so no observer can
// see one updated without the other. Every mutation publishes a fresh
// snapshot on a `watch` channel.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use crate::model::RecommendationEvent;

pub type EventSnapshot = Arc<Vec<Arc<RecommendationEvent>>>;

/// Identifier gate plus the ordered list of admitted events.
#[derive(Debug)]
pub struct DedupCache {
    seen: HashSet<String>,
    live: Vec<Arc<RecommendationEvent>>,
    snapshot: watch::Sender<EventSnapshot>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            seen: HashSet::new(),
            live: Vec::new(),
            snapshot,
        }
    }

    /// Admit `event` if its `entity_id` has never been admitted.
    ///
    /// Returns `true` exactly once per id for the lifetime of the cache
    /// (or until [`clear`](Self::clear)). The check runs against both the
    /// set and the live list inside the same mutation that appends.
    pub fn admit(&mut self, event: RecommendationEvent) -> bool {
        if self.seen.contains(&event.entity_id)
            || self.live.iter().any(|e| e.entity_id == event.entity_id)
        {
            self.seen.insert(event.entity_id);
            return false;
        }

        self.seen.insert(event.entity_id.clone());
        self.live.push(Arc::new(event));
        self.publish();
        true
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.seen.contains(entity_id)
    }

    /// Empty the set and the list together.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.live.clear();
        self.publish();
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> EventSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EventSnapshot> {
        self.snapshot.subscribe()
    }

    fn publish(&self) {
        let values = self.live.clone();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
