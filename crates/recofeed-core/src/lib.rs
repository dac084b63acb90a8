// recofeed-core: Live recommendation feed between recofeed-api and consumers (CLI).

pub mod classify;
pub mod config;
pub mod controller;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod model;
pub mod stream;
pub mod timestamp;

mod command;

// ── Primary re-exports ──────────────────────────────────────────────
pub use classify::{Classified, classify};
pub use config::{DEFAULT_STREAM_PATH, FeedConfig, ReconnectConfig, TlsVerification};
pub use controller::{ConnectionState, RetryState, calculate_backoff};
pub use dedup::{DedupCache, EventSnapshot};
pub use error::{AUTH_EXPIRED_MESSAGE, CONNECTION_ERROR_MESSAGE, FeedError};
pub use feed::RecommendationFeed;
pub use model::{Priority, RecommendationEvent};
pub use stream::{EventStream, EventWatchStream};
pub use timestamp::{normalize_timestamp, normalize_timestamp_at};
