// ── Facade commands ──
//
// Everything the facade asks of the controller loop flows through one
// channel, so commands are serialized with transport events and timers.

use tokio::sync::oneshot;

/// A command envelope sent through the command channel.
/// The loop acknowledges on `response_tx` once the transition is applied.
pub(crate) struct CommandEnvelope {
    pub command: FeedCommand,
    pub response_tx: oneshot::Sender<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedCommand {
    /// Begin connecting. No-op unless idle or stopped.
    Start,
    /// Manual reconnect: reset backoff, clear errors, fresh adapter now.
    Reconnect,
    /// Empty the live list and the dedup set.
    Clear,
    /// Manual stop. Idempotent.
    Stop,
}
