// ── Core error types ──
//
// The failure taxonomy of the feed. None of these propagate to the
// consumer as faults: the controller handles every one locally and the
// consumer only ever sees the connected flag and `user_message()`.

use thiserror::Error;

use recofeed_api::TransportError;

/// Shown when the endpoint rejects our credentials. Retries are disabled.
pub const AUTH_EXPIRED_MESSAGE: &str = "Authentication expired, please sign in again";

/// Shown while transient failures are being retried.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error, retrying…";

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    // ── Stream failures ──────────────────────────────────────────────
    /// A frame could not be decoded. Dropped without any state change.
    #[error("Malformed stream frame: {reason}")]
    Parse { reason: String },

    /// Network or server failure; retried with backoff.
    #[error("Connection error: {message}")]
    TransientNetwork {
        message: String,
        /// HTTP status of the rejected handshake (if applicable).
        status: Option<u16>,
    },

    /// 401/403 from the endpoint. Terminal until a manual reconnect.
    #[error("Authentication rejected by stream endpoint (HTTP {status})")]
    TerminalAuth { status: u16 },

    /// Connection looked open but went silent past the staleness threshold.
    #[error("No message received for {idle_secs}s")]
    LivenessTimeout { idle_secs: u64 },

    // ── Setup errors ─────────────────────────────────────────────────
    #[error("Invalid feed configuration: {message}")]
    Config { message: String },

    /// The controller task is gone (feed dropped or runtime shut down).
    #[error("Feed controller is no longer running")]
    Closed,
}

impl FeedError {
    /// Map an adapter-reported failure into the taxonomy.
    pub fn from_transport(err: &TransportError) -> Self {
        match err.status {
            Some(status @ (401 | 403)) => Self::TerminalAuth { status },
            status => Self::TransientNetwork {
                message: err.message.clone(),
                status,
            },
        }
    }

    /// The string surfaced to the consumer, if this error is user-visible.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::TerminalAuth { .. } => Some(AUTH_EXPIRED_MESSAGE),
            Self::TransientNetwork { .. } => Some(CONNECTION_ERROR_MESSAGE),
            Self::Parse { .. } | Self::LivenessTimeout { .. } | Self::Config { .. } | Self::Closed => None,
        }
    }

    /// Returns `true` if automatic recovery is disabled for this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminalAuth { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<recofeed_api::Error> for FeedError {
    fn from(err: recofeed_api::Error) -> Self {
        match err {
            recofeed_api::Error::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            recofeed_api::Error::Tls(message) => Self::Config { message },
            other => Self::from_transport(&TransportError::from(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_terminal() {
        let err = FeedError::from_transport(&TransportError::new(Some(403), "forbidden"));
        assert_eq!(err, FeedError::TerminalAuth { status: 403 });
        assert!(err.is_terminal());
        assert_eq!(err.user_message(), Some(AUTH_EXPIRED_MESSAGE));
    }

    #[test]
    fn other_failures_are_transient() {
        let err = FeedError::from_transport(&TransportError::new(None, "connection reset"));
        assert!(!err.is_terminal());
        assert_eq!(err.user_message(), Some(CONNECTION_ERROR_MESSAGE));
    }

    #[test]
    fn parse_errors_are_silent() {
        let err = FeedError::Parse {
            reason: "expected value".into(),
        };
        assert_eq!(err.user_message(), None);
    }

    #[test]
    fn api_errors_convert() {
        let err = FeedError::from(recofeed_api::Error::Http { status: 401 });
        assert_eq!(err, FeedError::TerminalAuth { status: 401 });

        let err = FeedError::from(recofeed_api::Error::Tls("bad cert".into()));
        assert!(matches!(err, FeedError::Config { .. }));
    }
}
