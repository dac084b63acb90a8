use thiserror::Error;

/// Top-level error type for the `recofeed-api` crate.
///
/// Covers every failure mode of the push transport: URL construction,
/// HTTP handshake, body streaming, and client setup.
/// `recofeed-core` classifies these into transient vs terminal failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing or joining failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered the handshake with a non-success status.
    #[error("Stream endpoint rejected the connection (HTTP {status})")]
    Http { status: u16 },

    /// The response body failed mid-stream.
    #[error("Event stream interrupted: {0}")]
    Stream(String),

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// HTTP-like status code carried by this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if the server refused our credentials (401/403).
    ///
    /// Retrying these only hammers an endpoint that will keep rejecting.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        !self.is_auth_failure() && !matches!(self, Self::InvalidUrl(_) | Self::Tls(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_not_transient() {
        for status in [401, 403] {
            let err = Error::Http { status };
            assert!(err.is_auth_failure());
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http { status: 503 };
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_auth_failure());
        assert!(err.is_transient());
    }

    #[test]
    fn stream_errors_carry_no_status() {
        let err = Error::Stream("connection reset".into());
        assert_eq!(err.status(), None);
        assert!(err.is_transient());
    }
}
