// ── Runtime feed configuration ──
//
// These types describe *where* the stream lives and *how* to recover from
// failures. They never touch disk: recofeed-config (or any other
// collaborator) builds a `FeedConfig` and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Default endpoint path, appended to the base URL.
pub const DEFAULT_STREAM_PATH: &str = "/recommendations/stream";

/// Reconnection and liveness tuning.
///
/// Retry delay after the n-th consecutive failure is
/// `min(max_delay, base_delay * 2^(n-1))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 3s.
    pub base_delay: Duration,

    /// Upper bound on the retry delay. Default: 60s.
    pub max_delay: Duration,

    /// How often the heartbeat watchdog checks for silence. Default: 10s.
    pub heartbeat_interval: Duration,

    /// Silence longer than this forces a reconnect. Default: 45s.
    pub stale_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(45),
        }
    }
}

impl ReconnectConfig {
    /// Tighter profile: 1s base, 30s cap.
    pub fn fast() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development backends).
    DangerAcceptInvalid,
}

/// Configuration for one feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Backend base URL (e.g., `http://localhost:8080/api`).
    pub base_url: Url,
    /// Path of the push endpoint, relative to `base_url`.
    pub stream_path: String,
    /// Session token, sent as `?token=`; absent means connect unauthenticated.
    pub token: Option<SecretString>,
    /// Backoff and heartbeat tuning.
    pub reconnect: ReconnectConfig,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Connect timeout for each attempt.
    pub connect_timeout: Duration,
}

impl FeedConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            stream_path: DEFAULT_STREAM_PATH.into(),
            token: None,
            reconnect: ReconnectConfig::default(),
            tls: TlsVerification::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Full endpoint URL: `base_url + stream_path`, plus `?token=` when
    /// a non-empty token is configured.
    pub fn stream_url(&self) -> Url {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        );
        url.set_path(&path);

        if let Some(token) = &self.token {
            let token = token.expose_secret();
            if !token.is_empty() {
                url.query_pairs_mut().append_pair("token", token);
            }
        }
        url
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(base: &str) -> FeedConfig {
        FeedConfig::new(Url::parse(base).unwrap())
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(3));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.stale_after, Duration::from_secs(45));
    }

    #[test]
    fn fast_profile_keeps_liveness_settings() {
        let fast = ReconnectConfig::fast();
        assert_eq!(fast.base_delay, Duration::from_secs(1));
        assert_eq!(fast.max_delay, Duration::from_secs(30));
        assert_eq!(fast.stale_after, Duration::from_secs(45));
    }

    #[test]
    fn stream_url_without_token() {
        let url = config("http://localhost:8080").stream_url();
        assert_eq!(url.as_str(), "http://localhost:8080/recommendations/stream");
    }

    #[test]
    fn stream_url_keeps_base_path() {
        let url = config("https://gym.example.com/api/").stream_url();
        assert_eq!(url.as_str(), "https://gym.example.com/api/recommendations/stream");
    }

    #[test]
    fn stream_url_encodes_token() {
        let url = config("http://localhost:8080")
            .with_token(SecretString::from("a.b/c=d&e".to_string()))
            .stream_url();
        let token: Vec<_> = url.query_pairs().filter(|(k, _)| k == "token").collect();
        assert_eq!(token.len(), 1);
        assert_eq!(token[0].1, "a.b/c=d&e");
        assert!(!url.as_str().contains("c=d&e"));
    }

    #[test]
    fn empty_token_is_omitted() {
        let url = config("http://localhost:8080")
            .with_token(SecretString::from(String::new()))
            .stream_url();
        assert_eq!(url.query(), None);
    }
}
