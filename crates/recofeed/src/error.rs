//! CLI error types with miette diagnostics.
//!
//! Maps `FeedError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use recofeed_config::ConfigError;
use recofeed_core::FeedError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 4;
    pub const CONFIG: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Gave up on the event stream after {attempts} failed attempts")]
    #[diagnostic(
        code(recofeed::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Last error: {reason}"
        )
    )]
    ConnectionFailed { attempts: u32, reason: String },

    #[error("The feed stopped unexpectedly")]
    #[diagnostic(code(recofeed::feed_closed))]
    FeedClosed,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication expired, please sign in again")]
    #[diagnostic(
        code(recofeed::auth_failed),
        help(
            "The stream endpoint rejected the session token.\n\
             Store a fresh one with: recofeed config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(recofeed::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(recofeed::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: recofeed --base-url <URL> config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(recofeed::no_config),
        help(
            "Pass --base-url, or create a profile with: recofeed --base-url <URL> config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(recofeed::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode JSON: {0}")]
    #[diagnostic(code(recofeed::json))]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::FeedClosed => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } | Self::NoConfig { .. } | Self::Config(_) => {
                exit_code::CONFIG
            }
            Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }

    /// Map a feed failure, naming `profile` in any credentials hint.
    pub fn from_feed(err: FeedError, profile: &str) -> Self {
        match err {
            FeedError::TerminalAuth { .. } => Self::AuthFailed {
                profile: profile.into(),
            },
            FeedError::Config { message } => Self::Validation {
                field: "feed".into(),
                reason: message,
            },
            FeedError::Closed => Self::FeedClosed,
            other @ (FeedError::Parse { .. }
            | FeedError::TransientNetwork { .. }
            | FeedError::LivenessTimeout { .. }) => Self::ConnectionFailed {
                attempts: 0,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let auth = CliError::from_feed(FeedError::TerminalAuth { status: 401 }, "gym");
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let closed = CliError::from_feed(FeedError::Closed, "gym");
        assert_eq!(closed.exit_code(), exit_code::CONNECTION);

        let invalid = CliError::from(ConfigError::Validation {
            field: "backoff".into(),
            reason: "nope".into(),
        });
        assert_eq!(invalid.exit_code(), exit_code::USAGE);

        let missing = CliError::NoConfig {
            path: "/tmp/config.toml".into(),
        };
        assert_eq!(missing.exit_code(), exit_code::CONFIG);
    }
}
