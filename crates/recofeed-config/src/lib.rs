//! Shared configuration for recofeed consumers.
//!
//! TOML profiles, session-token resolution (env + keyring + plaintext),
//! and translation to `recofeed_core::FeedConfig`. The CLI adds
//! `GlobalOpts`-aware overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use recofeed_core::{DEFAULT_STREAM_PATH, FeedConfig, ReconnectConfig, TlsVerification};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "recofeed";

/// Fallback token variable consulted after a profile's `token_env`.
pub const TOKEN_ENV: &str = "RECOFEED_TOKEN";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "RECOFEED_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Backoff preset: "standard" (3s base, 60s cap) or "fast" (1s, 30s).
    #[serde(default = "default_backoff")]
    pub backoff: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Connect timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            backoff: default_backoff(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_backoff() -> String {
    "standard".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "http://localhost:8080/api").
    pub base_url: String,

    /// Push endpoint path, relative to `base_url`.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Session token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the session token.
    pub token_env: Option<String>,

    /// Override the backoff preset.
    pub backoff: Option<String>,

    pub base_delay_secs: Option<u64>,
    pub max_delay_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub stale_after_secs: Option<u64>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override connect timeout.
    pub timeout: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            stream_path: default_stream_path(),
            token: None,
            token_env: None,
            backoff: None,
            base_delay_secs: None,
            max_delay_secs: None,
            heartbeat_interval_secs: None,
            stale_after_secs: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
        }
    }
}

fn default_stream_path() -> String {
    DEFAULT_STREAM_PATH.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `RECOFEED_CONFIG`, else XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    ProjectDirs::from("com", "recofeed", "recofeed").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("recofeed");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. `RECOFEED_*` variables override it, with
/// `__` separating nesting levels (`RECOFEED_DEFAULTS__TIMEOUT`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RECOFEED_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "using default configuration");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

/// Resolve the session token from the credential chain.
///
/// `token_env` → `RECOFEED_TOKEN` → system keyring → plaintext. No token
/// at all is not an error: the feed connects unauthenticated.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_token_with(profile, |env_name| std::env::var(env_name).ok(), || {
        keyring_entry(profile_name)
            .and_then(|entry| entry.get_password())
            .ok()
    })
}

fn resolve_token_with(
    profile: &Profile,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Option<SecretString> {
    let present = |v: &String| !v.is_empty();

    // 1. Profile's token_env → env var lookup
    if let Some(token) = profile
        .token_env
        .as_deref()
        .and_then(&env)
        .filter(present)
    {
        return Some(SecretString::from(token));
    }

    // 2. Global token variable
    if let Some(token) = env(TOKEN_ENV).filter(present) {
        return Some(SecretString::from(token));
    }

    // 3. System keyring
    if let Some(token) = keyring().filter(present) {
        return Some(SecretString::from(token));
    }

    // 4. Plaintext in config
    profile
        .token
        .clone()
        .filter(present)
        .map(SecretString::from)
}

/// Store a session token in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── FeedConfig translation ──────────────────────────────────────────

/// Backoff preset by name.
pub fn backoff_preset(name: &str) -> Result<ReconnectConfig, ConfigError> {
    match name {
        "standard" => Ok(ReconnectConfig::default()),
        "fast" => Ok(ReconnectConfig::fast()),
        other => Err(ConfigError::Validation {
            field: "backoff".into(),
            reason: format!("expected 'standard' or 'fast', got '{other}'"),
        }),
    }
}

/// Preset plus per-field overrides, validated.
pub fn reconnect_config(profile: &Profile, defaults: &Defaults) -> Result<ReconnectConfig, ConfigError> {
    let mut reconnect = backoff_preset(profile.backoff.as_deref().unwrap_or(&defaults.backoff))?;

    if let Some(secs) = profile.base_delay_secs {
        reconnect.base_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.max_delay_secs {
        reconnect.max_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.heartbeat_interval_secs {
        reconnect.heartbeat_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.stale_after_secs {
        reconnect.stale_after = Duration::from_secs(secs);
    }

    if reconnect.base_delay.is_zero() {
        return Err(ConfigError::Validation {
            field: "base_delay_secs".into(),
            reason: "must be at least 1 second".into(),
        });
    }
    if reconnect.max_delay < reconnect.base_delay {
        return Err(ConfigError::Validation {
            field: "max_delay_secs".into(),
            reason: "must not be smaller than base_delay_secs".into(),
        });
    }
    if reconnect.stale_after < reconnect.heartbeat_interval {
        return Err(ConfigError::Validation {
            field: "stale_after_secs".into(),
            reason: "must not be smaller than heartbeat_interval_secs".into(),
        });
    }

    Ok(reconnect)
}

fn parse_base_url(profile: &Profile) -> Result<url::Url, ConfigError> {
    profile.base_url.parse().map_err(|_| ConfigError::Validation {
        field: "base_url".into(),
        reason: format!("invalid URL: {}", profile.base_url),
    })
}

/// Check a profile without resolving its token.
pub fn validate_profile(profile: &Profile, defaults: &Defaults) -> Result<(), ConfigError> {
    parse_base_url(profile)?;
    reconnect_config(profile, defaults)?;
    Ok(())
}

/// Build a `FeedConfig` from a profile, with `defaults` filling any gaps.
pub fn profile_to_feed_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<FeedConfig, ConfigError> {
    let base_url = parse_base_url(profile)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = FeedConfig::new(base_url).with_reconnect(reconnect_config(profile, defaults)?);
    config.stream_path.clone_from(&profile.stream_path);
    config.token = resolve_token(profile, profile_name);
    config.tls = tls;
    config.connect_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(config)
}
