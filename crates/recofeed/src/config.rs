//! Profile resolution with CLI flag overrides.
//!
//! This is the single boundary where CLI flags and `recofeed_config`
//! profiles turn into a `recofeed_core::FeedConfig`.

use secrecy::SecretString;

use recofeed_config::{Config, Profile};
use recofeed_core::FeedConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use recofeed_config::{config_path, load_config, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names, for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// Apply flag overrides (flag > env > profile) onto a profile.
pub fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref url) = global.base_url {
        profile.base_url.clone_from(url);
    }
    if let Some(ref path) = global.stream_path {
        profile.stream_path.clone_from(path);
    }
    if let Some(preset) = global.backoff {
        profile.backoff = Some(preset.name().into());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}

/// Build the feed configuration for the active profile.
///
/// Returns the profile name alongside, for diagnostics. Without a saved
/// profile, `--base-url` alone is enough.
pub fn build_feed_config(global: &GlobalOpts) -> Result<(String, FeedConfig), CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                available: available_profiles(&cfg),
                name: profile_name,
            });
        }
        None if global.base_url.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };
    apply_overrides(&mut profile, global);

    let mut feed = recofeed_config::profile_to_feed_config(&profile, &profile_name, &cfg.defaults)?;
    if let Some(ref token) = global.token {
        feed.token = Some(SecretString::from(token.clone()));
    }

    tracing::debug!(
        profile = %profile_name,
        stream_path = %feed.stream_path,
        authenticated = feed.token.is_some(),
        "resolved feed configuration"
    );
    Ok((profile_name, feed))
}
