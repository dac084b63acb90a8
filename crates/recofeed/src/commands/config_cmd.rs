//! Config subcommand handlers.

use std::io::BufRead;

use serde::Serialize;
use tabled::Tabled;

use recofeed_config::{Config, Profile, backoff_preset};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, active_profile_name, apply_overrides, available_profiles};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

fn read_token(from_stdin: bool) -> Result<String, CliError> {
    let token = if from_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        line.trim().to_owned()
    } else {
        rpassword::prompt_password("Session token: ").map_err(prompt_err)?
    };

    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

/// Where a profile's token would come from, without revealing it.
fn token_source(profile: &Profile) -> &'static str {
    if profile.token_env.is_some() {
        "env"
    } else if profile.token.is_some() {
        "plaintext"
    } else {
        "keyring / RECOFEED_TOKEN"
    }
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Base URL")]
    base_url: String,
    #[tabled(rename = "Stream path")]
    stream_path: String,
    #[tabled(rename = "Backoff")]
    backoff: String,
    #[tabled(rename = "Token")]
    token: &'static str,
}

#[derive(Serialize)]
struct RedactedConfig<'a> {
    default_profile: Option<&'a str>,
    defaults: &'a recofeed_config::Defaults,
    profiles: Vec<RedactedProfile<'a>>,
}

#[derive(Serialize)]
struct RedactedProfile<'a> {
    name: &'a str,
    #[serde(flatten)]
    profile: Profile,
}

fn redacted(cfg: &Config) -> RedactedConfig<'_> {
    let mut profiles: Vec<_> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| {
            let mut profile = profile.clone();
            if profile.token.is_some() {
                profile.token = Some("***".into());
            }
            RedactedProfile {
                name: name.as_str(),
                profile,
            }
        })
        .collect();
    profiles.sort_by(|a, b| a.name.cmp(b.name));

    RedactedConfig {
        default_profile: cfg.default_profile.as_deref(),
        defaults: &cfg.defaults,
        profiles,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: profile from global flags ─────────────────────────
        ConfigCommand::Init {
            name,
            store_token,
            force,
        } => {
            let mut cfg = config::load_config()?;
            let profile_name = name.unwrap_or_else(|| active_profile_name(global, &cfg));

            if cfg.profiles.contains_key(&profile_name) && !force {
                return Err(CliError::Validation {
                    field: "profile".into(),
                    reason: format!("profile '{profile_name}' already exists (use --force to replace it)"),
                });
            }

            let Some(base_url) = global.base_url.clone() else {
                return Err(CliError::Validation {
                    field: "base_url".into(),
                    reason: "pass --base-url <URL>".into(),
                });
            };

            let mut profile = Profile::default();
            apply_overrides(&mut profile, global);
            profile.base_url = base_url;
            recofeed_config::validate_profile(&profile, &cfg.defaults)?;

            if store_token {
                let token = read_token(false)?;
                recofeed_config::store_token(&profile_name, &token)?;
                eprintln!("✓ Token stored in system keyring");
            }

            cfg.profiles.insert(profile_name.clone(), profile);
            if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(profile_name.clone());
            }
            config::save_config(&cfg)?;

            eprintln!("✓ Profile '{profile_name}' written to {}", config::config_path().display());
            eprintln!("  Try it: recofeed --profile {profile_name} watch");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show { json } => {
            let cfg = config::load_config_or_default();
            if json {
                output::print_line(&serde_json::to_string_pretty(&redacted(&cfg))?);
                return Ok(());
            }

            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: recofeed --base-url <URL> config init");
                return Ok(());
            }

            let mut rows: Vec<ProfileRow> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileRow {
                    name: name.clone(),
                    base_url: p.base_url.clone(),
                    stream_path: p.stream_path.clone(),
                    backoff: p.backoff.clone().unwrap_or_else(|| cfg.defaults.backoff.clone()),
                    token: token_source(p),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            output::print_line(&output::render_table(&rows));
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config()?;
            let profile_name = active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            match key.as_str() {
                "base_url" | "base-url" => profile.base_url = value,
                "stream_path" | "stream-path" => profile.stream_path = value,
                "token_env" | "token-env" => profile.token_env = Some(value),
                "backoff" => {
                    backoff_preset(&value)?;
                    profile.backoff = Some(value);
                }
                "base_delay_secs" => {
                    profile.base_delay_secs = Some(parse_field(&key, &value, "a number (seconds)")?);
                }
                "max_delay_secs" => {
                    profile.max_delay_secs = Some(parse_field(&key, &value, "a number (seconds)")?);
                }
                "heartbeat_interval_secs" => {
                    profile.heartbeat_interval_secs =
                        Some(parse_field(&key, &value, "a number (seconds)")?);
                }
                "stale_after_secs" => {
                    profile.stale_after_secs = Some(parse_field(&key, &value, "a number (seconds)")?);
                }
                "timeout" => {
                    profile.timeout = Some(parse_field(&key, &value, "a number (seconds)")?);
                }
                "insecure" => {
                    profile.insecure = Some(parse_field(&key, &value, "'true' or 'false'")?);
                }
                "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
                other => {
                    return Err(CliError::Validation {
                        field: other.into(),
                        reason: format!(
                            "unknown config key '{other}'. Valid keys: base_url, stream_path, \
                             token_env, backoff, base_delay_secs, max_delay_secs, \
                             heartbeat_interval_secs, stale_after_secs, timeout, insecure, ca_cert"
                        ),
                    });
                }
            }

            config::save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: recofeed --base-url <URL> config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    output::print_line(&format!("{name}{marker}"));
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { stdin } => {
            let cfg = config::load_config_or_default();
            let profile_name = active_profile_name(global, &cfg);
            let token = read_token(stdin)?;

            recofeed_config::store_token(&profile_name, &token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_line(&config::config_path().display().to_string());
            Ok(())
        }
    }
}
