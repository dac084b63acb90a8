//! Clap derive structures for the `recofeed` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// recofeed -- watch live class recommendations
#[derive(Debug, Parser)]
#[command(
    name = "recofeed",
    version,
    about = "Watch a live recommendation feed from the command line",
    long_about = "Subscribes to a backend's recommendation push endpoint (Server-Sent Events),\n\
        deduplicates recommendations by subject, and keeps the connection alive\n\
        with heartbeat supervision and exponential backoff.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "RECOFEED_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend base URL (overrides profile)
    #[arg(long, short = 'u', env = "RECOFEED_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Push endpoint path relative to the base URL (overrides profile)
    #[arg(long, global = true)]
    pub stream_path: Option<String>,

    /// Session token (overrides every other token source)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Reconnect backoff preset
    #[arg(long, value_enum, global = true)]
    pub backoff: Option<BackoffPreset>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress connection status output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "RECOFEED_INSECURE", global = true)]
    pub insecure: bool,

    /// Connect timeout in seconds
    #[arg(long, env = "RECOFEED_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Shared Enums ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackoffPreset {
    /// 3s base delay, 60s cap
    Standard,
    /// 1s base delay, 30s cap
    Fast,
}

impl BackoffPreset {
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Fast => "fast",
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream recommendations as they arrive
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Print one JSON object per recommendation instead of styled lines
    #[arg(long)]
    pub json: bool,

    /// Exit after this many recommendations have been admitted
    #[arg(long, value_name = "N")]
    pub exit_after: Option<usize>,

    /// Exit with an error once this many consecutive retries have failed
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Stop watching after this long (e.g. "30s", "5m")
    #[arg(long = "for", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile
    Init {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        name: Option<String>,

        /// Prompt for a session token and store it in the system keyring
        #[arg(long)]
        store_token: bool,

        /// Overwrite an existing profile
        #[arg(long)]
        force: bool,
    },

    /// Display configured profiles
    Show {
        /// Print the configuration as JSON (tokens redacted)
        #[arg(long)]
        json: bool,
    },

    /// Set a profile value
    Set {
        /// Profile key (e.g., "base_url", "backoff", "stale_after_secs")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a session token in the system keyring (for the active profile)
    SetToken {
        /// Read the token from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
