//! Output formatting for recommendations and connection status.
//!
//! Styled lines use `owo-colors`, JSON lines use serde, profile listings
//! use `tabled`.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use recofeed_core::{ConnectionState, Priority, RecommendationEvent};

use crate::cli::ColorMode;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Icon shown next to each category.
pub fn icon(category: Priority) -> &'static str {
    match category {
        Priority::SlotOpened => "✓",
        Priority::ScheduleChanged => "↻",
        Priority::Full => "✕",
        Priority::Uncategorized => "ℹ",
    }
}

fn paint(category: Priority, text: &str, color: bool) -> String {
    if !color {
        return text.to_owned();
    }
    match category {
        Priority::SlotOpened => text.green().to_string(),
        Priority::ScheduleChanged => text.yellow().to_string(),
        Priority::Full => text.red().to_string(),
        Priority::Uncategorized => text.blue().to_string(),
    }
}

// ── Recommendations ──────────────────────────────────────────────────

/// One styled line: icon, headline, subject and timestamp.
pub fn render_event(event: &RecommendationEvent, color: bool) -> String {
    let category = event.category();
    let marker = paint(category, icon(category), color);
    let subject = match &event.class_name {
        Some(name) if event.message.is_some() => format!("{name} · {}", event.entity_id),
        _ => event.entity_id.clone(),
    };
    let meta = format!("[{subject}] {}", event.timestamp);
    let meta = if color {
        meta.dimmed().to_string()
    } else {
        meta
    };
    format!("{marker} {}  {meta}", event.headline())
}

#[derive(Serialize)]
struct EventRecord<'a> {
    #[serde(flatten)]
    event: &'a RecommendationEvent,
    category: Priority,
}

/// One compact JSON object per line.
pub fn render_event_json(event: &RecommendationEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EventRecord {
        event,
        category: event.category(),
    })
}

// ── Connection status ────────────────────────────────────────────────

/// Human-readable status line, or `None` for states not worth reporting.
pub fn render_state(state: ConnectionState, error: Option<&str>, color: bool) -> Option<String> {
    let line = match state {
        ConnectionState::Idle => return None,
        ConnectionState::Connecting => "… connecting".to_owned(),
        ConnectionState::Open => {
            let text = "● connected";
            if color { text.green().to_string() } else { text.to_owned() }
        }
        ConnectionState::AwaitingRetry { attempt, delay } => {
            let reason = error.unwrap_or("Connection closed");
            let text = format!(
                "↺ {reason} (attempt {attempt}, next try in {})",
                humantime::format_duration(delay)
            );
            if color { text.yellow().to_string() } else { text }
        }
        ConnectionState::Failed => {
            let text = format!("✕ {}", error.unwrap_or("Connection failed"));
            if color { text.red().to_string() } else { text }
        }
        ConnectionState::Stopped => "■ stopped".to_owned(),
    };
    Some(line)
}

// ── Tables ───────────────────────────────────────────────────────────

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a line to stdout. Write failures (closed pipe) are ignored.
pub fn print_line(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}

/// Print a status line to stderr unless quiet.
pub fn print_status(line: &str, quiet: bool) {
    if !quiet {
        eprintln!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(priority: Option<i64>) -> RecommendationEvent {
        RecommendationEvent {
            entity_id: "YOGA-101".into(),
            message: Some("Slot open in Yoga".into()),
            class_name: Some("Yoga".into()),
            priority,
            timestamp: "2026-02-10T09:15:00.000Z".into(),
        }
    }

    #[test]
    fn plain_event_line() {
        assert_eq!(
            render_event(&event(Some(1)), false),
            "✓ Slot open in Yoga  [Yoga · YOGA-101] 2026-02-10T09:15:00.000Z"
        );
        assert!(render_event(&event(Some(3)), false).starts_with("✕ "));
        assert!(render_event(&event(None), false).starts_with("ℹ "));
    }

    #[test]
    fn json_line_includes_category() {
        let line = render_event_json(&event(Some(2))).unwrap_or_default();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap_or_default();
        assert_eq!(value["entity_id"], "YOGA-101");
        assert_eq!(value["category"], "schedule_changed");
    }

    #[test]
    fn retry_status_mentions_delay() {
        let line = render_state(
            ConnectionState::AwaitingRetry {
                attempt: 2,
                delay: Duration::from_secs(6),
            },
            Some("Connection error, retrying…"),
            false,
        );
        assert_eq!(
            line.as_deref(),
            Some("↺ Connection error, retrying… (attempt 2, next try in 6s)")
        );
        assert_eq!(render_state(ConnectionState::Idle, None, false), None);
    }
}
