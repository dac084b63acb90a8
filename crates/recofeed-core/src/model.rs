// ── Recommendation domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Presentation category derived from the wire `priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// 1: a slot opened up.
    SlotOpened,
    /// 2: the schedule changed.
    ScheduleChanged,
    /// 3: the class is now full.
    Full,
    /// Anything else, or no priority at all.
    Uncategorized,
}

impl From<Option<i64>> for Priority {
    fn from(raw: Option<i64>) -> Self {
        match raw {
            Some(1) => Self::SlotOpened,
            Some(2) => Self::ScheduleChanged,
            Some(3) => Self::Full,
            _ => Self::Uncategorized,
        }
    }
}

/// An admitted recommendation. Immutable once it reaches the live list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    /// Subject identity (e.g. a class id); the deduplication key.
    pub entity_id: String,
    pub message: Option<String>,
    pub class_name: Option<String>,
    /// Raw wire priority. Drives presentation only.
    pub priority: Option<i64>,
    /// Canonical RFC 3339 timestamp.
    pub timestamp: String,
}

impl RecommendationEvent {
    pub fn category(&self) -> Priority {
        Priority::from(self.priority)
    }

    /// Best human-readable line for this event.
    pub fn headline(&self) -> &str {
        self.message
            .as_deref()
            .or(self.class_name.as_deref())
            .unwrap_or(&self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(priority: Option<i64>) -> RecommendationEvent {
        RecommendationEvent {
            entity_id: "YOGA-101".into(),
            message: None,
            class_name: None,
            priority,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn priority_categories() {
        assert_eq!(event(Some(1)).category(), Priority::SlotOpened);
        assert_eq!(event(Some(2)).category(), Priority::ScheduleChanged);
        assert_eq!(event(Some(3)).category(), Priority::Full);
        assert_eq!(event(Some(4)).category(), Priority::Uncategorized);
        assert_eq!(event(None).category(), Priority::Uncategorized);
    }

    #[test]
    fn headline_falls_back_to_entity_id() {
        let mut ev = event(None);
        assert_eq!(ev.headline(), "YOGA-101");
        ev.class_name = Some("Yoga".into());
        assert_eq!(ev.headline(), "Yoga");
        ev.message = Some("Slot open in Yoga".into());
        assert_eq!(ev.headline(), "Slot open in Yoga");
    }

    #[test]
    fn priority_display_is_snake_case() {
        assert_eq!(Priority::SlotOpened.to_string(), "slot_opened");
    }
}
