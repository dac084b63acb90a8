//! JSON payload carried in the `data:` field of each stream event.

use serde::{Deserialize, Serialize};

/// Reserved identity value the server uses for liveness pings.
pub const HEARTBEAT_SENTINEL: &str = "heartbeat";

/// A recommendation frame as the server sends it.
///
/// Field aliases accept the original backend's Spanish names
/// (`claseId`, `mensaje`, `prioridad`, `nombreClase`) alongside the
/// English ones. `timestamp` is kept raw: the server emits ISO strings,
/// `[y, m, d, h, mi, s, nanos]` arrays, or `{year, monthValue, ...}`
/// objects depending on its serializer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecommendation {
    /// Subject identity; absent only on marker-style heartbeats.
    #[serde(default, alias = "claseId", alias = "classId")]
    pub entity_id: Option<String>,

    #[serde(default, alias = "mensaje")]
    pub message: Option<String>,

    #[serde(default, alias = "prioridad")]
    pub priority: Option<i64>,

    #[serde(default, alias = "nombreClase")]
    pub class_name: Option<String>,

    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,

    /// Explicit `"heartbeat": true` marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<bool>,

    /// Explicit `"type": "heartbeat"` marker.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl WireRecommendation {
    /// Returns `true` if any heartbeat signal is present on the payload.
    pub fn is_heartbeat(&self) -> bool {
        self.entity_id.as_deref() == Some(HEARTBEAT_SENTINEL)
            || self.heartbeat == Some(true)
            || self
                .kind
                .as_deref()
                .is_some_and(|k| k.eq_ignore_ascii_case(HEARTBEAT_SENTINEL))
    }
}
