// ── Frame classification ──
//
// Splits inbound frames into liveness pings, recommendations, and
// undecodable noise. Only recommendations carry display payload.

use chrono::{DateTime, Utc};

use recofeed_api::{HEARTBEAT_SENTINEL, SseFrame, WireRecommendation};

use crate::model::RecommendationEvent;
use crate::timestamp::normalize_timestamp_at;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Liveness signal only.
    Heartbeat,
    /// A display payload with its timestamp already normalized.
    Recommendation(RecommendationEvent),
    /// Not decodable as a recommendation frame. Dropped.
    ParseError { reason: String },
}

pub fn classify(frame: &SseFrame) -> Classified {
    classify_at(frame, Utc::now())
}

/// Classify with an explicit processing instant for the timestamp fallback.
pub fn classify_at(frame: &SseFrame, now: DateTime<Utc>) -> Classified {
    if frame
        .event
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(HEARTBEAT_SENTINEL))
    {
        return Classified::Heartbeat;
    }

    let wire: WireRecommendation = match serde_json::from_str(&frame.data) {
        Ok(wire) => wire,
        Err(e) => {
            return Classified::ParseError {
                reason: e.to_string(),
            };
        }
    };

    if wire.is_heartbeat() {
        return Classified::Heartbeat;
    }

    let Some(entity_id) = wire.entity_id.filter(|id| !id.is_empty()) else {
        return Classified::ParseError {
            reason: "missing entity id".into(),
        };
    };

    Classified::Recommendation(RecommendationEvent {
        entity_id,
        message: wire.message,
        class_name: wire.class_name,
        priority: wire.priority,
        timestamp: normalize_timestamp_at(wire.timestamp.as_ref(), now),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2030-06-15T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn classify_data(data: &str) -> Classified {
        classify_at(&SseFrame::message(data), now())
    }

    #[test]
    fn recommendation_with_array_timestamp() {
        let got = classify_data(
            r#"{"claseId":"YOGA-101","nombreClase":"Yoga","mensaje":"Cupo disponible","prioridad":1,
                "timestamp":[2026,2,10,9,15,0]}"#,
        );
        assert_eq!(
            got,
            Classified::Recommendation(RecommendationEvent {
                entity_id: "YOGA-101".into(),
                message: Some("Cupo disponible".into()),
                class_name: Some("Yoga".into()),
                priority: Some(1),
                timestamp: "2026-02-10T09:15:00.000Z".into(),
            })
        );
    }

    #[test]
    fn missing_timestamp_uses_processing_time() {
        match classify_data(r#"{"entityId":"c1"}"#) {
            Classified::Recommendation(ev) => assert_eq!(ev.timestamp, "2030-06-15T08:00:00.000Z"),
            other => panic!("expected recommendation, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_identity_is_heartbeat() {
        assert_eq!(
            classify_data(r#"{"entityId":"heartbeat","message":"Conexión activa"}"#),
            Classified::Heartbeat
        );
    }

    #[test]
    fn named_heartbeat_event_skips_payload_parsing() {
        let frame = SseFrame {
            event: Some("heartbeat".into()),
            data: "ping".into(),
            id: None,
        };
        assert_eq!(classify_at(&frame, now()), Classified::Heartbeat);
    }

    #[test]
    fn malformed_payloads_are_parse_errors() {
        for data in ["not json", "[1,2,3]", "\"c1\"", "{\"entityId\": 5}"] {
            assert!(
                matches!(classify_data(data), Classified::ParseError { .. }),
                "expected parse error for {data}"
            );
        }
    }

    #[test]
    fn missing_or_empty_identity_is_parse_error() {
        assert!(matches!(
            classify_data(r#"{"message":"orphan"}"#),
            Classified::ParseError { .. }
        ));
        assert!(matches!(
            classify_data(r#"{"entityId":""}"#),
            Classified::ParseError { .. }
        ));
    }
}
