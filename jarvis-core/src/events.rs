//! Status events broadcast by the voice engine.
//!
//! Subscribers receive an [`EngineStatusEvent`] on every lifecycle transition.
//! Events serialise to camelCase JSON so the console app can log them verbatim
//! or forward them elsewhere.

use serde::{Deserialize, Serialize};

/// Emitted whenever the engine changes lifecycle phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Input device the engine is bound to (`None` = system default).
    pub device_index: Option<usize>,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Observable engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Stream closed; may be enabled.
    Inactive,
    /// Stream open, frames flowing into the queue.
    Listening,
    /// Stream suspended while synthesized speech plays.
    Speaking,
    /// `cleanup()` ran; the engine must be rebuilt.
    Released,
    /// A transition failed; the engine is Inactive.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_camel_case_and_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::Speaking,
            device_index: Some(3),
            detail: None,
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "speaking");
        assert_eq!(json["deviceIndex"], 3);
        assert!(json["detail"].is_null());

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::Speaking);
        assert_eq!(round_trip.device_index, Some(3));
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<EngineStatus>(r#""Listening""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
