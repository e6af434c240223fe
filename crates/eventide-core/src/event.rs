//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// An immutable, versioned fact about one aggregate.
///
/// The serialized form doubles as the wire envelope used by publishers and
/// by inbound event delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Type name of the aggregate this event belongs to.
    pub aggregate_type: String,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Position within the aggregate stream, starting at 1.
    pub version: i64,
    /// Timestamp of event creation.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub data: serde_json::Value,
}

impl Event {
    /// Decodes the payload into its typed form.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadDecode` if the payload does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.data.clone()).map_err(|source| DomainError::PayloadDecode {
            event_type: self.event_type.clone(),
            source,
        })
    }

    /// Returns `true` if this event carries the payload type `T`.
    #[must_use]
    pub fn is<T: EventPayload>(&self) -> bool {
        self.event_type == T::EVENT_TYPE
    }

    /// Encodes the event as its JSON wire envelope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the envelope cannot be encoded.
    pub fn to_envelope(&self) -> Result<Vec<u8>, DomainError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Trait that all event payload types implement.
///
/// The event type name is bound to the payload type statically, so names
/// never have to be derived from values at runtime.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The registered event type name.
    const EVENT_TYPE: &'static str;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Renamed {
        name: String,
    }

    impl EventPayload for Renamed {
        const EVENT_TYPE: &'static str = "Renamed";
    }

    fn renamed_event(data: serde_json::Value) -> Event {
        Event {
            aggregate_id: "A1".into(),
            aggregate_type: "Thing".into(),
            event_type: Renamed::EVENT_TYPE.into(),
            version: 1,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            data,
        }
    }

    #[test]
    fn test_decode_returns_typed_payload() {
        let event = renamed_event(json!({"name": "widget"}));

        let payload: Renamed = event.decode().unwrap();

        assert_eq!(payload.name, "widget");
        assert!(event.is::<Renamed>());
    }

    #[test]
    fn test_decode_reports_event_type_on_shape_mismatch() {
        let event = renamed_event(json!({"title": 42}));

        let err = event.decode::<Renamed>().unwrap_err();

        match err {
            DomainError::PayloadDecode { event_type, .. } => assert_eq!(event_type, "Renamed"),
            other => panic!("expected PayloadDecode, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_carries_all_fields() {
        let event = renamed_event(json!({"name": "widget"}));

        let envelope: serde_json::Value =
            serde_json::from_slice(&event.to_envelope().unwrap()).unwrap();

        assert_eq!(envelope["aggregate_id"], "A1");
        assert_eq!(envelope["aggregate_type"], "Thing");
        assert_eq!(envelope["event_type"], "Renamed");
        assert_eq!(envelope["version"], 1);
        assert_eq!(envelope["timestamp"], "2026-01-15T10:00:00Z");
        assert_eq!(envelope["data"]["name"], "widget");
    }
}
