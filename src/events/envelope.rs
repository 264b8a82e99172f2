use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use anyhow::Result;

// ============================================================================
// Event Envelope - Industry Standard Event Metadata
// ============================================================================
//
// Wraps domain events with the metadata every consumer relies on:
// a unique event id for deduplication (delivery is at-least-once), the event
// type, the emitting aggregate, and a correlation id for tracing.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub event_type: String,
    pub event_version: i32,
    pub aggregate_id: Uuid,

    // Causation & Correlation (for distributed tracing)
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,

    // Timing
    pub timestamp: DateTime<Utc>,

    // Event Payload
    pub payload: E,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(payload: E, correlation_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type().to_string(),
            event_version: 1,
            aggregate_id: payload.aggregate_id(),
            correlation_id,
            causation_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.payload.routing_key()
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All events published through the outbox implement this trait.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Wire name, e.g. `ORDER_CREATED`.
    fn event_type(&self) -> &'static str;

    fn aggregate_id(&self) -> Uuid;

    /// Broker routing key / topic, e.g. `order.created`.
    fn routing_key(&self) -> &'static str;
}

// ============================================================================
// Event Serialization Helpers
// ============================================================================

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn deserialize_event<E: DeserializeOwned>(json: &str) -> Result<E> {
    Ok(serde_json::from_str(json)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestEvent {
        id: Uuid,
        data: String,
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str { "TEST_EVENT" }
        fn aggregate_id(&self) -> Uuid { self.id }
        fn routing_key(&self) -> &'static str { "test.event" }
    }

    #[test]
    fn test_event_envelope_creation() {
        let aggregate_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let envelope = EventEnvelope::new(
            TestEvent { id: aggregate_id, data: "test".to_string() },
            correlation_id,
        );

        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.event_type, "TEST_EVENT");
        assert_eq!(envelope.correlation_id, correlation_id);
        assert_eq!(envelope.routing_key(), "test.event");
        assert!(envelope.causation_id.is_none());
    }

    #[test]
    fn test_envelopes_get_unique_event_ids() {
        let event = TestEvent { id: Uuid::new_v4(), data: "x".to_string() };
        let a = EventEnvelope::new(event.clone(), Uuid::new_v4());
        let b = EventEnvelope::new(event, Uuid::new_v4());
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = EventEnvelope::new(
            TestEvent { id: Uuid::new_v4(), data: "test data".to_string() },
            Uuid::new_v4(),
        );

        let json = serialize_event(&envelope).unwrap();
        assert!(json.contains("\"eventId\""));
        assert!(json.contains("\"correlationId\""));

        let deserialized: EventEnvelope<TestEvent> = deserialize_event(&json).unwrap();
        assert_eq!(envelope, deserialized);
    }
}
