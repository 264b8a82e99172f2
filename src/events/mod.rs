// ============================================================================
// Events - Generic envelope and domain event abstraction
// ============================================================================
//
// No domain-specific code lives here; order events implement `DomainEvent`
// in `domain::order::events`.
//
// ============================================================================

pub mod envelope;

pub use envelope::{deserialize_event, serialize_event, DomainEvent, EventEnvelope};
