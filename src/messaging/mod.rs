use async_trait::async_trait;

use crate::store::OutboxMessage;
use crate::utils::{CircuitState, IsTransient};

mod memory;
mod redpanda;

pub use memory::InMemoryPublisher;
pub use redpanda::RedpandaClient;

// ============================================================================
// Messaging - broker boundary used by the outbox relay
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(&'static str),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Publisher configuration error: {0}")]
    Config(String),
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        matches!(self, PublishError::Broker(_))
    }
}

/// Header names attached to every published record.
pub mod headers {
    pub const EVENT_ID: &str = "event-id";
    pub const EVENT_TYPE: &str = "event-type";
    pub const CORRELATION_ID: &str = "correlation-id";
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes to `message.topic`, keyed by the order id.
    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError>;

    fn name(&self) -> &'static str;

    /// Breaker state, when the publisher has one.
    async fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_broker_errors_are_transient() {
        assert!(PublishError::Broker("timeout".into()).is_transient());
        assert!(!PublishError::CircuitOpen("redpanda").is_transient());
        assert!(!PublishError::Config("bad brokers".into()).is_transient());
    }
}
