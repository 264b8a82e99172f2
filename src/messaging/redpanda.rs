use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use super::{headers, EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::store::OutboxMessage;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Redpanda (Kafka protocol) publisher
// ============================================================================

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(brokers: &str, message_timeout_ms: u64, metrics: Arc<Metrics>) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", message_timeout_ms.to_string())
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::Config(format!("Failed to create Redpanda producer: {}", e)))?;

        // Configure circuit breaker for Redpanda
        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,                   // Open after 5 failures
            timeout: Duration::from_secs(30),       // Wait 30s before probing
            success_threshold: 3,                   // Need 3 successes to close
        };

        tracing::info!(brokers = %brokers, "📡 Redpanda producer created");

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda", cb_config).with_metrics(metrics),
            send_timeout: Duration::from_millis(message_timeout_ms),
        })
    }

    fn record_headers(message: &OutboxMessage) -> OwnedHeaders {
        let event_id = message.event_id.to_string();
        let correlation_id = message.correlation_id.to_string();

        OwnedHeaders::new()
            .insert(Header {
                key: headers::EVENT_ID,
                value: Some(event_id.as_str()),
            })
            .insert(Header {
                key: headers::EVENT_TYPE,
                value: Some(message.event_type.as_str()),
            })
            .insert(Header {
                key: headers::CORRELATION_ID,
                value: Some(correlation_id.as_str()),
            })
    }
}

#[async_trait]
impl EventPublisher for RedpandaClient {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        let key = message.key();

        // Use circuit breaker to protect against Redpanda failures
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&message.topic)
                    .key(&key)
                    .payload(&message.payload)
                    .headers(Self::record_headers(message));

                self.producer
                    .send(record, Timeout::After(self.send_timeout))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| PublishError::Broker(e.to_string()))
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    topic = %message.topic,
                    key = %key,
                    event_id = %message.event_id,
                    event_type = %message.event_type,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    topic = %message.topic,
                    "Circuit breaker open - Redpanda unavailable"
                );
                Err(PublishError::CircuitOpen(self.circuit_breaker.name()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    topic = %message.topic,
                    event_id = %message.event_id,
                    "Failed to publish to Redpanda"
                );
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "redpanda"
    }

    async fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.circuit_breaker.state().await)
    }
}
