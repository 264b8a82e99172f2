use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::messaging::{EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::store::{OrderStore, OutboxMessage, StoreError};
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Outbox Relay - publishes committed events to the broker
// ============================================================================
//
// Delivery is at-least-once: a message is marked published only after the
// broker acknowledged it, so a crash in between republishes it.
//
// Per-order ordering: once a message for an order fails in a pass, later
// messages for the same order wait for the next pass.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct OutboxRelayConfig {
    pub batch_size: usize,
    /// Failed relay passes before a message is dead-lettered
    pub max_attempts: i32,
    pub retry: RetryConfig,
}

impl Default for OutboxRelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 5,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub deferred: usize,
}

pub struct OutboxRelay {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    config: OutboxRelayConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        config: OutboxRelayConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            config,
        }
    }

    pub fn publisher(&self) -> &Arc<dyn EventPublisher> {
        &self.publisher
    }

    /// One relay pass over the oldest pending messages.
    pub async fn relay_pending(&self) -> Result<RelayReport, StoreError> {
        let batch = self.store.pending_outbox(self.config.batch_size).await?;
        let mut report = RelayReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let total = batch.len();
        let mut blocked: HashSet<Uuid> = HashSet::new();

        for (index, message) in batch.into_iter().enumerate() {
            if blocked.contains(&message.aggregate_id) {
                report.deferred += 1;
                continue;
            }

            let outcome = retry_with_backoff(
                &self.config.retry,
                "outbox_publish",
                Some(&self.metrics),
                |_attempt| self.publisher.publish(&message),
            )
            .await;

            match outcome {
                RetryResult::Success { .. } => {
                    self.store.mark_published(message.id).await?;
                    self.metrics.record_publish(&message.event_type, true);
                    report.published += 1;
                }
                RetryResult::Aborted {
                    error: PublishError::CircuitOpen(breaker),
                    ..
                } => {
                    // Broker is known to be down; leave the rest for a later pass.
                    report.deferred += total - index;
                    tracing::warn!(
                        breaker = breaker,
                        deferred = total - index,
                        "Circuit open, deferring remaining outbox messages"
                    );
                    break;
                }
                RetryResult::Exhausted { error, .. } | RetryResult::Aborted { error, .. } => {
                    blocked.insert(message.aggregate_id);
                    self.metrics.record_publish(&message.event_type, false);
                    self.handle_failure(&message, &error.to_string(), &mut report)
                        .await?;
                }
            }
        }

        if report.published > 0 || report.failed > 0 {
            tracing::info!(
                published = report.published,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                deferred = report.deferred,
                "📤 Outbox relay pass completed"
            );
        }
        Ok(report)
    }

    async fn handle_failure(
        &self,
        message: &OutboxMessage,
        error: &str,
        report: &mut RelayReport,
    ) -> Result<(), StoreError> {
        let attempts = self.store.record_publish_failure(message.id, error).await?;
        report.failed += 1;

        if attempts < self.config.max_attempts {
            tracing::warn!(
                event_id = %message.event_id,
                event_type = %message.event_type,
                attempts = attempts,
                max_attempts = self.config.max_attempts,
                error = %error,
                "Outbox message publish failed, will retry"
            );
            return Ok(());
        }

        let mut parked = message.clone();
        parked.attempts = attempts;
        self.store.dead_letter(&parked, error).await?;
        self.metrics.record_dlq_message(&message.event_type);
        report.dead_lettered += 1;

        tracing::error!(
            event_id = %message.event_id,
            event_type = %message.event_type,
            aggregate_id = %message.aggregate_id,
            attempts = attempts,
            error = %error,
            "💀 Outbox message moved to dead letter queue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Inventory;
    use crate::domain::order::{NewOrderLine, OrderService, RequestContext};
    use crate::messaging::InMemoryPublisher;
    use crate::store::InMemoryOrderStore;
    use rust_decimal::Decimal;
    use std::time::Duration;

    struct Fixture {
        store: InMemoryOrderStore,
        service: OrderService,
        publisher: Arc<InMemoryPublisher>,
        relay: OutboxRelay,
        metrics: Arc<Metrics>,
    }

    fn fixture(max_attempts: i32) -> Fixture {
        let store = InMemoryOrderStore::with_inventory(vec![Inventory::new(1, 1, "Widget", 100)]);
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = Arc::new(InMemoryPublisher::new());
        let service = OrderService::new(Arc::new(store.clone()), metrics.clone());
        let relay = OutboxRelay::new(
            Arc::new(store.clone()),
            publisher.clone(),
            metrics.clone(),
            OutboxRelayConfig {
                batch_size: 10,
                max_attempts,
                retry: RetryConfig {
                    max_attempts: 2,
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                    multiplier: 2.0,
                },
            },
        );
        Fixture {
            store,
            service,
            publisher,
            relay,
            metrics,
        }
    }

    async fn create(f: &Fixture) -> Uuid {
        f.service
            .create_order(&RequestContext::system(), 1, &[NewOrderLine::new(1, 1, Decimal::ONE)])
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_publishes_pending_messages_once() {
        let f = fixture(3);
        create(&f).await;
        create(&f).await;

        let report = f.relay.relay_pending().await.unwrap();
        assert_eq!(report.published, 2);

        let again = f.relay.relay_pending().await.unwrap();
        assert_eq!(again, RelayReport::default());
        assert_eq!(f.publisher.delivered().await.len(), 2);
        assert!(f.store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_within_pass() {
        let f = fixture(3);
        create(&f).await;
        f.publisher.fail_next(1);

        let report = f.relay.relay_pending().await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_dead_letters_after_max_attempts() {
        let f = fixture(2);
        create(&f).await;
        f.publisher.set_unavailable(true);

        let first = f.relay.relay_pending().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.dead_lettered, 0);

        let second = f.relay.relay_pending().await.unwrap();
        assert_eq!(second.dead_lettered, 1);

        assert!(f.store.pending_outbox(10).await.unwrap().is_empty());
        let parked = f.store.dead_letters(10).await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].failure_count, 2);
        assert_eq!(parked[0].event_type, "ORDER_CREATED");
        assert_eq!(f.metrics.dlq_messages_total.get(), 1);
    }

    #[tokio::test]
    async fn test_failed_order_defers_its_later_events() {
        let f = fixture(5);
        let order_id = create(&f).await;
        f.service
            .cancel_order(&RequestContext::system(), order_id, None)
            .await
            .unwrap();

        f.publisher.set_unavailable(true);
        let report = f.relay.relay_pending().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.deferred, 2);

        f.publisher.set_unavailable(false);
        let report = f.relay.relay_pending().await.unwrap();
        assert_eq!(report.published, 3);

        let types: Vec<String> = f
            .publisher
            .delivered()
            .await
            .into_iter()
            .map(|m| m.event_type)
            .collect();
        assert_eq!(types, vec!["ORDER_CREATED", "ORDER_STATUS_CHANGED", "ORDER_CANCELLED"]);
    }
}
