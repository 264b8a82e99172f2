// Private module declaration
mod server;

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};

use crate::domain::order::OrderStatus;

// Re-export for public API
pub use server::{metrics_handler, render};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order use-cases (throughput, latency, failures by kind)
// - Status transitions and the progression sweep
// - Outbox relay publishing, retries and the dead letter queue
// - Circuit breaker state transitions
// - Actor health status
//
// All metrics are registered with Prometheus and scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created: IntCounter,
    pub orders_updated: IntCounter,
    pub orders_deleted: IntCounter,
    pub status_transitions: IntCounterVec,
    pub operation_failures: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub orders_by_status: IntGaugeVec,

    // Status Progression Metrics
    pub sweep_duration: Histogram,
    pub sweep_orders: IntCounterVec,

    // Outbox Metrics
    pub outbox_published: IntCounterVec,
    pub outbox_publish_failures: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // DLQ Metrics
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_event_type: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,

    // Actor Metrics
    pub actor_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_updated = IntCounter::new("orders_updated_total", "Total order line replacements")?;
        registry.register(Box::new(orders_updated.clone()))?;

        let orders_deleted = IntCounter::new("orders_deleted_total", "Total orders soft-deleted")?;
        registry.register(Box::new(orders_deleted.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let operation_failures = IntCounterVec::new(
            Opts::new("order_operation_failures_total", "Failed order operations"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(operation_failures.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let orders_by_status = IntGaugeVec::new(
            Opts::new("orders_by_status", "Active orders per status"),
            &["status"],
        )?;
        registry.register(Box::new(orders_by_status.clone()))?;

        // Status Progression Metrics
        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new("status_sweep_duration_seconds", "Status progression sweep duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(sweep_duration.clone()))?;

        let sweep_orders = IntCounterVec::new(
            Opts::new("status_sweep_orders_total", "Orders visited by the progression sweep"),
            &["outcome"],
        )?;
        registry.register(Box::new(sweep_orders.clone()))?;

        // Outbox Metrics
        let outbox_published = IntCounterVec::new(
            Opts::new("outbox_published_total", "Outbox messages published to the broker"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_published.clone()))?;

        let outbox_publish_failures = IntCounterVec::new(
            Opts::new("outbox_publish_failures_total", "Outbox relay passes that failed to publish"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_publish_failures.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Total successful retries"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Total failed retries after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        // DLQ Metrics
        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Total messages moved to the dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_event_type = IntCounterVec::new(
            Opts::new("dlq_messages_by_event_type", "DLQ messages by event type"),
            &["event_type"],
        )?;
        registry.register(Box::new(dlq_messages_by_event_type.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        // Actor Metrics
        let actor_health_status = IntGauge::new(
            "actor_health_status",
            "Overall health status (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(actor_health_status.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_updated,
            orders_deleted,
            status_transitions,
            operation_failures,
            operation_duration,
            orders_by_status,
            sweep_duration,
            sweep_orders,
            outbox_published,
            outbox_publish_failures,
            retry_attempts_total,
            retry_success,
            retry_failure,
            dlq_messages_total,
            dlq_messages_by_event_type,
            circuit_breaker_state,
            circuit_breaker_transitions,
            actor_health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_failure(&self, operation: &str, kind: &str) {
        self.operation_failures
            .with_label_values(&[operation, kind])
            .inc();
    }

    pub fn record_transition(&self, from: OrderStatus, to: OrderStatus) {
        self.status_transitions
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    pub fn record_sweep(&self, duration_secs: f64, advanced: u64, skipped: u64, failed: u64) {
        self.sweep_duration.observe(duration_secs);
        self.sweep_orders.with_label_values(&["advanced"]).inc_by(advanced);
        self.sweep_orders.with_label_values(&["skipped"]).inc_by(skipped);
        self.sweep_orders.with_label_values(&["failed"]).inc_by(failed);
    }

    pub fn set_status_counts(&self, counts: &[(OrderStatus, i64)]) {
        for (status, count) in counts {
            self.orders_by_status
                .with_label_values(&[status.as_str()])
                .set(*count);
        }
    }

    pub fn record_publish(&self, event_type: &str, success: bool) {
        if success {
            self.outbox_published.with_label_values(&[event_type]).inc();
        } else {
            self.outbox_publish_failures.with_label_values(&[event_type]).inc();
        }
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    /// Helper to record retry outcome
    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    /// Helper to record DLQ message
    pub fn record_dlq_message(&self, event_type: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_event_type.with_label_values(&[event_type]).inc();
    }

    /// Helper to update circuit breaker state
    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    /// Helper to record circuit breaker transition
    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[from_state, to_state]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Option<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .and_then(|m| m.metric.first().and_then(|x| x.counter.value))
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_transition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition(OrderStatus::Unprocessed, OrderStatus::Processing);
        metrics.record_transition(OrderStatus::Unprocessed, OrderStatus::Processing);

        assert_eq!(counter_value(&metrics, "order_status_transitions_total"), Some(2.0));
    }

    #[test]
    fn test_record_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("outbox_publish", 1);
        metrics.record_retry_attempt("outbox_publish", 2);
        metrics.record_retry_outcome("outbox_publish", true);

        let gathered = metrics.registry.gather();
        let attempts = gathered.iter().find(|m| m.name() == "retry_attempts_total").unwrap();
        assert_eq!(attempts.metric.len(), 2); // one series per attempt number
    }

    #[test]
    fn test_record_dlq_message() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dlq_message("ORDER_CREATED");
        metrics.record_dlq_message("ORDER_UPDATED");

        assert_eq!(counter_value(&metrics, "dlq_messages_total"), Some(2.0));
    }

    #[test]
    fn test_status_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.set_status_counts(&[(OrderStatus::Unprocessed, 3), (OrderStatus::Shipped, 1)]);

        assert_eq!(
            metrics
                .orders_by_status
                .with_label_values(&["UNPROCESSED"])
                .get(),
            3
        );
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(0); // Closed
        metrics.record_circuit_breaker_transition("Closed", "Open");
        metrics.update_circuit_breaker_state(1); // Open

        let gathered = metrics.registry.gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
