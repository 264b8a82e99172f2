use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::metrics::Metrics;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the broker connection. After `failure_threshold` consecutive
// failures calls are refused until `timeout` has elapsed; the next call then
// probes the broker (half-open) and `success_threshold` successes close the
// circuit again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    /// Gauge encoding (0=Closed, 1=Open, 2=HalfOpen)
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is allowed
    pub timeout: Duration,
    /// Successes needed to close the circuit from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
    metrics: Option<Arc<Metrics>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.update_circuit_breaker_state(CircuitState::Closed.as_gauge());
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == CircuitState::Open {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed < self.config.timeout {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => inner.failure_count = 0,
            // A call admitted before another caller opened the circuit.
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count += 1;

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = self.name,
                failures = inner.failure_count,
                "⚠️ Circuit breaker opened"
            ),
            _ => tracing::info!(
                breaker = self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state changed"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_circuit_breaker_transition(from.as_str(), to.as_str());
            metrics.update_circuit_breaker_state(to.as_gauge());
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, timeout_ms: u64, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                timeout: Duration::from_millis(timeout_ms),
                success_threshold,
            },
        )
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = breaker(3, 1_000, 2);

        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>("error") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed("error"))));
        }

        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = breaker(3, 1_000, 1);

        let _ = cb.call(async { Err::<(), _>("error") }).await;
        let _ = cb.call(async { Err::<(), _>("error") }).await;
        let _ = cb.call(async { Ok::<_, &str>(()) }).await;
        let _ = cb.call(async { Err::<(), _>("error") }).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 1);
    }

    #[tokio::test]
    async fn test_half_open_probe_closes_circuit_and_records_metrics() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let cb = breaker(2, 50, 1).with_metrics(metrics.clone());

        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(metrics.circuit_breaker_state.get(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(metrics.circuit_breaker_state.get(), 0);
        assert_eq!(
            metrics
                .circuit_breaker_transitions
                .with_label_values(&["Open", "HalfOpen"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_probe_reopens_circuit() {
        let cb = breaker(1, 20, 2);

        let _ = cb.call(async { Err::<(), _>("error") }).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let _ = cb.call(async { Err::<(), _>("still down") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
