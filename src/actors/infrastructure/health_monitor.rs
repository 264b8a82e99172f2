use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::store::OrderStore;

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track health status reported by every component
// - Probe the store and the publisher's circuit breaker on an interval
// - Refresh the orders-by-status gauges
// - Aggregate system-wide health for /health
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl UpdateHealth {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    #[serde(flatten)]
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    probe_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        probe_interval: Duration,
    ) -> Self {
        Self {
            components: BTreeMap::new(),
            store,
            publisher,
            metrics,
            probe_interval,
        }
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }

    fn probe(&self, ctx: &mut Context<Self>) {
        let store = self.store.clone();
        let publisher = self.publisher.clone();
        let metrics = self.metrics.clone();
        let me = ctx.address();

        actix::spawn(async move {
            let store_status = match store.ping().await {
                Ok(()) => HealthStatus::Healthy,
                Err(e) => HealthStatus::Unhealthy(format!("ping failed: {}", e)),
            };
            me.do_send(UpdateHealth::new("store", store_status));

            if let Some(state) = publisher.circuit_state().await {
                me.do_send(
                    UpdateHealth::new(publisher.name(), HealthStatus::from_circuit(state))
                        .with_details(format!("circuit {}", state.as_str())),
                );
            }

            match store.count_by_status().await {
                Ok(counts) => metrics.set_status_counts(&counts),
                Err(e) => tracing::warn!(error = %e, "Failed to refresh order status gauges"),
            }
        });
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            interval_secs = self.probe_interval.as_secs(),
            "🩺 HealthMonitorActor started"
        );
        self.probe(ctx);
        ctx.run_interval(self.probe_interval, |act, ctx| act.probe(ctx));
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("HealthMonitorActor stopped");
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Self::Context) {
        let previous = self.components.get(&msg.component).map(|c| c.status.clone());
        if previous.as_ref() != Some(&msg.status) {
            tracing::debug!(
                component = %msg.component,
                status = ?msg.status,
                "Updated component health"
            );
        }

        let health = ComponentHealth::new(msg.component.clone(), msg.status).with_details(msg.details);
        self.components.insert(msg.component, health);
        self.metrics
            .actor_health_status
            .set(self.compute_overall_status().as_gauge());
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
