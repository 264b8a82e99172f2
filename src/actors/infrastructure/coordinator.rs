use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{GetSystemHealth, HealthMonitorActor, UpdateHealth};
use super::outbox_relay::{self, OutboxRelayActor};
use super::status_scheduler::{self, StatusSchedulerActor};
use crate::actors::core::HealthStatus;
use crate::domain::order::OrderService;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::outbox::OutboxRelay;

// ============================================================================
// Coordinator Actor - Orchestrates all background actors
// ============================================================================
//
// Responsibilities:
// - Manages lifecycle of child actors
// - Restarts a child whose mailbox has gone away
// - Coordinates graceful shutdown
// - Logs overall system health on an interval
//
// Actor Hierarchy:
//   CoordinatorActor (Supervisor)
//   ├── HealthMonitorActor
//   ├── StatusSchedulerActor
//   └── OutboxRelayActor
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub progression_enabled: bool,
    pub progression_interval: Duration,
    pub outbox_poll_interval: Duration,
    pub health_log_interval: Duration,
}

pub struct CoordinatorActor {
    service: Arc<OrderService>,
    relay: Arc<OutboxRelay>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    settings: CoordinatorSettings,
    health_monitor: Option<Addr<HealthMonitorActor>>,
    status_scheduler: Option<Addr<StatusSchedulerActor>>,
    outbox_relay: Option<Addr<OutboxRelayActor>>,
}

impl CoordinatorActor {
    pub fn new(
        service: Arc<OrderService>,
        relay: Arc<OutboxRelay>,
        metrics: Arc<Metrics>,
        settings: CoordinatorSettings,
    ) -> Self {
        let publisher = relay.publisher().clone();
        Self {
            service,
            relay,
            publisher,
            metrics,
            settings,
            health_monitor: None,
            status_scheduler: None,
            outbox_relay: None,
        }
    }

    fn start_health_monitor(&mut self) -> Addr<HealthMonitorActor> {
        let addr = HealthMonitorActor::new(
            self.service.store().clone(),
            self.publisher.clone(),
            self.metrics.clone(),
            self.settings.health_log_interval,
        )
        .start();
        self.health_monitor = Some(addr.clone());
        addr
    }

    fn start_status_scheduler(&mut self, health: Addr<HealthMonitorActor>) {
        let addr = StatusSchedulerActor::new(
            self.service.clone(),
            self.settings.progression_interval,
            self.settings.progression_enabled,
        )
        .with_health_monitor(health)
        .start();
        self.status_scheduler = Some(addr);
    }

    fn start_outbox_relay(&mut self, health: Addr<HealthMonitorActor>) {
        let addr = OutboxRelayActor::new(self.relay.clone(), self.settings.outbox_poll_interval)
            .with_health_monitor(health)
            .start();
        self.outbox_relay = Some(addr);
    }

    fn start_child_actors(&mut self) {
        tracing::info!("Starting supervised child actors");

        let health = self.start_health_monitor();
        self.start_status_scheduler(health.clone());
        self.start_outbox_relay(health);

        tracing::info!("✅ All supervised actors started successfully");
    }

    fn supervise(&mut self) {
        let health = match self.health_monitor {
            Some(ref addr) if addr.connected() => addr.clone(),
            _ => {
                tracing::warn!("HealthMonitorActor gone, restarting");
                self.start_health_monitor()
            }
        };

        if !self.status_scheduler.as_ref().is_some_and(Addr::connected) {
            tracing::warn!("StatusSchedulerActor gone, restarting");
            health.do_send(UpdateHealth::new(
                status_scheduler::COMPONENT,
                HealthStatus::Degraded("restarted".to_string()),
            ));
            self.start_status_scheduler(health.clone());
        }

        if !self.outbox_relay.as_ref().is_some_and(Addr::connected) {
            tracing::warn!("OutboxRelayActor gone, restarting");
            health.do_send(UpdateHealth::new(
                outbox_relay::COMPONENT,
                HealthStatus::Degraded("restarted".to_string()),
            ));
            self.start_outbox_relay(health);
        }
    }

    fn log_health(&self) {
        let Some(ref health_monitor) = self.health_monitor else {
            return;
        };
        let health_monitor = health_monitor.clone();
        actix::spawn(async move {
            match health_monitor.send(GetSystemHealth).await {
                Ok(health) => match health.overall_status {
                    HealthStatus::Healthy => {
                        tracing::debug!("System health check: Healthy");
                    }
                    HealthStatus::Degraded(ref msg) => {
                        tracing::warn!("System health check: Degraded - {}", msg);
                    }
                    HealthStatus::Unhealthy(ref msg) => {
                        tracing::error!("System health check: Unhealthy - {}", msg);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to get system health: {}", e);
                }
            }
        });
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_child_actors();

        ctx.run_interval(self.settings.health_log_interval, |act, _ctx| {
            act.supervise();
            act.log_health();
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        tracing::info!("🛑 CoordinatorActor stopping - initiating graceful shutdown");
        Running::Stop
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<(), String>")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = Result<(), String>;

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Received shutdown signal");

        // Stop producers of work before the monitor
        if let Some(ref scheduler) = self.status_scheduler.take() {
            scheduler.do_send(StopActor);
        }

        if let Some(ref relay) = self.outbox_relay.take() {
            relay.do_send(StopActor);
        }

        if let Some(ref health_monitor) = self.health_monitor.take() {
            health_monitor.do_send(StopActor);
        }

        ctx.stop();

        Ok(())
    }
}

/// Message to gracefully stop an actor
#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for StatusSchedulerActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("StatusSchedulerActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for OutboxRelayActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("OutboxRelayActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor received stop signal");
        ctx.stop();
    }
}

// ============================================================================
// Public API for accessing child actors
// ============================================================================

#[derive(Message)]
#[rtype(result = "Option<Addr<HealthMonitorActor>>")]
pub struct GetHealthMonitor;

impl Handler<GetHealthMonitor> for CoordinatorActor {
    type Result = Option<Addr<HealthMonitorActor>>;

    fn handle(&mut self, _: GetHealthMonitor, _: &mut Self::Context) -> Self::Result {
        self.health_monitor.clone()
    }
}

#[derive(Message)]
#[rtype(result = "Option<Addr<StatusSchedulerActor>>")]
pub struct GetStatusScheduler;

impl Handler<GetStatusScheduler> for CoordinatorActor {
    type Result = Option<Addr<StatusSchedulerActor>>;

    fn handle(&mut self, _: GetStatusScheduler, _: &mut Self::Context) -> Self::Result {
        self.status_scheduler.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryPublisher;
    use crate::outbox::OutboxRelayConfig;
    use crate::store::InMemoryOrderStore;

    fn coordinator() -> Addr<CoordinatorActor> {
        let store = Arc::new(InMemoryOrderStore::with_demo_inventory());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = Arc::new(OrderService::new(store.clone(), metrics.clone()));
        let relay = Arc::new(OutboxRelay::new(
            store,
            Arc::new(InMemoryPublisher::new()),
            metrics.clone(),
            OutboxRelayConfig::default(),
        ));
        CoordinatorActor::new(
            service,
            relay,
            metrics,
            CoordinatorSettings {
                progression_enabled: false,
                progression_interval: Duration::from_secs(300),
                outbox_poll_interval: Duration::from_millis(50),
                health_log_interval: Duration::from_secs(30),
            },
        )
        .start()
    }

    #[actix::test]
    async fn test_children_report_health() {
        let coordinator = coordinator();
        let health_monitor = coordinator.send(GetHealthMonitor).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let health = health_monitor.send(GetSystemHealth).await.unwrap();
        assert!(health.overall_status.is_healthy());
        for component in ["store", status_scheduler::COMPONENT, outbox_relay::COMPONENT] {
            assert!(health.components.contains_key(component), "missing {}", component);
        }
    }

    #[actix::test]
    async fn test_shutdown_stops_children() {
        let coordinator = coordinator();
        let scheduler = coordinator.send(GetStatusScheduler).await.unwrap().unwrap();

        coordinator.send(Shutdown).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!scheduler.connected());
        assert!(!coordinator.connected());
    }
}
