use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::domain::order::{OrderService, SweepReport};

// ============================================================================
// Status Scheduler Actor - periodic order status progression
// ============================================================================
//
// Runs `progress_order_statuses` with a fixed delay: the next sweep is only
// scheduled once the previous one has finished, so sweeps never overlap.
//
// ============================================================================

pub const COMPONENT: &str = "status_scheduler";

/// Runs one sweep now, outside the schedule.
#[derive(Message)]
#[rtype(result = "Result<SweepReport, String>")]
pub struct RunSweep;

pub struct StatusSchedulerActor {
    service: Arc<OrderService>,
    interval: Duration,
    enabled: bool,
    in_flight: bool,
    health: Option<Addr<HealthMonitorActor>>,
}

impl StatusSchedulerActor {
    pub fn new(service: Arc<OrderService>, interval: Duration, enabled: bool) -> Self {
        Self {
            service,
            interval,
            enabled,
            in_flight: false,
            health: None,
        }
    }

    pub fn with_health_monitor(mut self, health: Addr<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    fn schedule_next(&mut self, ctx: &mut Context<Self>) {
        ctx.run_later(self.interval, |act, ctx| {
            if act.in_flight {
                act.schedule_next(ctx);
                return;
            }
            act.in_flight = true;
            let service = act.service.clone();
            let sweep = async move { service.progress_order_statuses().await };
            ctx.spawn(fut::wrap_future::<_, Self>(sweep).map(|result, act, ctx| {
                act.in_flight = false;
                act.report(result.map_err(|e| e.to_string()));
                act.schedule_next(ctx);
            }));
        });
    }

    fn report(&self, result: Result<SweepReport, String>) {
        let update = match result {
            Ok(report) if report.failed > 0 => UpdateHealth::new(
                COMPONENT,
                HealthStatus::Degraded(format!("{} orders failed to advance", report.failed)),
            ),
            Ok(report) => UpdateHealth::new(COMPONENT, HealthStatus::Healthy)
                .with_details(format!("last sweep advanced {} orders", report.advanced)),
            Err(e) => {
                tracing::error!(error = %e, "Order status progression failed");
                UpdateHealth::new(COMPONENT, HealthStatus::Unhealthy(e))
            }
        };
        if let Some(ref health) = self.health {
            health.do_send(update);
        }
    }
}

impl Actor for StatusSchedulerActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if !self.enabled {
            tracing::info!("⏸️ Order status progression disabled");
            if let Some(ref health) = self.health {
                health.do_send(
                    UpdateHealth::new(COMPONENT, HealthStatus::Healthy).with_details("disabled"),
                );
            }
            return;
        }

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "⏱️ StatusSchedulerActor started"
        );
        if let Some(ref health) = self.health {
            health.do_send(UpdateHealth::new(COMPONENT, HealthStatus::Healthy));
        }
        self.schedule_next(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("StatusSchedulerActor stopped");
    }
}

impl Handler<RunSweep> for StatusSchedulerActor {
    type Result = ResponseActFuture<Self, Result<SweepReport, String>>;

    fn handle(&mut self, _msg: RunSweep, _ctx: &mut Self::Context) -> Self::Result {
        if self.in_flight {
            return Box::pin(fut::ready(Err("sweep already running".to_string())));
        }
        self.in_flight = true;
        let service = self.service.clone();
        let sweep = async move { service.progress_order_statuses().await.map_err(|e| e.to_string()) };

        Box::pin(fut::wrap_future::<_, Self>(sweep).map(|result, act, _ctx| {
            act.in_flight = false;
            act.report(result.clone());
            result
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Inventory;
    use crate::domain::order::{NewOrderLine, OrderStatus, RequestContext};
    use crate::metrics::Metrics;
    use crate::store::InMemoryOrderStore;
    use rust_decimal::Decimal;

    fn service() -> Arc<OrderService> {
        let store = InMemoryOrderStore::with_inventory(vec![Inventory::new(1, 1, "Widget", 10)]);
        Arc::new(OrderService::new(
            Arc::new(store),
            Arc::new(Metrics::new().unwrap()),
        ))
    }

    #[actix::test]
    async fn test_scheduled_sweep_advances_orders() {
        let service = service();
        let order = service
            .create_order(&RequestContext::system(), 7, &[NewOrderLine::new(1, 1, Decimal::ONE)])
            .await
            .unwrap();

        let _addr = StatusSchedulerActor::new(service.clone(), Duration::from_millis(20), true).start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let current = service.get_order(order.id).await.unwrap();
        assert_ne!(current.status, OrderStatus::Unprocessed);
    }

    #[actix::test]
    async fn test_disabled_scheduler_still_accepts_manual_sweep() {
        let service = service();
        let order = service
            .create_order(&RequestContext::system(), 7, &[NewOrderLine::new(1, 1, Decimal::ONE)])
            .await
            .unwrap();

        let addr = StatusSchedulerActor::new(service.clone(), Duration::from_millis(10), false).start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            service.get_order(order.id).await.unwrap().status,
            OrderStatus::Unprocessed
        );

        let report = addr.send(RunSweep).await.unwrap().unwrap();
        assert_eq!(report.advanced, 1);
        assert_eq!(
            service.get_order(order.id).await.unwrap().status,
            OrderStatus::Processing
        );
    }
}
