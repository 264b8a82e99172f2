use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::outbox::{OutboxRelay, RelayReport};

// ============================================================================
// Outbox Relay Actor - drives the relay loop
// ============================================================================

pub const COMPONENT: &str = "outbox_relay";

/// Runs one relay pass immediately.
#[derive(Message)]
#[rtype(result = "Result<RelayReport, String>")]
pub struct RelayNow;

pub struct OutboxRelayActor {
    relay: Arc<OutboxRelay>,
    poll_interval: Duration,
    in_flight: bool,
    health: Option<Addr<HealthMonitorActor>>,
}

impl OutboxRelayActor {
    pub fn new(relay: Arc<OutboxRelay>, poll_interval: Duration) -> Self {
        Self {
            relay,
            poll_interval,
            in_flight: false,
            health: None,
        }
    }

    pub fn with_health_monitor(mut self, health: Addr<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    fn schedule_next(&mut self, ctx: &mut Context<Self>) {
        ctx.run_later(self.poll_interval, |act, ctx| {
            if act.in_flight {
                act.schedule_next(ctx);
                return;
            }
            act.in_flight = true;
            let relay = act.relay.clone();
            let pass = async move { relay.relay_pending().await.map_err(|e| e.to_string()) };
            ctx.spawn(fut::wrap_future::<_, Self>(pass).map(|result, act, ctx| {
                act.in_flight = false;
                act.report(&result);
                act.schedule_next(ctx);
            }));
        });
    }

    fn report(&self, result: &Result<RelayReport, String>) {
        let status = match result {
            Ok(report) if report.dead_lettered > 0 => {
                HealthStatus::Degraded(format!("{} messages dead-lettered", report.dead_lettered))
            }
            Ok(_) => HealthStatus::Healthy,
            Err(e) => {
                tracing::error!(error = %e, "Outbox relay pass failed");
                HealthStatus::Unhealthy(e.clone())
            }
        };
        if let Some(ref health) = self.health {
            health.do_send(UpdateHealth::new(COMPONENT, status));
        }
    }
}

impl Actor for OutboxRelayActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            publisher = self.relay.publisher().name(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "📬 OutboxRelayActor started"
        );
        if let Some(ref health) = self.health {
            health.do_send(UpdateHealth::new(COMPONENT, HealthStatus::Healthy));
        }
        self.schedule_next(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("OutboxRelayActor stopped");
    }
}

impl Handler<RelayNow> for OutboxRelayActor {
    type Result = ResponseActFuture<Self, Result<RelayReport, String>>;

    fn handle(&mut self, _msg: RelayNow, _ctx: &mut Self::Context) -> Self::Result {
        if self.in_flight {
            return Box::pin(fut::ready(Ok(RelayReport::default())));
        }
        self.in_flight = true;
        let relay = self.relay.clone();
        let pass = async move { relay.relay_pending().await.map_err(|e| e.to_string()) };

        Box::pin(fut::wrap_future::<_, Self>(pass).map(|result, act, _ctx| {
            act.in_flight = false;
            act.report(&result);
            result
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Inventory;
    use crate::domain::order::{NewOrderLine, OrderService, RequestContext};
    use crate::messaging::InMemoryPublisher;
    use crate::metrics::Metrics;
    use crate::outbox::OutboxRelayConfig;
    use crate::store::InMemoryOrderStore;
    use rust_decimal::Decimal;

    #[actix::test]
    async fn test_relay_loop_drains_outbox() {
        let store = InMemoryOrderStore::with_inventory(vec![Inventory::new(1, 1, "Widget", 10)]);
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = Arc::new(InMemoryPublisher::new());
        let service = OrderService::new(Arc::new(store.clone()), metrics.clone());
        service
            .create_order(&RequestContext::system(), 3, &[NewOrderLine::new(1, 2, Decimal::TEN)])
            .await
            .unwrap();

        let relay = Arc::new(OutboxRelay::new(
            Arc::new(store.clone()),
            publisher.clone(),
            metrics,
            OutboxRelayConfig::default(),
        ));
        let _addr = OutboxRelayActor::new(relay, Duration::from_millis(10)).start();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let delivered = publisher.delivered().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].topic, "order.created");
        assert!(store.outbox_snapshot().await.iter().all(|m| m.published_at.is_some()));
    }
}
