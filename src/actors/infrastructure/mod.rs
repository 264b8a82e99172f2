// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Background actors for system concerns:
// - Health monitoring
// - Order status progression
// - Outbox relay loop
// - Coordination and supervision
//
// ============================================================================

mod coordinator;
mod health_monitor;
mod outbox_relay;
mod status_scheduler;

pub use coordinator::{
    CoordinatorActor, CoordinatorSettings, GetHealthMonitor, GetStatusScheduler, Shutdown,
};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use outbox_relay::{OutboxRelayActor, RelayNow};
pub use status_scheduler::{RunSweep, StatusSchedulerActor};
