// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for background work.
//
// Structure:
// - core/           - Health types shared by every actor
// - infrastructure/ - Concrete actors (Health, Scheduler, Relay, Coordinator)
//
// Note: Order logic lives in OrderService, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    CoordinatorActor, CoordinatorSettings, GetHealthMonitor, GetStatusScheduler, GetSystemHealth,
    HealthMonitorActor, OutboxRelayActor, RelayNow, RunSweep, Shutdown, StatusSchedulerActor,
    SystemHealth, UpdateHealth,
};
