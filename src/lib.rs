// ============================================================================
// Order Service
// ============================================================================
//
// Layers:
// - domain/    - Order aggregate, status machine, inventory, OrderService
// - store/     - OrderStore trait with Postgres and in-memory backends
// - events/    - Event envelope shared by every published message
// - outbox/    - Relay from the outbox table to the broker
// - messaging/ - Broker publishers (Redpanda, in-memory)
// - actors/    - Background actors (scheduler, relay loop, health)
// - api/       - actix-web HTTP adapter
//
// ============================================================================

pub mod actors;
pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod metrics;
pub mod outbox;
pub mod store;
pub mod utils;
