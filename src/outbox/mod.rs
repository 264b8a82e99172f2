// ============================================================================
// Transactional Outbox
// ============================================================================
//
// Order transactions write events to the outbox table; the relay moves them
// to the broker with retry, circuit breaking and a dead letter queue.
//
// ============================================================================

mod relay;

pub use relay::{OutboxRelay, OutboxRelayConfig, RelayReport};
