// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderStatus state machine, NewOrderLine)
// - Aggregate (Order, OrderLine)
// - Events (OrderCreated, OrderStatusChanged, etc.)
// - Audit trail records
// - Errors (OrderError enum)
// - Service (transactional use-cases over an OrderStore)
//
// ============================================================================

pub mod value_objects;
pub mod aggregate;
pub mod audit;
pub mod events;
pub mod errors;
pub mod service;

// Re-export for convenience
pub use value_objects::*;
pub use aggregate::*;
pub use audit::*;
pub use events::*;
pub use errors::*;
pub use service::*;
