// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order: order aggregate, lifecycle state machine, audit and use-cases
// - inventory: stock rows and locked reservation
//
// Persistence lives behind `crate::store`; nothing here knows about SQL.
//
// ============================================================================

pub mod order;
pub mod inventory;
