// ============================================================================
// Inventory Domain - Product stock and reservations
// ============================================================================
//
// - Inventory: per-product stock row, mutated only by reserve/release
// - StockDemand: quantities an order needs, keyed by product in lock order
// - LockedStock: rows locked inside one store transaction
//
// ============================================================================

mod entity;
mod ledger;

pub use entity::*;
pub use ledger::*;
