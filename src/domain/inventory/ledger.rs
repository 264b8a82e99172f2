use std::collections::{BTreeMap, BTreeSet};

use super::entity::{Inventory, StockDemand};
use crate::domain::order::{OrderError, ProductId};
use crate::store::{StoreError, StoreTransaction};

// ============================================================================
// Locked Stock - inventory rows held under one transaction
// ============================================================================
//
// Rows are locked once, up front, in ascending product id order. All checks
// and mutations happen on the locked copies; nothing reaches the store until
// `flush`, and nothing is visible to others until the transaction commits.
//
// ============================================================================

#[derive(Debug)]
pub struct LockedStock {
    rows: BTreeMap<ProductId, Inventory>,
    dirty: BTreeSet<ProductId>,
}

impl LockedStock {
    /// Locks the inventory rows of every given product.
    ///
    /// Fails with `NotFound` if any product has no inventory row.
    pub async fn acquire<I>(tx: &mut dyn StoreTransaction, products: I) -> Result<Self, OrderError>
    where
        I: IntoIterator<Item = ProductId>,
    {
        let wanted: BTreeSet<ProductId> = products.into_iter().collect();
        let ids: Vec<ProductId> = wanted.iter().copied().collect();

        let rows: BTreeMap<ProductId, Inventory> = tx
            .lock_inventory(&ids)
            .await?
            .into_iter()
            .map(|row| (row.product_id, row))
            .collect();

        if let Some(missing) = wanted.iter().find(|id| !rows.contains_key(id)) {
            return Err(OrderError::product_not_found(*missing));
        }

        tracing::debug!(products = ?ids, "Locked inventory rows");

        Ok(Self {
            rows,
            dirty: BTreeSet::new(),
        })
    }

    fn row(&self, product_id: ProductId) -> Result<&Inventory, OrderError> {
        self.rows
            .get(&product_id)
            .ok_or_else(|| OrderError::product_not_found(product_id))
    }

    pub fn available(&self, product_id: ProductId) -> Option<i32> {
        self.rows.get(&product_id).map(|row| row.available_stock)
    }

    pub fn check_sufficient(&self, product_id: ProductId, quantity: i32) -> Result<bool, OrderError> {
        Ok(self.row(product_id)?.has_sufficient_stock(quantity))
    }

    /// Verifies every product in `demand` before anything is mutated.
    pub fn ensure_sufficient(&self, demand: &StockDemand) -> Result<(), OrderError> {
        for (product_id, quantity) in demand.iter() {
            if !self.check_sufficient(product_id, quantity)? {
                return Err(OrderError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: self.available(product_id).unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    pub fn reserve(&mut self, demand: &StockDemand) -> Result<(), OrderError> {
        self.ensure_sufficient(demand)?;

        for (product_id, quantity) in demand.iter() {
            if let Some(row) = self.rows.get_mut(&product_id) {
                row.reserve(quantity)?;
                self.dirty.insert(product_id);
            }
        }
        Ok(())
    }

    pub fn release(&mut self, demand: &StockDemand) -> Result<(), OrderError> {
        for (product_id, quantity) in demand.iter() {
            let row = self
                .rows
                .get_mut(&product_id)
                .ok_or_else(|| OrderError::product_not_found(product_id))?;
            row.release(quantity)?;
            self.dirty.insert(product_id);
        }
        Ok(())
    }

    /// Writes modified rows back through the transaction.
    pub async fn flush(self, tx: &mut dyn StoreTransaction) -> Result<(), StoreError> {
        for product_id in &self.dirty {
            if let Some(row) = self.rows.get(product_id) {
                tx.save_inventory(row).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryOrderStore, OrderStore};

    fn demand(entries: &[(ProductId, i32)]) -> StockDemand {
        let mut demand = StockDemand::default();
        for (product, qty) in entries {
            demand.add(*product, *qty);
        }
        demand
    }

    fn seeded_store() -> InMemoryOrderStore {
        InMemoryOrderStore::with_inventory(vec![
            Inventory::new(1, 10, "Widget", 5),
            Inventory::new(2, 20, "Gadget", 1),
        ])
    }

    #[tokio::test]
    async fn test_acquire_fails_for_unknown_product() {
        let store = seeded_store();
        let mut tx = store.begin().await.unwrap();

        let err = LockedStock::acquire(tx.as_mut(), [10, 99]).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { resource: "Product", .. }));
    }

    #[tokio::test]
    async fn test_reserve_validates_all_before_mutating() {
        let store = seeded_store();
        let mut tx = store.begin().await.unwrap();
        let mut stock = LockedStock::acquire(tx.as_mut(), [10, 20]).await.unwrap();

        let err = stock.reserve(&demand(&[(10, 2), (20, 3)])).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientStock {
                product_id: 20,
                requested: 3,
                available: 1
            }
        ));
        assert_eq!(stock.available(10), Some(5));
        assert_eq!(stock.available(20), Some(1));
    }

    #[tokio::test]
    async fn test_release_then_reserve_nets_out() {
        let store = seeded_store();
        let mut tx = store.begin().await.unwrap();
        let mut stock = LockedStock::acquire(tx.as_mut(), [10]).await.unwrap();

        stock.reserve(&demand(&[(10, 5)])).unwrap();
        assert!(!stock.check_sufficient(10, 1).unwrap());

        stock.release(&demand(&[(10, 5)])).unwrap();
        stock.reserve(&demand(&[(10, 2)])).unwrap();
        assert_eq!(stock.available(10), Some(3));

        stock.flush(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        let row = store.find_inventory(10).await.unwrap().unwrap();
        assert_eq!(row.available_stock, 3);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_reservation() {
        let store = seeded_store();
        {
            let mut tx = store.begin().await.unwrap();
            let mut stock = LockedStock::acquire(tx.as_mut(), [10]).await.unwrap();
            stock.reserve(&demand(&[(10, 4)])).unwrap();
            stock.flush(tx.as_mut()).await.unwrap();
        }

        let row = store.find_inventory(10).await.unwrap().unwrap();
        assert_eq!(row.available_stock, 5);
    }
}
