use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::order::{NewOrderLine, OrderError, OrderLine, ProductId};

/// Stock row for a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: i64,
    pub product_id: ProductId,
    pub product_name: String,
    pub available_stock: i32,
}

impl Inventory {
    pub fn new(id: i64, product_id: ProductId, product_name: impl Into<String>, available_stock: i32) -> Self {
        Self {
            id,
            product_id,
            product_name: product_name.into(),
            available_stock,
        }
    }

    pub fn has_sufficient_stock(&self, quantity: i32) -> bool {
        self.available_stock >= quantity
    }

    /// Decrements stock, refusing to go negative.
    pub fn reserve(&mut self, quantity: i32) -> Result<(), OrderError> {
        if !self.has_sufficient_stock(quantity) {
            return Err(OrderError::InsufficientStock {
                product_id: self.product_id,
                requested: quantity,
                available: self.available_stock,
            });
        }
        self.available_stock -= quantity;
        Ok(())
    }

    pub fn release(&mut self, quantity: i32) -> Result<(), OrderError> {
        self.available_stock = self.available_stock.checked_add(quantity).ok_or_else(|| {
            OrderError::Validation(format!(
                "Releasing {} units would overflow stock for product {}",
                quantity, self.product_id
            ))
        })?;
        Ok(())
    }
}

/// Total quantity per product required by a set of lines.
///
/// Iteration order is ascending product id, which is also the lock order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockDemand {
    quantities: BTreeMap<ProductId, i32>,
}

impl StockDemand {
    pub fn add(&mut self, product_id: ProductId, quantity: i32) {
        let entry = self.quantities.entry(product_id).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    pub fn from_requests(lines: &[NewOrderLine]) -> Self {
        let mut demand = Self::default();
        for line in lines {
            demand.add(line.product_id, line.quantity);
        }
        demand
    }

    pub fn from_lines(lines: &[OrderLine]) -> Self {
        let mut demand = Self::default();
        for line in lines {
            demand.add(line.product_id, line.quantity);
        }
        demand
    }

    pub fn products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.quantities.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductId, i32)> + '_ {
        self.quantities.iter().map(|(product, qty)| (*product, *qty))
    }
}
