use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{
    line_total, order_total, to_money, CustomerId, NewOrderLine, OrderStatus, ProductId,
};
use crate::domain::inventory::StockDemand;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

/// Line item owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl OrderLine {
    fn from_request(order_id: Uuid, request: &NewOrderLine) -> Result<Self, OrderError> {
        let unit_price = to_money(request.unit_price);
        Ok(Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: request.product_id,
            quantity: request.quantity,
            unit_price,
            line_total: line_total(unit_price, request.quantity)?,
        })
    }
}

fn build_lines(order_id: Uuid, lines: &[NewOrderLine]) -> Result<(Vec<OrderLine>, Decimal), OrderError> {
    let lines = lines
        .iter()
        .map(|l| OrderLine::from_request(order_id, l))
        .collect::<Result<Vec<_>, _>>()?;
    let total = order_total(lines.iter().map(|l| l.line_total))?;
    Ok((lines, total))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub lines: Vec<OrderLine>,
    pub deleted: bool,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a fresh UNPROCESSED order. Totals that leave the money range
    /// are a validation error.
    pub fn new(customer_id: CustomerId, lines: &[NewOrderLine]) -> Result<Self, OrderError> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let (lines, total_amount) = build_lines(id, lines)?;

        Ok(Self {
            id,
            version: 0,
            customer_id,
            status: OrderStatus::Unprocessed,
            order_date: now,
            total_amount,
            lines,
            deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Only UNPROCESSED orders may have their lines changed.
    pub fn ensure_modifiable(&self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Unprocessed {
            return Err(OrderError::NotModifiable {
                current: self.status,
            });
        }
        Ok(())
    }

    pub fn replace_lines(&mut self, lines: &[NewOrderLine]) -> Result<(), OrderError> {
        self.ensure_modifiable()?;
        let (lines, total_amount) = build_lines(self.id, lines)?;
        self.lines = lines;
        self.total_amount = total_amount;
        self.touch();
        Ok(())
    }

    /// Applies a status change, returning the previous status.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<OrderStatus, OrderError> {
        let current = self.status;
        if !current.can_transition_to(target) {
            return Err(OrderError::InvalidTransition { current, target });
        }
        if current != target {
            self.status = target;
            self.touch();
        }
        Ok(current)
    }

    pub fn soft_delete(&mut self) {
        self.deleted = true;
        self.touch();
    }

    /// Stock this order currently holds in reserve.
    pub fn stock_demand(&self) -> StockDemand {
        StockDemand::from_lines(&self.lines)
    }

    /// Short human readable description of the line set, used in audit rows.
    pub fn lines_summary(&self) -> String {
        let units: i64 = self.lines.iter().map(|l| i64::from(l.quantity)).sum();
        format!(
            "{} line(s), {} unit(s), total {}",
            self.lines.len(),
            units,
            self.total_amount
        )
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn sample_lines() -> Vec<NewOrderLine> {
        vec![
            NewOrderLine::new(1, 2, price(1050)),
            NewOrderLine::new(2, 1, price(399)),
        ]
    }

    #[test]
    fn test_new_order_computes_totals() {
        let order = Order::new(7, &sample_lines()).unwrap();

        assert_eq!(order.status, OrderStatus::Unprocessed);
        assert_eq!(order.customer_id, 7);
        assert!(!order.deleted);
        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().all(|l| l.order_id == order.id));
        assert_eq!(order.lines[0].line_total, price(2100));
        assert_eq!(order.total_amount, price(2499));
    }

    #[test]
    fn test_replace_lines_recomputes_total() {
        let mut order = Order::new(7, &sample_lines()).unwrap();
        order
            .replace_lines(&[NewOrderLine::new(3, 4, price(250))])
            .unwrap();

        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.total_amount, price(1000));
    }

    #[test]
    fn test_replace_lines_rejected_after_processing_starts() {
        let mut order = Order::new(7, &sample_lines()).unwrap();
        order.transition_to(OrderStatus::Processing).unwrap();

        let err = order
            .replace_lines(&[NewOrderLine::new(3, 1, price(100))])
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotModifiable {
                current: OrderStatus::Processing
            }
        ));
        assert_eq!(order.lines.len(), 2);
    }

    #[test]
    fn test_transition_returns_previous_status() {
        let mut order = Order::new(7, &sample_lines()).unwrap();
        let previous = order.transition_to(OrderStatus::Processing).unwrap();

        assert_eq!(previous, OrderStatus::Unprocessed);
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[test]
    fn test_invalid_transition_leaves_status_untouched() {
        let mut order = Order::new(7, &sample_lines()).unwrap();
        let err = order.transition_to(OrderStatus::Shipped).unwrap_err();

        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                current: OrderStatus::Unprocessed,
                target: OrderStatus::Shipped
            }
        ));
        assert_eq!(order.status, OrderStatus::Unprocessed);
    }

    #[test]
    fn test_overflowing_lines_are_rejected_without_panicking() {
        let err = Order::new(7, &[NewOrderLine::new(1, 2, Decimal::MAX)]).unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let mut order = Order::new(7, &sample_lines()).unwrap();
        let err = order
            .replace_lines(&[
                NewOrderLine::new(1, 1, Decimal::MAX),
                NewOrderLine::new(2, 1, Decimal::MAX),
            ])
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_amount, price(2499));
    }

    #[test]
    fn test_stock_demand_reflects_lines() {
        let order = Order::new(7, &sample_lines()).unwrap();
        let demand: Vec<_> = order.stock_demand().iter().collect();
        assert_eq!(demand, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn test_order_serialization_uses_camel_case() {
        let order = Order::new(7, &sample_lines()).unwrap();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["customerId"], 7);
        assert_eq!(json["status"], "UNPROCESSED");
        assert_eq!(json["totalAmount"], "24.99");
    }

    #[test]
    fn test_amounts_are_kept_at_two_decimal_places() {
        let order = Order::new(7, &[NewOrderLine::new(1, 3, Decimal::new(15, 1))]).unwrap();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["lines"][0]["unitPrice"], "1.50");
        assert_eq!(json["lines"][0]["lineTotal"], "4.50");
        assert_eq!(json["totalAmount"], "4.50");
    }
}
