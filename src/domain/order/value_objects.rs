use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

pub type CustomerId = i64;
pub type ProductId = i64;

/// Order lifecycle status.
///
/// Flow: UNPROCESSED -> PROCESSING -> PROCESSED -> SHIPPED, with CANCELLED
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Unprocessed,
    Processing,
    Processed,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Unprocessed,
        OrderStatus::Processing,
        OrderStatus::Processed,
        OrderStatus::Shipped,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unprocessed => "UNPROCESSED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OrderStatus::Unprocessed => "Order created, awaiting processing",
            OrderStatus::Processing => "Order is being processed",
            OrderStatus::Processed => "Order has been processed",
            OrderStatus::Shipped => "Order has been shipped",
            OrderStatus::Cancelled => "Order has been cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Cancelled)
    }

    /// Successor in the lifecycle; terminal states map to themselves.
    pub fn next_status(&self) -> OrderStatus {
        match self {
            OrderStatus::Unprocessed => OrderStatus::Processing,
            OrderStatus::Processing => OrderStatus::Processed,
            OrderStatus::Processed => OrderStatus::Shipped,
            OrderStatus::Shipped | OrderStatus::Cancelled => *self,
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if *self == target {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if target == OrderStatus::Cancelled {
            return true;
        }
        target == self.next_status()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "UNPROCESSED" => Ok(OrderStatus::Unprocessed),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::Validation(format!("Unknown order status: {}", other))),
        }
    }
}

/// A requested order line, before it belongs to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewOrderLine {
    pub fn new(product_id: ProductId, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> Result<Decimal, OrderError> {
        line_total(self.unit_price, self.quantity)
    }
}

// ============================================================================
// Money
// ============================================================================
//
// Amounts are persisted as NUMERIC(12, 2): at most two decimal places and
// ten integer digits. Prices, line totals and order totals are all held to
// that range so both stores keep the exact values the service computed.
//
// ============================================================================

pub const MONEY_SCALE: u32 = 2;

/// Largest amount a price, line total or order total may reach.
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, MONEY_SCALE)
}

/// Fixes the amount at two decimal places, the scale it is stored with.
pub fn to_money(amount: Decimal) -> Decimal {
    let mut amount = amount;
    amount.rescale(MONEY_SCALE);
    amount
}

fn out_of_range(what: &str) -> OrderError {
    OrderError::Validation(format!("{} exceeds the maximum amount {}", what, max_amount()))
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Result<Decimal, OrderError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .filter(|total| *total <= max_amount())
        .ok_or_else(|| out_of_range("Line total"))
}

pub fn order_total<I>(line_totals: I) -> Result<Decimal, OrderError>
where
    I: IntoIterator<Item = Decimal>,
{
    line_totals
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, total| acc.checked_add(total))
        .filter(|total| *total <= max_amount())
        .ok_or_else(|| out_of_range("Order total"))
}

/// Rejects malformed line payloads before any domain logic runs.
pub fn validate_lines(lines: &[NewOrderLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }

    for line in lines {
        if line.quantity < 1 {
            return Err(OrderError::Validation(format!(
                "Quantity must be at least 1 (product {}, got {})",
                line.product_id, line.quantity
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(OrderError::Validation(format!(
                "Unit price must not be negative (product {}, got {})",
                line.product_id, line.unit_price
            )));
        }
        if line.unit_price.normalize().scale() > MONEY_SCALE {
            return Err(OrderError::Validation(format!(
                "Unit price must have at most {} decimal places (product {}, got {})",
                MONEY_SCALE, line.product_id, line.unit_price
            )));
        }
        if line.unit_price > max_amount() {
            return Err(out_of_range(&format!("Unit price of product {}", line.product_id)));
        }
    }

    let totals = lines
        .iter()
        .map(NewOrderLine::line_total)
        .collect::<Result<Vec<_>, _>>()?;
    order_total(totals)?;

    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
