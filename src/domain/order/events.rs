use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::Order;
use super::value_objects::{CustomerId, OrderStatus, ProductId};
use crate::events::DomainEvent;

// ============================================================================
// Order Events - Contracts consumed by notification and analytics
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderUpdated(OrderUpdated),
    OrderStatusChanged(OrderStatusChanged),
    OrderCancelled(OrderCancelled),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "ORDER_CREATED",
            OrderEvent::OrderUpdated(_) => "ORDER_UPDATED",
            OrderEvent::OrderStatusChanged(_) => "ORDER_STATUS_CHANGED",
            OrderEvent::OrderCancelled(_) => "ORDER_CANCELLED",
        }
    }

    fn aggregate_id(&self) -> Uuid {
        match self {
            OrderEvent::OrderCreated(e) => e.order_id,
            OrderEvent::OrderUpdated(e) => e.order_id,
            OrderEvent::OrderStatusChanged(e) => e.order_id,
            OrderEvent::OrderCancelled(e) => e.order_id,
        }
    }

    fn routing_key(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "order.created",
            OrderEvent::OrderUpdated(_) => "order.updated",
            OrderEvent::OrderStatusChanged(_) => "order.status.changed",
            OrderEvent::OrderCancelled(_) => "order.cancelled",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventOrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order Created - Initial event in order lifecycle
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
    pub lines: Vec<EventOrderLine>,
}

/// Order Updated - Line set replaced
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdated {
    pub order_id: Uuid,
    pub customer_id: CustomerId,
    pub total_amount: Decimal,
}

/// Order Status Changed - Published for every manual or scheduled transition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub customer_id: CustomerId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
}

/// Order Cancelled - Published alongside the status change into CANCELLED
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: Uuid,
    pub customer_id: CustomerId,
    pub reason: String,
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        OrderEvent::OrderCreated(OrderCreated {
            order_id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            total_amount: order.total_amount,
            order_date: order.order_date,
            lines: order
                .lines
                .iter()
                .map(|l| EventOrderLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
        })
    }

    pub fn updated(order: &Order) -> Self {
        OrderEvent::OrderUpdated(OrderUpdated {
            order_id: order.id,
            customer_id: order.customer_id,
            total_amount: order.total_amount,
        })
    }

    pub fn status_changed(order: &Order, old_status: OrderStatus) -> Self {
        OrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: order.id,
            customer_id: order.customer_id,
            old_status,
            new_status: order.status,
        })
    }

    pub fn cancelled(order: &Order, reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelled {
            order_id: order.id,
            customer_id: order.customer_id,
            reason: reason.into(),
        })
    }
}
