use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{
    CustomerId, NewOrderLine, Order, OrderAudit, OrderLine, OrderStatus, ProductId,
};
use crate::store::{OrderQuery, SortDirection};

use super::error::ApiError;

// ============================================================================
// Request / response bodies for /api/v1/orders
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: Option<ProductId>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
}

impl OrderLineRequest {
    fn into_line(self, index: usize) -> Result<NewOrderLine, ApiError> {
        let missing = |field: &str| ApiError::validation(format!("orderLines[{}].{} is required", index, field));
        Ok(NewOrderLine::new(
            self.product_id.ok_or_else(|| missing("productId"))?,
            self.quantity.ok_or_else(|| missing("quantity"))?,
            self.unit_price.ok_or_else(|| missing("unitPrice"))?,
        ))
    }
}

fn into_lines(lines: Option<Vec<OrderLineRequest>>) -> Result<Vec<NewOrderLine>, ApiError> {
    lines
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, line)| line.into_line(i))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Option<CustomerId>,
    pub order_lines: Option<Vec<OrderLineRequest>>,
}

impl CreateOrderRequest {
    pub fn into_parts(self) -> Result<(CustomerId, Vec<NewOrderLine>), ApiError> {
        let customer_id = self
            .customer_id
            .ok_or_else(|| ApiError::validation("Customer ID is required"))?;
        Ok((customer_id, into_lines(self.order_lines)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub order_lines: Option<Vec<OrderLineRequest>>,
}

impl UpdateOrderRequest {
    pub fn into_lines(self) -> Result<Vec<NewOrderLine>, ApiError> {
        into_lines(self.order_lines)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: Option<String>,
    pub reason: Option<String>,
}

impl UpdateOrderStatusRequest {
    pub fn target(&self) -> Result<OrderStatus, ApiError> {
        let raw = self
            .status
            .as_deref()
            .ok_or_else(|| ApiError::validation("Status is required"))?;
        let target: OrderStatus = raw.parse().map_err(ApiError::from)?;
        if self.reason.is_some() && target != OrderStatus::Cancelled {
            return Err(ApiError::validation("reason is only accepted when cancelling"));
        }
        Ok(target)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersParams {
    pub customer_id: Option<CustomerId>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort_dir: Option<String>,
}

impl ListOrdersParams {
    pub fn into_query(self) -> Result<OrderQuery, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()
            .map_err(ApiError::from)?;
        let sort = match self.sort_dir.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("desc") => SortDirection::Desc,
            Some("asc") => SortDirection::Asc,
            Some(other) => {
                return Err(ApiError::validation(format!(
                    "sortDir must be asc or desc, got {}",
                    other
                )))
            }
        };

        Ok(OrderQuery {
            customer_id: self.customer_id,
            status,
            page: self.page.unwrap_or(0),
            size: self.size.unwrap_or(OrderQuery::DEFAULT_PAGE_SIZE),
            sort,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            id: line.id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub status_description: &'static str,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub order_lines: Vec<OrderLineResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            status_description: order.status.description(),
            order_date: order.order_date,
            total_amount: order.total_amount,
            order_lines: order.lines.iter().map(OrderLineResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAuditResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
}

impl From<OrderAudit> for OrderAuditResponse {
    fn from(audit: OrderAudit) -> Self {
        Self {
            id: audit.id,
            order_id: audit.order_id,
            field_name: audit.field_name,
            old_value: audit.old_value,
            new_value: audit.new_value,
            changed_at: audit.changed_at,
            changed_by: audit.changed_by,
        }
    }
}
