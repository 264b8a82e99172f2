use uuid::Uuid;

use super::value_objects::{OrderStatus, ProductId};
use crate::store::StoreError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{resource} not found with id: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Cannot transition order from {current} to {target}")]
    InvalidTransition {
        current: OrderStatus,
        target: OrderStatus,
    },

    #[error("Cannot update order in {current} status")]
    NotModifiable { current: OrderStatus },

    #[error(
        "Insufficient stock for product {product_id}. Requested: {requested}, Available: {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification used by callers that map errors onto transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidOrderState,
    InsufficientStock,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidOrderState => "invalid_order_state",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl OrderError {
    pub fn order_not_found(id: Uuid) -> Self {
        OrderError::NotFound {
            resource: "Order",
            id: id.to_string(),
        }
    }

    pub fn product_not_found(product_id: ProductId) -> Self {
        OrderError::NotFound {
            resource: "Product",
            id: product_id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotFound { .. } => ErrorKind::NotFound,
            OrderError::InvalidTransition { .. } | OrderError::NotModifiable { .. } => {
                ErrorKind::InvalidOrderState
            }
            OrderError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            OrderError::Validation(_) => ErrorKind::Validation,
            OrderError::Store(_) => ErrorKind::Internal,
        }
    }
}
