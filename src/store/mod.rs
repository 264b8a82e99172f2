use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::inventory::Inventory;
use crate::domain::order::{CustomerId, Order, OrderAudit, OrderStatus, ProductId};
use crate::events::{serialize_event, DomainEvent, EventEnvelope};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

// ============================================================================
// Order Store - persistence boundary for orders, inventory, audit and outbox
// ============================================================================
//
// Every write goes through a `StoreTransaction`. Row locks taken inside a
// transaction are held until it commits or is dropped; dropping without
// committing rolls everything back.
//
// Lock order: the order row first, then inventory rows in ascending product id.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    #[error("Data integrity error: {0}")]
    Integrity(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Integrity(err.to_string())
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Filtered, paginated order listing. Pages are zero based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub customer_id: Option<CustomerId>,
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub size: u32,
    pub sort: SortDirection,
}

impl OrderQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn matches(&self, order: &Order) -> bool {
        !order.deleted
            && self.customer_id.map_or(true, |c| order.customer_id == c)
            && self.status.map_or(true, |s| order.status == s)
    }
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            customer_id: None,
            status: None,
            page: 0,
            size: Self::DEFAULT_PAGE_SIZE,
            sort: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, query: &OrderQuery, total_elements: u64) -> Self {
        let size = u64::from(query.size.max(1));
        Self {
            content,
            page: query.page,
            size: query.size,
            total_elements,
            total_pages: total_elements.div_ceil(size),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

// ============================================================================
// Outbox
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    /// Serialized `EventEnvelope`.
    pub payload: String,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn from_envelope<E: DomainEvent>(envelope: &EventEnvelope<E>) -> Result<Self, StoreError> {
        Ok(Self {
            id: Uuid::now_v7(),
            aggregate_id: envelope.aggregate_id,
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            topic: envelope.routing_key().to_string(),
            payload: serialize_event(envelope)?,
            correlation_id: envelope.correlation_id,
            created_at: envelope.timestamp,
            attempts: 0,
            last_error: None,
            published_at: None,
        })
    }

    /// Partition key; keeps per-order ordering on the broker.
    pub fn key(&self) -> String {
        self.aggregate_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub outbox_id: Uuid,
    pub aggregate_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_message(message: &OutboxMessage, error_message: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            outbox_id: message.id,
            aggregate_id: message.aggregate_id,
            event_id: message.event_id,
            event_type: message.event_type.clone(),
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            error_message: error_message.to_string(),
            failure_count: message.attempts,
            first_failed_at: message.created_at,
            last_failed_at: now,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Active (not soft-deleted) order.
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_order_including_deleted(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError>;

    /// Ids of active orders in `status`, oldest first.
    async fn find_order_ids_by_status(&self, status: OrderStatus) -> Result<Vec<Uuid>, StoreError>;

    /// Active order count per status, in lifecycle order.
    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, StoreError>;

    async fn find_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError>;

    /// Audit rows newest first.
    async fn audit_history(&self, order_id: Uuid) -> Result<Vec<OrderAudit>, StoreError>;

    /// Unpublished outbox rows in creation order.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError>;

    async fn mark_published(&self, id: Uuid) -> Result<(), StoreError>;

    /// Returns the attempt count after recording the failure.
    async fn record_publish_failure(&self, id: Uuid, error: &str) -> Result<i32, StoreError>;

    /// Removes the message from the outbox and parks it in the dead-letter queue.
    async fn dead_letter(&self, message: &OutboxMessage, error: &str) -> Result<(), StoreError>;

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError>;

    /// Connectivity probe used by health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Locks the order row (soft-deleted rows included) until commit or drop.
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Locks inventory rows in ascending product id order. Unknown products
    /// are simply absent from the result.
    async fn lock_inventory(&mut self, product_ids: &[ProductId]) -> Result<Vec<Inventory>, StoreError>;

    async fn save_inventory(&mut self, row: &Inventory) -> Result<(), StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Persists header and line set. `order.version` must already carry the
    /// new version; the stored row must be at `order.version - 1`.
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn append_audit(&mut self, audit: &OrderAudit) -> Result<(), StoreError>;

    async fn enqueue_event(&mut self, message: &OutboxMessage) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
