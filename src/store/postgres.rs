use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{
    DeadLetter, OrderQuery, OrderStore, OutboxMessage, Page, SortDirection, StoreError,
    StoreTransaction,
};
use crate::domain::inventory::Inventory;
use crate::domain::order::{Order, OrderAudit, OrderLine, OrderStatus, ProductId};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// Row locks use `SELECT ... FOR UPDATE` inside the caller's transaction.
// Inventory rows are locked with `ORDER BY product_id` so the lock order is
// the same for every writer.
//
// ============================================================================

const ORDER_COLUMNS: &str =
    "id, version, customer_id, status, order_date, total_amount, deleted, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    version: i64,
    customer_id: i64,
    status: String,
    order_date: DateTime<Utc>,
    total_amount: Decimal,
    deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct InventoryRow {
    id: i64,
    product_id: i64,
    product_name: String,
    available_stock: i32,
}

impl From<InventoryRow> for Inventory {
    fn from(row: InventoryRow) -> Self {
        Inventory::new(row.id, row.product_id, row.product_name, row.available_stock)
    }
}

impl From<LineRow> for OrderLine {
    fn from(row: LineRow) -> Self {
        OrderLine {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::from_str(raw)
        .map_err(|_| StoreError::Integrity(format!("Unknown order status in database: {}", raw)))
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
        Ok(Order {
            id: self.id,
            version: self.version,
            customer_id: self.customer_id,
            status: parse_status(&self.status)?,
            order_date: self.order_date,
            total_amount: self.total_amount,
            lines,
            deleted: self.deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn load_lines<'e, E>(executor: E, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>, StoreError>
where
    E: PgExecutor<'e>,
{
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<LineRow> = sqlx::query_as(
        "SELECT id, order_id, product_id, quantity, unit_price, line_total
         FROM order_lines
         WHERE order_id = ANY($1)
         ORDER BY order_id, position",
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    for row in rows {
        by_order.entry(row.order_id).or_default().push(row.into());
    }
    Ok(by_order)
}

async fn hydrate<'e, E>(executor: E, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError>
where
    E: PgExecutor<'e>,
{
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut lines = load_lines(executor, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let order_lines = lines.remove(&row.id).unwrap_or_default();
            row.into_order(order_lines)
        })
        .collect()
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    builder.push(" WHERE NOT deleted");
    if let Some(customer_id) = query.customer_id {
        builder.push(" AND customer_id = ").push_bind(customer_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "✅ Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("✅ Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1 AND NOT deleted",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(hydrate(&self.pool, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_order_including_deleted(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(hydrate(&self.pool, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filters(&mut count, query);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
        push_filters(&mut select, query);
        select.push(match query.sort {
            SortDirection::Asc => " ORDER BY order_date ASC, id ASC",
            SortDirection::Desc => " ORDER BY order_date DESC, id DESC",
        });
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows: Vec<OrderRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let orders = hydrate(&self.pool, rows).await?;

        Ok(Page::new(orders, query, total.max(0) as u64))
    }

    async fn find_order_ids_by_status(&self, status: OrderStatus) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM orders WHERE status = $1 AND NOT deleted ORDER BY order_date, id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM orders WHERE NOT deleted GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts: HashMap<OrderStatus, i64> = HashMap::new();
        for (status, count) in rows {
            counts.insert(parse_status(&status)?, count);
        }

        Ok(OrderStatus::ALL
            .iter()
            .map(|s| (*s, counts.get(s).copied().unwrap_or(0)))
            .collect())
    }

    async fn find_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        let row: Option<InventoryRow> = sqlx::query_as(
            "SELECT id, product_id, product_name, available_stock FROM inventory WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Inventory::from))
    }

    async fn audit_history(&self, order_id: Uuid) -> Result<Vec<OrderAudit>, StoreError> {
        let rows: Vec<(Uuid, Uuid, String, Option<String>, Option<String>, DateTime<Utc>, String)> =
            sqlx::query_as(
                "SELECT id, order_id, field_name, old_value, new_value, changed_at, changed_by
                 FROM order_audit
                 WHERE order_id = $1
                 ORDER BY changed_at DESC, id DESC",
            )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, order_id, field_name, old_value, new_value, changed_at, changed_by)| OrderAudit {
                id,
                order_id,
                field_name,
                old_value,
                new_value,
                changed_at,
                changed_by,
            })
            .collect())
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT id, aggregate_id, event_id, event_type, topic, payload, correlation_id,
                    created_at, attempts, last_error, published_at
             FROM outbox_messages
             WHERE published_at IS NULL
             ORDER BY created_at, id
             LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE outbox_messages SET published_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_publish_failure(&self, id: Uuid, error: &str) -> Result<i32, StoreError> {
        let (attempts,): (i32,) = sqlx::query_as(
            "UPDATE outbox_messages
             SET attempts = attempts + 1, last_error = $2
             WHERE id = $1
             RETURNING attempts",
        )
        .bind(id)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn dead_letter(&self, message: &OutboxMessage, error: &str) -> Result<(), StoreError> {
        let entry = DeadLetter::from_message(message, error);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO dead_letter_queue (
                id, outbox_id, aggregate_id, event_id, event_type, topic, payload,
                error_message, failure_count, first_failed_at, last_failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.id)
        .bind(entry.outbox_id)
        .bind(entry.aggregate_id)
        .bind(entry.event_id)
        .bind(&entry.event_type)
        .bind(&entry.topic)
        .bind(&entry.payload)
        .bind(&entry.error_message)
        .bind(entry.failure_count)
        .bind(entry.first_failed_at)
        .bind(entry.last_failed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM outbox_messages WHERE id = $1")
            .bind(message.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            "SELECT id, outbox_id, aggregate_id, event_id, event_type, topic, payload,
                    error_message, failure_count, first_failed_at, last_failed_at
             FROM dead_letter_queue
             ORDER BY last_failed_at DESC
             LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeadLetter::from).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    aggregate_id: Uuid,
    event_id: Uuid,
    event_type: String,
    topic: String,
    payload: String,
    correlation_id: Uuid,
    created_at: DateTime<Utc>,
    attempts: i32,
    last_error: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        OutboxMessage {
            id: row.id,
            aggregate_id: row.aggregate_id,
            event_id: row.event_id,
            event_type: row.event_type,
            topic: row.topic,
            payload: row.payload,
            correlation_id: row.correlation_id,
            created_at: row.created_at,
            attempts: row.attempts,
            last_error: row.last_error,
            published_at: row.published_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: Uuid,
    outbox_id: Uuid,
    aggregate_id: Uuid,
    event_id: Uuid,
    event_type: String,
    topic: String,
    payload: String,
    error_message: String,
    failure_count: i32,
    first_failed_at: DateTime<Utc>,
    last_failed_at: DateTime<Utc>,
}

impl From<DeadLetterRow> for DeadLetter {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetter {
            id: row.id,
            outbox_id: row.outbox_id,
            aggregate_id: row.aggregate_id,
            event_id: row.event_id,
            event_type: row.event_type,
            topic: row.topic,
            payload: row.payload,
            error_message: row.error_message,
            failure_count: row.failure_count,
            first_failed_at: row.first_failed_at,
            last_failed_at: row.last_failed_at,
        }
    }
}

// ============================================================================
// Transaction
// ============================================================================

struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgStoreTransaction {
    async fn insert_lines(&mut self, order: &Order) -> Result<(), StoreError> {
        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_lines (id, order_id, position, product_id, quantity, unit_price, line_total)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(line.id)
            .bind(order.id)
            .bind(position as i32)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.line_total)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(hydrate(&mut *self.tx, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn lock_inventory(&mut self, product_ids: &[ProductId]) -> Result<Vec<Inventory>, StoreError> {
        let mut ids = product_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let rows: Vec<InventoryRow> = sqlx::query_as(
            "SELECT id, product_id, product_name, available_stock
             FROM inventory
             WHERE product_id = ANY($1)
             ORDER BY product_id
             FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Inventory::from).collect())
    }

    async fn save_inventory(&mut self, row: &Inventory) -> Result<(), StoreError> {
        sqlx::query("UPDATE inventory SET available_stock = $2 WHERE product_id = $1")
            .bind(row.product_id)
            .bind(row.available_stock)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, version, customer_id, status, order_date, total_amount, deleted, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.order_date)
        .bind(order.total_amount)
        .bind(order.deleted)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        self.insert_lines(order).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders
             SET version = $2, status = $3, total_amount = $4, deleted = $5, updated_at = $6
             WHERE id = $1 AND version = $7",
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(order.deleted)
        .bind(order.updated_at)
        .bind(order.version - 1)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "Order {} is no longer at version {}",
                order.id,
                order.version - 1
            )));
        }

        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut *self.tx)
            .await?;

        self.insert_lines(order).await
    }

    async fn append_audit(&mut self, audit: &OrderAudit) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO order_audit (id, order_id, field_name, old_value, new_value, changed_at, changed_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(audit.id)
        .bind(audit.order_id)
        .bind(&audit.field_name)
        .bind(&audit.old_value)
        .bind(&audit.new_value)
        .bind(audit.changed_at)
        .bind(&audit.changed_by)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn enqueue_event(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO outbox_messages (
                id, aggregate_id, event_id, event_type, topic, payload, correlation_id,
                created_at, attempts, last_error, published_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(message.id)
        .bind(message.aggregate_id)
        .bind(message.event_id)
        .bind(&message.event_type)
        .bind(&message.topic)
        .bind(&message.payload)
        .bind(message.correlation_id)
        .bind(message.created_at)
        .bind(message.attempts)
        .bind(&message.last_error)
        .bind(message.published_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
