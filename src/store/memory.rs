use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{
    DeadLetter, OrderQuery, OrderStore, OutboxMessage, Page, SortDirection, StoreError,
    StoreTransaction,
};
use crate::domain::inventory::Inventory;
use crate::domain::order::{sort_newest_first, Order, OrderAudit, OrderStatus, ProductId};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Used by tests and by the service when no DATABASE_URL is configured.
// Row locks are per-key async mutexes; a transaction holds the owned guards
// and stages its writes, which are applied under one write lock on commit.
//
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    orders: HashMap<Uuid, Order>,
    inventory: BTreeMap<ProductId, Inventory>,
    audits: Vec<OrderAudit>,
    outbox: Vec<OutboxMessage>,
    dead_letters: Vec<DeadLetter>,
}

// Row mutexes live in the table only while some transaction holds or waits
// on them. The table itself is only touched for map lookups, never across
// an await.
type LockTable<K> = Arc<std::sync::Mutex<HashMap<K, Arc<Mutex<()>>>>>;

fn row_lock<K: Hash + Eq>(table: &LockTable<K>, key: K) -> Arc<Mutex<()>> {
    let mut locks = table.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(key).or_default().clone()
}

/// Drops row mutexes nobody else references. Guards must be released first.
fn prune_row_locks<K, I>(table: &LockTable<K>, keys: I)
where
    K: Hash + Eq,
    I: IntoIterator<Item = K>,
{
    let mut locks = table.lock().unwrap_or_else(PoisonError::into_inner);
    for key in keys {
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
    order_locks: LockTable<Uuid>,
    inventory_locks: LockTable<ProductId>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(rows: Vec<Inventory>) -> Self {
        let state = MemoryState {
            inventory: rows.into_iter().map(|row| (row.product_id, row)).collect(),
            ..MemoryState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            ..Self::default()
        }
    }

    /// Demo catalogue used when running without a database.
    pub fn with_demo_inventory() -> Self {
        Self::with_inventory(vec![
            Inventory::new(1, 1, "Laptop", 50),
            Inventory::new(2, 2, "Mouse", 200),
            Inventory::new(3, 3, "Keyboard", 150),
            Inventory::new(4, 4, "Monitor", 75),
            Inventory::new(5, 5, "Headphones", 120),
        ])
    }

    /// Every outbox row, published or not, in creation order.
    pub async fn outbox_snapshot(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            order_locks: self.order_locks.clone(),
            inventory_locks: self.inventory_locks.clone(),
            order_guards: HashMap::new(),
            inventory_guards: BTreeMap::new(),
            staged_orders: HashMap::new(),
            inserted: BTreeSet::new(),
            staged_inventory: BTreeMap::new(),
            staged_audits: Vec::new(),
            staged_outbox: Vec::new(),
        }))
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).filter(|o| !o.deleted).cloned())
    }

    async fn find_order_including_deleted(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Order> = state.orders.values().filter(|o| query.matches(o)).collect();

        matching.sort_by(|a, b| a.order_date.cmp(&b.order_date).then_with(|| a.id.cmp(&b.id)));
        if query.sort == SortDirection::Desc {
            matching.reverse();
        }

        let total = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let content = matching
            .into_iter()
            .skip(offset)
            .take(query.size as usize)
            .cloned()
            .collect();

        Ok(Page::new(content, query, total))
    }

    async fn find_order_ids_by_status(&self, status: OrderStatus) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| !o.deleted && o.status == status)
            .collect();
        matching.sort_by(|a, b| a.order_date.cmp(&b.order_date).then_with(|| a.id.cmp(&b.id)));
        Ok(matching.into_iter().map(|o| o.id).collect())
    }

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, StoreError> {
        let state = self.state.read().await;
        Ok(OrderStatus::ALL
            .iter()
            .map(|status| {
                let count = state
                    .orders
                    .values()
                    .filter(|o| !o.deleted && o.status == *status)
                    .count();
                (*status, count as i64)
            })
            .collect())
    }

    async fn find_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        Ok(self.state.read().await.inventory.get(&product_id).cloned())
    }

    async fn audit_history(&self, order_id: Uuid) -> Result<Vec<OrderAudit>, StoreError> {
        let state = self.state.read().await;
        let mut rows: Vec<OrderAudit> = state
            .audits
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|m| m.published_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::Integrity(format!("Outbox message {} not found", id)))?;
        message.published_at = Some(Utc::now());
        Ok(())
    }

    async fn record_publish_failure(&self, id: Uuid, error: &str) -> Result<i32, StoreError> {
        let mut state = self.state.write().await;
        let message = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::Integrity(format!("Outbox message {} not found", id)))?;
        message.attempts += 1;
        message.last_error = Some(error.to_string());
        Ok(message.attempts)
    }

    async fn dead_letter(&self, message: &OutboxMessage, error: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.outbox.retain(|m| m.id != message.id);
        state.dead_letters.push(DeadLetter::from_message(message, error));
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError> {
        let state = self.state.read().await;
        Ok(state.dead_letters.iter().rev().take(limit).cloned().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// Transaction
// ============================================================================

struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    order_locks: LockTable<Uuid>,
    inventory_locks: LockTable<ProductId>,

    order_guards: HashMap<Uuid, OwnedMutexGuard<()>>,
    inventory_guards: BTreeMap<ProductId, OwnedMutexGuard<()>>,

    staged_orders: HashMap<Uuid, Order>,
    inserted: BTreeSet<Uuid>,
    staged_inventory: BTreeMap<ProductId, Inventory>,
    staged_audits: Vec<OrderAudit>,
    staged_outbox: Vec<OutboxMessage>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_order(&mut self, id: Uuid) -> Result<Option<Order>, StoreError> {
        if !self.order_guards.contains_key(&id) {
            let lock = row_lock(&self.order_locks, id);
            self.order_guards.insert(id, lock.lock_owned().await);
        }

        if let Some(staged) = self.staged_orders.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn lock_inventory(&mut self, product_ids: &[ProductId]) -> Result<Vec<Inventory>, StoreError> {
        let wanted: BTreeSet<ProductId> = product_ids.iter().copied().collect();

        for product_id in &wanted {
            if self.inventory_guards.contains_key(product_id) {
                continue;
            }
            let lock = row_lock(&self.inventory_locks, *product_id);
            self.inventory_guards.insert(*product_id, lock.lock_owned().await);
        }

        let state = self.state.read().await;
        Ok(wanted
            .iter()
            .filter_map(|id| {
                self.staged_inventory
                    .get(id)
                    .or_else(|| state.inventory.get(id))
                    .cloned()
            })
            .collect())
    }

    async fn save_inventory(&mut self, row: &Inventory) -> Result<(), StoreError> {
        if !self.inventory_guards.contains_key(&row.product_id) {
            return Err(StoreError::Integrity(format!(
                "Inventory row for product {} saved without holding its lock",
                row.product_id
            )));
        }
        if row.available_stock < 0 {
            return Err(StoreError::Integrity(format!(
                "Negative stock for product {}",
                row.product_id
            )));
        }
        self.staged_inventory.insert(row.product_id, row.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.inserted.insert(order.id);
        self.staged_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if !self.order_guards.contains_key(&order.id) && !self.inserted.contains(&order.id) {
            return Err(StoreError::Integrity(format!(
                "Order {} updated without holding its lock",
                order.id
            )));
        }
        self.staged_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn append_audit(&mut self, audit: &OrderAudit) -> Result<(), StoreError> {
        self.staged_audits.push(audit.clone());
        Ok(())
    }

    async fn enqueue_event(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        self.staged_outbox.push(message.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self;
        let shared = tx.state.clone();
        let mut state = shared.write().await;

        for (id, order) in &tx.staged_orders {
            match state.orders.get(id) {
                Some(_) if tx.inserted.contains(id) => {
                    return Err(StoreError::Conflict(format!("Order {} already exists", id)));
                }
                Some(current) if current.version + 1 != order.version => {
                    return Err(StoreError::Conflict(format!(
                        "Order {} is at version {}, expected {}",
                        id,
                        current.version,
                        order.version - 1
                    )));
                }
                _ => {}
            }
        }

        state.orders.extend(std::mem::take(&mut tx.staged_orders));
        state.inventory.extend(std::mem::take(&mut tx.staged_inventory));
        state.audits.append(&mut tx.staged_audits);
        state.outbox.append(&mut tx.staged_outbox);

        // Row guards drop with the transaction once the state lock is released.
        drop(state);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        let orders: Vec<Uuid> = self.order_guards.drain().map(|(id, _)| id).collect();
        let products: Vec<ProductId> = std::mem::take(&mut self.inventory_guards).into_keys().collect();

        prune_row_locks(&self.order_locks, orders);
        prune_row_locks(&self.inventory_locks, products);
    }
}
