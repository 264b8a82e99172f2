use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::aggregate::Order;
use super::audit::{AuditField, OrderAudit, SYSTEM_ACTOR};
use super::errors::{ErrorKind, OrderError};
use super::events::OrderEvent;
use super::value_objects::{validate_lines, CustomerId, NewOrderLine, OrderStatus};
use crate::domain::inventory::{LockedStock, StockDemand};
use crate::events::EventEnvelope;
use crate::metrics::Metrics;
use crate::store::{OrderQuery, OrderStore, OutboxMessage, Page, StoreTransaction};

// ============================================================================
// Order Service - transactional use-cases
// ============================================================================
//
// Each operation runs in exactly one store transaction covering the order
// row, the inventory rows it touches, the audit trail and the outbox. Any
// error drops the transaction, which rolls all of it back.
//
// ============================================================================

const DEFAULT_CANCEL_REASON: &str = "Order cancelled";

/// Caller identity carried into audit rows and event envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub changed_by: String,
}

impl RequestContext {
    pub fn new(correlation_id: Uuid, changed_by: impl Into<String>) -> Self {
        Self {
            correlation_id,
            changed_by: changed_by.into(),
        }
    }

    /// Context for scheduler driven changes.
    pub fn system() -> Self {
        Self::new(Uuid::new_v4(), SYSTEM_ACTOR)
    }
}

/// Outcome of one progression sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub advanced: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        customer_id: CustomerId,
        lines: &[NewOrderLine],
    ) -> Result<Order, OrderError> {
        self.instrument("create_order", async {
            if customer_id <= 0 {
                return Err(OrderError::Validation("customerId must be positive".into()));
            }
            validate_lines(lines)?;

            let demand = StockDemand::from_requests(lines);
            let mut tx = self.store.begin().await?;

            let mut stock = LockedStock::acquire(tx.as_mut(), demand.products()).await?;
            stock.reserve(&demand)?;

            let order = Order::new(customer_id, lines)?;

            stock.flush(tx.as_mut()).await?;
            tx.insert_order(&order).await?;
            enqueue(tx.as_mut(), ctx, OrderEvent::created(&order), None).await?;
            tx.commit().await?;

            self.metrics.orders_created.inc();
            tracing::info!(
                order_id = %order.id,
                customer_id = customer_id,
                total_amount = %order.total_amount,
                lines = order.lines.len(),
                correlation_id = %ctx.correlation_id,
                "✅ Order created"
            );
            Ok(order)
        })
        .await
    }

    /// Replaces the line set of an UNPROCESSED order.
    pub async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        lines: &[NewOrderLine],
    ) -> Result<Order, OrderError> {
        self.instrument("update_order", async {
            validate_lines(lines)?;

            let mut tx = self.store.begin().await?;
            let mut order = lock_active_order(tx.as_mut(), order_id).await?;
            order.ensure_modifiable()?;

            let released = order.stock_demand();
            let requested = StockDemand::from_requests(lines);

            let mut stock =
                LockedStock::acquire(tx.as_mut(), released.products().chain(requested.products()))
                    .await?;
            stock.release(&released)?;
            stock.reserve(&requested)?;

            let before = order.lines_summary();
            order.replace_lines(lines)?;
            order.version += 1;

            stock.flush(tx.as_mut()).await?;
            tx.update_order(&order).await?;
            tx.append_audit(&OrderAudit::record(
                order.id,
                AuditField::OrderLines,
                Some(before),
                Some(order.lines_summary()),
                ctx.changed_by.clone(),
            ))
            .await?;
            enqueue(tx.as_mut(), ctx, OrderEvent::updated(&order), None).await?;
            tx.commit().await?;

            self.metrics.orders_updated.inc();
            tracing::info!(
                order_id = %order.id,
                total_amount = %order.total_amount,
                correlation_id = %ctx.correlation_id,
                "✅ Order lines replaced"
            );
            Ok(order)
        })
        .await
    }

    pub async fn update_order_status(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, OrderError> {
        self.instrument("update_order_status", self.change_status(ctx, order_id, target, None))
            .await
    }

    pub async fn cancel_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Order, OrderError> {
        self.instrument(
            "cancel_order",
            self.change_status(ctx, order_id, OrderStatus::Cancelled, reason),
        )
        .await
    }

    /// Soft delete. Stock is released only while the order is UNPROCESSED.
    pub async fn delete_order(&self, ctx: &RequestContext, order_id: Uuid) -> Result<(), OrderError> {
        self.instrument("delete_order", async {
            let mut tx = self.store.begin().await?;
            let mut order = lock_active_order(tx.as_mut(), order_id).await?;

            if order.status == OrderStatus::Unprocessed {
                let held = order.stock_demand();
                let mut stock = LockedStock::acquire(tx.as_mut(), held.products()).await?;
                stock.release(&held)?;
                stock.flush(tx.as_mut()).await?;
            }

            order.soft_delete();
            order.version += 1;

            tx.update_order(&order).await?;
            tx.append_audit(&OrderAudit::record(
                order.id,
                AuditField::Deleted,
                Some("false".into()),
                Some("true".into()),
                ctx.changed_by.clone(),
            ))
            .await?;
            tx.commit().await?;

            self.metrics.orders_deleted.inc();
            tracing::info!(
                order_id = %order.id,
                status = %order.status,
                correlation_id = %ctx.correlation_id,
                "🗑️ Order deleted"
            );
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(order_id))
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, OrderError> {
        if query.size == 0 || query.size > OrderQuery::MAX_PAGE_SIZE {
            return Err(OrderError::Validation(format!(
                "size must be between 1 and {}",
                OrderQuery::MAX_PAGE_SIZE
            )));
        }
        Ok(self.store.list_orders(query).await?)
    }

    /// Audit rows newest first. Soft-deleted orders keep their history.
    pub async fn get_order_history(&self, order_id: Uuid) -> Result<Vec<OrderAudit>, OrderError> {
        if self
            .store
            .find_order_including_deleted(order_id)
            .await?
            .is_none()
        {
            return Err(OrderError::order_not_found(order_id));
        }
        Ok(self.store.audit_history(order_id).await?)
    }

    pub async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, OrderError> {
        Ok(self.store.count_by_status().await?)
    }

    // ========================================================================
    // Status progression
    // ========================================================================

    /// Moves every active order one stage forward.
    ///
    /// Candidate ids for all stages are read before anything is advanced, and
    /// each order's status is re-checked under its row lock, so no order moves
    /// more than one stage per sweep. Failures are counted, never propagated.
    pub async fn progress_order_statuses(&self) -> Result<SweepReport, OrderError> {
        let started = Instant::now();
        let ctx = RequestContext::system();
        let stages = [
            OrderStatus::Unprocessed,
            OrderStatus::Processing,
            OrderStatus::Processed,
        ];

        let mut snapshot = Vec::with_capacity(stages.len());
        for stage in stages {
            snapshot.push((stage, self.store.find_order_ids_by_status(stage).await?));
        }

        tracing::info!(
            correlation_id = %ctx.correlation_id,
            candidates = snapshot.iter().map(|(_, ids)| ids.len()).sum::<usize>(),
            "🔄 Starting order status progression"
        );

        let mut report = SweepReport::default();
        for (stage, ids) in snapshot {
            for order_id in ids {
                match self.advance_order(&ctx, order_id, stage).await {
                    Ok(true) => report.advanced += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        self.metrics.record_failure("progress_order", e.kind().as_str());
                        tracing::error!(
                            order_id = %order_id,
                            from = %stage,
                            error = %e,
                            "Failed to advance order"
                        );
                    }
                }
            }
        }

        self.metrics.record_sweep(
            started.elapsed().as_secs_f64(),
            report.advanced,
            report.skipped,
            report.failed,
        );
        tracing::info!(
            advanced = report.advanced,
            skipped = report.skipped,
            failed = report.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "✅ Order status progression completed"
        );
        Ok(report)
    }

    /// Returns false when the order left `from` since the snapshot.
    async fn advance_order(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        from: OrderStatus,
    ) -> Result<bool, OrderError> {
        let mut tx = self.store.begin().await?;
        let mut order = match tx.lock_order(order_id).await? {
            Some(order) if !order.deleted && order.status == from => order,
            _ => {
                tracing::debug!(order_id = %order_id, from = %from, "Order moved since snapshot, skipping");
                return Ok(false);
            }
        };

        self.apply_status_change(tx.as_mut(), ctx, &mut order, from.next_status(), None)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn change_status(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        target: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_active_order(tx.as_mut(), order_id).await?;

        if self
            .apply_status_change(tx.as_mut(), ctx, &mut order, target, reason)
            .await?
        {
            tx.commit().await?;
        }
        Ok(order)
    }

    /// Returns false for an identity transition, which writes nothing.
    async fn apply_status_change(
        &self,
        tx: &mut dyn StoreTransaction,
        ctx: &RequestContext,
        order: &mut Order,
        target: OrderStatus,
        reason: Option<&str>,
    ) -> Result<bool, OrderError> {
        let previous = order.transition_to(target)?;
        if previous == target {
            return Ok(false);
        }

        if target == OrderStatus::Cancelled && previous == OrderStatus::Unprocessed {
            let held = order.stock_demand();
            let mut stock = LockedStock::acquire(&mut *tx, held.products()).await?;
            stock.release(&held)?;
            stock.flush(&mut *tx).await?;
        }

        order.version += 1;
        tx.update_order(order).await?;
        tx.append_audit(&OrderAudit::record(
            order.id,
            AuditField::Status,
            Some(previous.as_str().to_string()),
            Some(target.as_str().to_string()),
            ctx.changed_by.clone(),
        ))
        .await?;

        let status_event =
            enqueue(&mut *tx, ctx, OrderEvent::status_changed(order, previous), None).await?;
        if target == OrderStatus::Cancelled {
            let reason = reason.unwrap_or(DEFAULT_CANCEL_REASON);
            enqueue(&mut *tx, ctx, OrderEvent::cancelled(order, reason), Some(status_event)).await?;
        }

        self.metrics.record_transition(previous, target);
        tracing::info!(
            order_id = %order.id,
            customer_id = order.customer_id,
            from = %previous,
            to = %target,
            correlation_id = %ctx.correlation_id,
            "✅ Order status changed"
        );
        Ok(true)
    }

    async fn instrument<T, F>(&self, operation: &'static str, work: F) -> Result<T, OrderError>
    where
        F: Future<Output = Result<T, OrderError>>,
    {
        let started = Instant::now();
        let result = work.await;
        self.metrics
            .record_operation(operation, started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            let kind = e.kind();
            self.metrics.record_failure(operation, kind.as_str());
            match kind {
                ErrorKind::Internal => {
                    tracing::error!(operation = operation, error = %e, "❌ Order operation failed")
                }
                _ => tracing::warn!(operation = operation, error = %e, "Order operation rejected"),
            }
        }
        result
    }
}

async fn lock_active_order(tx: &mut dyn StoreTransaction, order_id: Uuid) -> Result<Order, OrderError> {
    match tx.lock_order(order_id).await? {
        Some(order) if !order.deleted => Ok(order),
        _ => Err(OrderError::order_not_found(order_id)),
    }
}

/// Writes the event to the outbox and returns its event id.
async fn enqueue(
    tx: &mut dyn StoreTransaction,
    ctx: &RequestContext,
    event: OrderEvent,
    causation_id: Option<Uuid>,
) -> Result<Uuid, OrderError> {
    let mut envelope = EventEnvelope::new(event, ctx.correlation_id);
    envelope.causation_id = causation_id;
    tx.enqueue_event(&OutboxMessage::from_envelope(&envelope)?).await?;
    Ok(envelope.event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Inventory;
    use crate::domain::order::{max_amount, ProductId};
    use crate::store::InMemoryOrderStore;
    use rust_decimal::Decimal;

    const P1: ProductId = 101;
    const P2: ProductId = 102;

    fn setup(stock: &[(ProductId, i32)]) -> (OrderService, InMemoryOrderStore) {
        let store = InMemoryOrderStore::with_inventory(
            stock
                .iter()
                .enumerate()
                .map(|(i, (product, qty))| Inventory::new(i as i64 + 1, *product, format!("Product {}", product), *qty))
                .collect(),
        );
        let service = OrderService::new(Arc::new(store.clone()), Arc::new(Metrics::new().unwrap()));
        (service, store)
    }

    fn line(product_id: ProductId, quantity: i32, cents: i64) -> NewOrderLine {
        NewOrderLine::new(product_id, quantity, Decimal::new(cents, 2))
    }

    async fn stock_of(store: &InMemoryOrderStore, product_id: ProductId) -> i32 {
        store.find_inventory(product_id).await.unwrap().unwrap().available_stock
    }

    async fn events_for(store: &InMemoryOrderStore, order_id: Uuid) -> Vec<EventEnvelope<OrderEvent>> {
        store
            .outbox_snapshot()
            .await
            .iter()
            .filter(|m| m.aggregate_id == order_id)
            .map(|m| serde_json::from_str(&m.payload).unwrap())
            .collect()
    }

    fn count_type(events: &[EventEnvelope<OrderEvent>], event_type: &str) -> usize {
        events.iter().filter(|e| e.event_type == event_type).count()
    }

    #[tokio::test]
    async fn test_create_order_reserves_stock_and_emits_event() {
        let (service, store) = setup(&[(P1, 10), (P2, 5)]);
        let ctx = RequestContext::system();

        let order = service
            .create_order(&ctx, 7, &[line(P1, 3, 1000), line(P2, 2, 250)])
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Unprocessed);
        assert_eq!(order.total_amount, Decimal::new(3500, 2));
        assert_eq!(stock_of(&store, P1).await, 7);
        assert_eq!(stock_of(&store, P2).await, 3);

        let events = events_for(&store, order.id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "ORDER_CREATED");
        assert_eq!(events[0].correlation_id, ctx.correlation_id);
    }

    #[tokio::test]
    async fn test_failed_create_changes_nothing() {
        let (service, store) = setup(&[(P1, 10), (P2, 1)]);

        let err = service
            .create_order(&RequestContext::system(), 7, &[line(P1, 3, 100), line(P2, 2, 100)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InsufficientStock { product_id: P2, requested: 2, available: 1 }
        ));
        assert_eq!(stock_of(&store, P1).await, 10);
        assert_eq!(stock_of(&store, P2).await, 1);
        assert!(store.outbox_snapshot().await.is_empty());
        assert_eq!(store.list_orders(&OrderQuery::default()).await.unwrap().total_elements, 0);
    }

    #[tokio::test]
    async fn test_create_with_unknown_product_is_not_found() {
        let (service, store) = setup(&[(P1, 10)]);

        let err = service
            .create_order(&RequestContext::system(), 7, &[line(P1, 1, 100), line(999, 1, 100)])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(stock_of(&store, P1).await, 10);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_payload() {
        let (service, _) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();

        let err = service.create_order(&ctx, 7, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service.create_order(&ctx, 0, &[line(P1, 1, 100)]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_repeated_product_lines_are_checked_together() {
        let (service, store) = setup(&[(P1, 5)]);

        let err = service
            .create_order(&RequestContext::system(), 7, &[line(P1, 3, 100), line(P1, 3, 100)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InsufficientStock { requested: 6, available: 5, .. }
        ));
        assert_eq!(stock_of(&store, P1).await, 5);
    }

    #[tokio::test]
    async fn test_update_order_nets_stock_to_new_lines() {
        let (service, store) = setup(&[(P1, 10), (P2, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 4, 100)]).await.unwrap();

        let updated = service
            .update_order(&ctx, order.id, &[line(P1, 1, 100), line(P2, 6, 50)])
            .await
            .unwrap();

        assert_eq!(stock_of(&store, P1).await, 9);
        assert_eq!(stock_of(&store, P2).await, 4);
        assert_eq!(updated.total_amount, Decimal::new(400, 2));
        assert_eq!(updated.version, 1);

        let history = service.get_order_history(order.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field_name, "ORDER_LINES");
        assert_eq!(count_type(&events_for(&store, order.id).await, "ORDER_UPDATED"), 1);
    }

    #[tokio::test]
    async fn test_update_can_reuse_stock_it_already_holds() {
        let (service, store) = setup(&[(P1, 5)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 5, 100)]).await.unwrap();

        service.update_order(&ctx, order.id, &[line(P1, 5, 200)]).await.unwrap();
        assert_eq!(stock_of(&store, P1).await, 0);
    }

    #[tokio::test]
    async fn test_update_rejected_once_processing() {
        let (service, store) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 2, 100)]).await.unwrap();
        service
            .update_order_status(&ctx, order.id, OrderStatus::Processing)
            .await
            .unwrap();

        let err = service
            .update_order(&ctx, order.id, &[line(P1, 5, 100)])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidOrderState);
        assert_eq!(stock_of(&store, P1).await, 8);
        assert_eq!(service.get_order(order.id).await.unwrap().lines[0].quantity, 2);
    }

    async fn assert_update_left_no_trace(
        service: &OrderService,
        store: &InMemoryOrderStore,
        original: &Order,
        stock: &[(ProductId, i32)],
    ) {
        let current = service.get_order(original.id).await.unwrap();
        assert_eq!(current.lines, original.lines);
        assert_eq!(current.total_amount, original.total_amount);
        assert_eq!(current.version, original.version);
        for (product, expected) in stock {
            assert_eq!(stock_of(store, *product).await, *expected, "product {}", product);
        }
        assert!(service.get_order_history(original.id).await.unwrap().is_empty());
        assert_eq!(count_type(&events_for(store, original.id).await, "ORDER_UPDATED"), 0);
    }

    #[tokio::test]
    async fn test_update_with_insufficient_stock_changes_nothing() {
        let (service, store) = setup(&[(P1, 10), (P2, 3)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 4, 100)]).await.unwrap();

        let err = service
            .update_order(&ctx, order.id, &[line(P1, 1, 100), line(P2, 5, 100)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InsufficientStock { product_id: P2, requested: 5, available: 3 }
        ));
        assert_update_left_no_trace(&service, &store, &order, &[(P1, 6), (P2, 3)]).await;
    }

    #[tokio::test]
    async fn test_update_with_unknown_product_changes_nothing() {
        let (service, store) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 4, 100)]).await.unwrap();

        let err = service
            .update_order(&ctx, order.id, &[line(999, 1, 100)])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_update_left_no_trace(&service, &store, &order, &[(P1, 6)]).await;
    }

    #[tokio::test]
    async fn test_create_with_overflowing_amount_is_validation_error() {
        let (service, store) = setup(&[(P1, 10), (P2, 10)]);
        let ctx = RequestContext::system();
        let huge = Decimal::MAX;

        let err = service
            .create_order(&ctx, 7, &[NewOrderLine::new(P1, 2, huge)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let near_max = max_amount() - Decimal::ONE;
        let err = service
            .create_order(
                &ctx,
                7,
                &[NewOrderLine::new(P1, 1, near_max), NewOrderLine::new(P2, 1, near_max)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(stock_of(&store, P1).await, 10);
        assert_eq!(stock_of(&store, P2).await, 10);
        assert!(store.outbox_snapshot().await.is_empty());

        // The service keeps working after the rejected requests.
        service.create_order(&ctx, 7, &[line(P1, 1, 100)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_with_overflowing_amount_is_validation_error() {
        let (service, store) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 4, 100)]).await.unwrap();

        let err = service
            .update_order(&ctx, order.id, &[NewOrderLine::new(P1, 2, Decimal::MAX)])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_update_left_no_trace(&service, &store, &order, &[(P1, 6)]).await;
    }

    #[tokio::test]
    async fn test_sub_cent_prices_are_rejected() {
        let (service, store) = setup(&[(P1, 10)]);

        let err = service
            .create_order(
                &RequestContext::system(),
                7,
                &[NewOrderLine::new(P1, 1, Decimal::new(5, 3)), NewOrderLine::new(P1, 1, Decimal::new(5, 3))],
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(stock_of(&store, P1).await, 10);
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_rejected() {
        let (service, _) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 1, 100)]).await.unwrap();

        let err = service
            .update_order_status(&ctx, order.id, OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition { current: OrderStatus::Unprocessed, target: OrderStatus::Shipped }
        ));

        for status in [OrderStatus::Processing, OrderStatus::Processed, OrderStatus::Shipped] {
            service.update_order_status(&ctx, order.id, status).await.unwrap();
        }
        let err = service.cancel_order(&ctx, order.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition { current: OrderStatus::Shipped, target: OrderStatus::Cancelled }
        ));
    }

    #[tokio::test]
    async fn test_identity_status_change_is_a_no_op() {
        let (service, store) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 7, &[line(P1, 1, 100)]).await.unwrap();

        let same = service
            .update_order_status(&ctx, order.id, OrderStatus::Unprocessed)
            .await
            .unwrap();

        assert_eq!(same.version, order.version);
        assert!(service.get_order_history(order.id).await.unwrap().is_empty());
        assert_eq!(events_for(&store, order.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_stock_and_records_one_status_audit() {
        let (service, store) = setup(&[(P1, 100)]);
        let ctx = RequestContext::new(Uuid::new_v4(), "alice");

        let order = service.create_order(&ctx, 1, &[line(P1, 2, 1999)]).await.unwrap();
        assert_eq!(stock_of(&store, P1).await, 98);

        let cancelled = service
            .update_order_status(&ctx, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, P1).await, 100);

        let history = service.get_order_history(order.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field_name, "STATUS");
        assert_eq!(history[0].old_value.as_deref(), Some("UNPROCESSED"));
        assert_eq!(history[0].new_value.as_deref(), Some("CANCELLED"));
        assert_eq!(history[0].changed_by, "alice");

        let events = events_for(&store, order.id).await;
        assert_eq!(count_type(&events, "ORDER_STATUS_CHANGED"), 1);
        assert_eq!(count_type(&events, "ORDER_CANCELLED"), 1);

        let status_changed = events.iter().find(|e| e.event_type == "ORDER_STATUS_CHANGED").unwrap();
        let cancelled = events.iter().find(|e| e.event_type == "ORDER_CANCELLED").unwrap();
        assert_eq!(cancelled.causation_id, Some(status_changed.event_id));
        assert!(status_changed.causation_id.is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_processing_keeps_stock_consumed() {
        let (service, store) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();
        let order = service.create_order(&ctx, 1, &[line(P1, 4, 100)]).await.unwrap();
        service
            .update_order_status(&ctx, order.id, OrderStatus::Processing)
            .await
            .unwrap();

        service.cancel_order(&ctx, order.id, Some("customer request")).await.unwrap();
        assert_eq!(stock_of(&store, P1).await, 6);

        let events = events_for(&store, order.id).await;
        let reason = events.iter().find_map(|e| match &e.payload {
            OrderEvent::OrderCancelled(c) => Some(c.reason.clone()),
            _ => None,
        });
        assert_eq!(reason.as_deref(), Some("customer request"));
    }

    #[tokio::test]
    async fn test_sweep_advances_each_order_exactly_one_stage() {
        let (service, store) = setup(&[(P1, 100)]);
        let ctx = RequestContext::system();

        let fresh = service.create_order(&ctx, 1, &[line(P1, 1, 100)]).await.unwrap();
        let processing = service.create_order(&ctx, 2, &[line(P1, 1, 100)]).await.unwrap();
        let processed = service.create_order(&ctx, 3, &[line(P1, 1, 100)]).await.unwrap();
        service.update_order_status(&ctx, processing.id, OrderStatus::Processing).await.unwrap();
        service.update_order_status(&ctx, processed.id, OrderStatus::Processing).await.unwrap();
        service.update_order_status(&ctx, processed.id, OrderStatus::Processed).await.unwrap();

        let before: Vec<usize> = status_change_counts(&store, &[fresh.id, processing.id, processed.id]).await;

        let report = service.progress_order_statuses().await.unwrap();
        assert_eq!(report, SweepReport { advanced: 3, skipped: 0, failed: 0 });

        assert_eq!(service.get_order(fresh.id).await.unwrap().status, OrderStatus::Processing);
        assert_eq!(service.get_order(processing.id).await.unwrap().status, OrderStatus::Processed);
        assert_eq!(service.get_order(processed.id).await.unwrap().status, OrderStatus::Shipped);

        let after = status_change_counts(&store, &[fresh.id, processing.id, processed.id]).await;
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(a - b, 1);
        }
    }

    async fn status_change_counts(store: &InMemoryOrderStore, ids: &[Uuid]) -> Vec<usize> {
        let mut counts = Vec::new();
        for id in ids {
            counts.push(count_type(&events_for(store, *id).await, "ORDER_STATUS_CHANGED"));
        }
        counts
    }

    #[tokio::test]
    async fn test_sweep_ignores_terminal_and_deleted_orders() {
        let (service, _) = setup(&[(P1, 100)]);
        let ctx = RequestContext::system();

        let cancelled = service.create_order(&ctx, 1, &[line(P1, 1, 100)]).await.unwrap();
        service.cancel_order(&ctx, cancelled.id, None).await.unwrap();
        let deleted = service.create_order(&ctx, 1, &[line(P1, 1, 100)]).await.unwrap();
        service.delete_order(&ctx, deleted.id).await.unwrap();

        let report = service.progress_order_statuses().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_delete_releases_stock_only_when_unprocessed() {
        let (service, store) = setup(&[(P1, 10)]);
        let ctx = RequestContext::system();

        let unprocessed = service.create_order(&ctx, 1, &[line(P1, 2, 100)]).await.unwrap();
        let processed = service.create_order(&ctx, 1, &[line(P1, 3, 100)]).await.unwrap();
        service.update_order_status(&ctx, processed.id, OrderStatus::Processing).await.unwrap();
        service.update_order_status(&ctx, processed.id, OrderStatus::Processed).await.unwrap();
        assert_eq!(stock_of(&store, P1).await, 5);

        service.delete_order(&ctx, unprocessed.id).await.unwrap();
        assert_eq!(stock_of(&store, P1).await, 7);

        service.delete_order(&ctx, processed.id).await.unwrap();
        assert_eq!(stock_of(&store, P1).await, 7);

        for id in [unprocessed.id, processed.id] {
            let err = service.get_order(id).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);

            let history = service.get_order_history(id).await.unwrap();
            assert_eq!(history[0].field_name, "DELETED");
            assert_eq!(history[0].old_value.as_deref(), Some("false"));
            assert_eq!(history[0].new_value.as_deref(), Some("true"));
        }

        let err = service.delete_order(&ctx, unprocessed.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_history_of_unknown_order_is_not_found() {
        let (service, _) = setup(&[]);
        let err = service.get_order_history(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_orders_validates_page_size() {
        let (service, _) = setup(&[]);
        let query = OrderQuery { size: 0, ..OrderQuery::default() };
        let err = service.list_orders(&query).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_oversell() {
        let (service, store) = setup(&[(P1, 5), (P2, 5)]);
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = service.clone();
            // Alternate line order so callers request locks in different orders.
            let lines = if i % 2 == 0 {
                vec![line(P1, 1, 100), line(P2, 1, 100)]
            } else {
                vec![line(P2, 1, 100), line(P1, 1, 100)]
            };
            handles.push(tokio::spawn(async move {
                service.create_order(&RequestContext::system(), 1, &lines).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientStock),
            }
        }

        assert_eq!(created, 5);
        assert_eq!(stock_of(&store, P1).await, 0);
        assert_eq!(stock_of(&store, P2).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_status_changes_serialize() {
        let (service, _) = setup(&[(P1, 10)]);
        let service = Arc::new(service);
        let order = service
            .create_order(&RequestContext::system(), 1, &[line(P1, 1, 100)])
            .await
            .unwrap();

        let a = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .update_order_status(&RequestContext::system(), order.id, OrderStatus::Processing)
                    .await
            })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move {
                service.cancel_order(&RequestContext::system(), order.id, None).await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert!(results.iter().any(|r| r.is_ok()));

        let history = service.get_order_history(order.id).await.unwrap();
        let final_status = service.get_order(order.id).await.unwrap().status;
        assert_eq!(history[0].new_value.as_deref(), Some(final_status.as_str()));
    }
}
