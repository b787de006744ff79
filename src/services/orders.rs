use crate::{
    entities::{
        order, order_item, order_log, Order, OrderItem, OrderItemModel, OrderLog, OrderLogModel,
        OrderModel, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, StockReservation},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// An order with its line items, as handed back to the API layer.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Order persistence and lifecycle transitions. Creation happens on the
/// checkout transaction; every status change appends an order log row.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
        }
    }

    /// Human-facing order number, unique per order.
    pub fn generate_order_number() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("ORD-{}", &suffix[..12].to_uppercase())
    }

    /// Replay lookup for a retried checkout request.
    pub async fn find_by_idempotency_key(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .filter(order::Column::IdempotencyKey.eq(idempotency_key))
            .one(conn)
            .await?)
    }

    /// Inserts the assembled order and its item snapshots on the caller's
    /// transaction. No log row here; the placement log is post-commit.
    pub async fn persist(
        &self,
        conn: &impl ConnectionTrait,
        order: order::ActiveModel,
        items: Vec<order_item::ActiveModel>,
    ) -> Result<OrderModel, ServiceError> {
        let model = order.insert(conn).await?;
        for item in items {
            item.insert(conn).await?;
        }
        Ok(model)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(OrderView { order, items })
    }

    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    pub async fn logs(&self, order_id: Uuid) -> Result<Vec<OrderLogModel>, ServiceError> {
        Ok(OrderLog::find()
            .filter(order_log::Column::OrderId.eq(order_id))
            .order_by_asc(order_log::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Moves an order along its lifecycle, rejecting illegal jumps, and
    /// appends the transition to the order log.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

        let old_status = order.order_status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move order from {} to {}",
                old_status.as_str(),
                new_status.as_str()
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.order_status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.append_log(&txn, order_id, new_status, actor, note).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        info!(%order_id, from = old_status.as_str(), to = new_status.as_str(), "Order status updated");
        Ok(updated)
    }

    /// Cancels an order that has not been dispatched, returning its
    /// reserved stock to inventory in the same transaction.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        actor: &str,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

        let old_status = order.order_status;
        if !old_status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot cancel an order that is {}",
                old_status.as_str()
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        let releases: Vec<StockReservation> = items
            .iter()
            .map(|i| StockReservation {
                product_id: i.product_id,
                weight_option_id: i.weight_option_id,
                quantity: i.quantity,
            })
            .collect();
        self.inventory.release(&txn, &releases).await?;

        let mut active: order::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Cancelled);
        active.cancel_reason = Set(reason.clone());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.append_log(&txn, order_id, OrderStatus::Cancelled, actor, reason)
            .await?;
        txn.commit().await?;

        for release in &releases {
            self.event_sender
                .send_or_log(Event::StockReleased {
                    product_id: release.product_id,
                    weight_option_id: release.weight_option_id,
                    quantity: release.quantity,
                    order_id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                reason: updated.cancel_reason.clone(),
            })
            .await;

        info!(%order_id, "Order cancelled");
        Ok(updated)
    }

    /// Appends one append-only audit row. Rows are never updated or
    /// deleted.
    pub async fn append_log(
        &self,
        conn: &impl ConnectionTrait,
        order_id: Uuid,
        status: OrderStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<(), ServiceError> {
        order_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(status),
            actor: Set(actor.to_string()),
            note: Set(note),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }
}
