use crate::{
    config::CheckoutConfig,
    entities::{order, order_item, DeliveryType, OrderModel, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        addresses::{AddressService, ShippingAddress},
        carts::CartService,
        customers::CustomerService,
        inventory::{InventoryService, StockReservation},
        orders::OrderService,
        pricing::{LineSnapshot, PricingOutcome, PricingService},
        rewards::RewardService,
    },
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, Set, SqlErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Checkout request body.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "customer id is required"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "payment method is required"))]
    pub payment_method: String,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    pub coupon_code: Option<String>,
    pub reward_points: Option<i64>,
    pub address_id: Option<Uuid>,
    pub address: Option<ShippingAddress>,
    #[serde(default)]
    pub skip_address: bool,
    pub idempotency_key: Option<String>,
}

/// What the caller gets back from a placed (or replayed) checkout.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub total: Decimal,
    pub estimated_delivery: DateTime<Utc>,
    pub rewards_earned: i64,
}

/// Orchestrates order placement.
///
/// Validation, customer and address resolution, and the idempotency check
/// run before any mutation. Pricing, stock reservation and order insertion
/// share one transaction; a failure anywhere in it rolls everything back.
/// Side effects after commit never fail the response.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    customers: CustomerService,
    carts: CartService,
    addresses: AddressService,
    inventory: InventoryService,
    pricing: PricingService,
    rewards: RewardService,
    orders: OrderService,
    event_sender: Arc<EventSender>,
    config: CheckoutConfig,
    currency: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        customers: CustomerService,
        carts: CartService,
        addresses: AddressService,
        inventory: InventoryService,
        pricing: PricingService,
        rewards: RewardService,
        orders: OrderService,
        event_sender: Arc<EventSender>,
        config: CheckoutConfig,
        currency: String,
    ) -> Self {
        Self {
            db,
            customers,
            carts,
            addresses,
            inventory,
            pricing,
            rewards,
            orders,
            event_sender,
            config,
            currency,
        }
    }

    #[instrument(skip(self, request), fields(customer = %request.customer_id))]
    pub async fn place_order(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let customer = self.customers.resolve(&*self.db, &request.customer_id).await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self
                .orders
                .find_by_idempotency_key(&*self.db, customer.id, key)
                .await?
            {
                info!(order_id = %existing.id, "Replaying checkout for idempotency key");
                return self.replay_response(existing).await;
            }
        }

        let cart = self.carts.find_or_create(&*self.db, customer.id).await?;
        let cart_view = self.carts.get_view(customer.id).await?;
        if cart_view.items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Explicit code on the request wins over the one saved on the cart.
        let coupon_code = request
            .coupon_code
            .clone()
            .or_else(|| cart_view.coupon.as_ref().map(|c| c.code.clone()));

        let shipping = self
            .addresses
            .resolve_shipping(
                &*self.db,
                customer.id,
                request.address.clone(),
                request.address_id,
                request.skip_address,
            )
            .await?;

        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let lines = self
            .carts
            .snapshot_lines(&txn, cart.id)
            .await
            .map_err(|e| self.map_reservation_error(e))?;

        let pricing = self
            .pricing
            .price_checkout(
                &txn,
                customer.id,
                &lines,
                coupon_code.as_deref(),
                request.reward_points,
                request.delivery_type,
                order_id,
            )
            .await?;

        let reservations: Vec<StockReservation> = lines
            .iter()
            .map(|l| StockReservation {
                product_id: l.product_id,
                weight_option_id: l.weight_option_id,
                quantity: l.quantity,
            })
            .collect();
        self.inventory
            .reserve(&txn, &reservations)
            .await
            .map_err(|e| self.map_reservation_error(e))?;

        let (order_model, item_models) = self.assemble_order(
            order_id,
            customer.id,
            &request,
            &lines,
            &pricing,
            shipping.as_ref(),
        )?;
        let order = match self.orders.persist(&txn, order_model, item_models).await {
            Ok(order) => order,
            // A concurrent submission with the same idempotency key can
            // slip past the pre-insert lookup; the unique index on
            // (customer_id, idempotency_key) turns the loser's insert into
            // a conflict, which replays the winner's order.
            Err(err) if Self::is_unique_violation(&err) => {
                txn.rollback().await?;
                if let Some(key) = request.idempotency_key.as_deref() {
                    if let Some(existing) = self
                        .orders
                        .find_by_idempotency_key(&*self.db, customer.id, key)
                        .await?
                    {
                        info!(order_id = %existing.id, "Lost idempotency race, replaying winner");
                        return self.replay_response(existing).await;
                    }
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        txn.commit().await?;

        let rewards_earned = self
            .run_post_commit(&order, &cart_view, &pricing, &reservations)
            .await;

        Ok(CheckoutResponse {
            order_id: order.id,
            order_number: order.order_number,
            total: order.total,
            estimated_delivery: order.estimated_delivery,
            rewards_earned,
        })
    }

    /// Pure assembly of the order row and its item snapshots. No I/O.
    fn assemble_order(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
        request: &CheckoutRequest,
        lines: &[LineSnapshot],
        pricing: &PricingOutcome,
        shipping: Option<&ShippingAddress>,
    ) -> Result<(order::ActiveModel, Vec<order_item::ActiveModel>), ServiceError> {
        let now = Utc::now();
        let delivery_days = match request.delivery_type {
            DeliveryType::Normal => self.config.estimated_delivery_days_normal,
            DeliveryType::Expedited => self.config.estimated_delivery_days_expedited,
        };

        let shipping_json = shipping
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ServiceError::InternalError(format!("address serialization: {e}")))?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(OrderService::generate_order_number()),
            customer_id: Set(customer_id),
            idempotency_key: Set(request.idempotency_key.clone()),
            order_status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(request.payment_method.clone()),
            delivery_type: Set(request.delivery_type),
            currency: Set(self.currency.clone()),
            subtotal: Set(pricing.subtotal),
            coupon_discount: Set(pricing.coupon_discount),
            reward_discount: Set(pricing.reward_discount),
            delivery_charge: Set(pricing.delivery_charge),
            total: Set(pricing.total),
            coupon_code: Set(pricing.applied_coupon_code.clone()),
            redeemed_points: Set(pricing.redeemed_points),
            shipping_address: Set(shipping_json),
            estimated_delivery: Set(now + Duration::days(delivery_days)),
            tracking_number: Set(None),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let items = lines
            .iter()
            .map(|l| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(l.product_id),
                weight_option_id: Set(l.weight_option_id),
                name: Set(l.name.clone()),
                weight_label: Set(l.weight_label.clone()),
                quantity: Set(l.quantity),
                unit_price: Set(l.unit_price),
                line_total: Set(l.line_total),
                created_at: Set(now),
            })
            .collect();

        Ok((order, items))
    }

    /// Best-effort steps after the order is durable. Each failure is
    /// logged and isolated; none can fail the checkout response. Returns
    /// the reward points actually credited, so the response never reports
    /// points a failed award left unbooked.
    async fn run_post_commit(
        &self,
        order: &OrderModel,
        cart_view: &crate::services::carts::CartView,
        pricing: &PricingOutcome,
        reservations: &[StockReservation],
    ) -> i64 {
        if let Err(e) = self
            .orders
            .append_log(
                &*self.db,
                order.id,
                OrderStatus::Pending,
                "system",
                Some("Order placed".to_string()),
            )
            .await
        {
            error!(order_id = %order.id, error = %e, "Failed to append placement log");
        }

        if let Err(e) = self.carts.clear_cart(&*self.db, cart_view.cart.id).await {
            error!(cart_id = %cart_view.cart.id, error = %e, "Failed to clear cart after checkout");
        } else {
            self.event_sender
                .send_or_log(Event::CartCleared(cart_view.cart.id))
                .await;
        }

        let rewards_earned = match self.award_order_rewards(order).await {
            Ok(points) => points,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to award order rewards");
                0
            }
        };

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: order.id,
                customer_id: order.customer_id,
            })
            .await;
        for r in reservations {
            self.event_sender
                .send_or_log(Event::StockReserved {
                    product_id: r.product_id,
                    weight_option_id: r.weight_option_id,
                    quantity: r.quantity,
                    order_id: order.id,
                })
                .await;
        }
        if let Some(coupon_id) = pricing.applied_coupon_id {
            self.event_sender
                .send_or_log(Event::CouponApplied {
                    coupon_id,
                    customer_id: order.customer_id,
                    order_id: order.id,
                })
                .await;
        }
        if pricing.redeemed_points > 0 {
            self.event_sender
                .send_or_log(Event::RewardsRedeemed {
                    customer_id: order.customer_id,
                    points: pricing.redeemed_points,
                })
                .await;
        }

        rewards_earned
    }

    async fn award_order_rewards(&self, order: &OrderModel) -> Result<i64, ServiceError> {
        let config = self.rewards.active_config(&*self.db).await?;
        let points = RewardService::calculate_rewards_for_order(config.as_ref(), order.total);
        if points <= 0 {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        self.rewards
            .award(
                &txn,
                order.customer_id,
                order.id,
                points,
                &format!("Earned on order {}", order.order_number),
            )
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::RewardsAwarded {
                customer_id: order.customer_id,
                order_id: order.id,
                points,
            })
            .await;
        Ok(points)
    }

    async fn rewards_earned_for(&self, total: Decimal) -> i64 {
        match self.rewards.active_config(&*self.db).await {
            Ok(config) => RewardService::calculate_rewards_for_order(config.as_ref(), total),
            Err(e) => {
                warn!(error = %e, "Could not read reward config for response");
                0
            }
        }
    }

    async fn replay_response(&self, order: OrderModel) -> Result<CheckoutResponse, ServiceError> {
        let rewards_earned = self.rewards_earned_for(order.total).await;
        Ok(CheckoutResponse {
            order_id: order.id,
            order_number: order.order_number,
            total: order.total,
            estimated_delivery: order.estimated_delivery,
            rewards_earned,
        })
    }

    fn is_unique_violation(err: &ServiceError) -> bool {
        matches!(
            err,
            ServiceError::DatabaseError(db_err)
                if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        )
    }

    fn map_reservation_error(&self, err: ServiceError) -> ServiceError {
        match err {
            ServiceError::ProductUnavailable(msg)
                if !self.config.product_unavailable_is_client_error =>
            {
                ServiceError::InternalError(msg)
            }
            other => other,
        }
    }
}
