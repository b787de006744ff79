use crate::{
    entities::{
        cart, cart_coupon, cart_item, Cart, CartCoupon, CartCouponModel, CartItem, CartItemModel,
        CartModel, Product, WeightOption,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::LineSnapshot,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A cart with its lines and any selected coupon, as the API returns it.
#[derive(Debug, Clone)]
pub struct CartView {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
    pub coupon: Option<CartCouponModel>,
}

/// One cart per customer. Checkout empties the cart rather than deleting
/// it, so the row survives across orders.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>, currency: String) -> Self {
        Self {
            db,
            event_sender,
            currency,
        }
    }

    pub async fn find_or_create(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let existing = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?;

        if let Some(cart) = existing {
            return Ok(cart);
        }

        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set(self.currency.clone()),
            subtotal: Set(Decimal::ZERO),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        Ok(cart.insert(conn).await?)
    }

    pub async fn get_view(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find_or_create(&*self.db, customer_id).await?;
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let coupon = CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?;
        Ok(CartView { cart, items, coupon })
    }

    /// Adds a product (or one of its weight options) to the cart, merging
    /// into an existing line for the same product/option pair. Unit price
    /// is snapshotted at add time.
    #[instrument(skip(self), fields(customer_id = %customer_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        weight_option_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".into(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;

        let (unit_price, weight_label) = match weight_option_id {
            Some(option_id) => {
                let option = WeightOption::find_by_id(option_id)
                    .one(&txn)
                    .await?
                    .filter(|o| o.product_id == product_id)
                    .ok_or_else(|| {
                        ServiceError::NotFound("Weight option not found for product".into())
                    })?;
                (option.price, Some(option.weight_label))
            }
            None => (product.price, None),
        };

        let cart = self.find_or_create(&txn, customer_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .filter(match weight_option_id {
                Some(id) => cart_item::Column::WeightOptionId.eq(id),
                None => cart_item::Column::WeightOptionId.is_null(),
            })
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let new_quantity = item.quantity + quantity;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(new_quantity);
                active.line_total = Set(unit_price * Decimal::from(new_quantity));
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    weight_option_id: Set(weight_option_id),
                    product_name: Set(product.name.clone()),
                    weight_label: Set(weight_label),
                    quantity: Set(quantity),
                    unit_price: Set(unit_price),
                    line_total: Set(unit_price * Decimal::from(quantity)),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;
            }
        }

        self.recalculate_subtotal(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;

        self.get_view(customer_id).await
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity cannot be negative".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = self.find_or_create(&txn, customer_id).await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .filter(|i| i.cart_id == cart.id)
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".into()))?;

        if quantity == 0 {
            item.delete(&txn).await?;
        } else {
            let unit_price = item.unit_price;
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.line_total = Set(unit_price * Decimal::from(quantity));
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        self.recalculate_subtotal(&txn, cart.id).await?;
        txn.commit().await?;

        self.get_view(customer_id).await
    }

    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.update_item_quantity(customer_id, item_id, 0).await
    }

    /// Records the customer's coupon choice on the cart. Selection only
    /// checks that the code exists and is active; full eligibility is
    /// re-evaluated at checkout.
    #[instrument(skip(self, coupons), fields(customer_id = %customer_id, code))]
    pub async fn select_coupon(
        &self,
        coupons: &crate::services::coupons::CouponService,
        customer_id: Uuid,
        code: &str,
    ) -> Result<CartView, ServiceError> {
        let coupon = coupons.find_selectable(code).await?;

        let txn = self.db.begin().await?;
        let cart = self.find_or_create(&txn, customer_id).await?;

        if let Some(existing) = CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
        {
            existing.delete(&txn).await?;
        }

        cart_coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            coupon_id: Set(coupon.id),
            code: Set(coupon.code.clone()),
            discount_type: Set(coupon.discount_type),
            discount_value: Set(coupon.discount_value),
            applied_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        self.get_view(customer_id).await
    }

    pub async fn remove_coupon(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find_or_create(&*self.db, customer_id).await?;
        if let Some(existing) = CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
        {
            existing.delete(&*self.db).await?;
        }
        self.get_view(customer_id).await
    }

    /// Empties the cart: deletes lines and the coupon record, zeroes the
    /// subtotal, keeps the cart row. Idempotent.
    #[instrument(skip(self, conn))]
    pub async fn clear_cart(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        CartCoupon::delete_many()
            .filter(cart_coupon::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;

        if let Some(cart) = Cart::find_by_id(cart_id).one(conn).await? {
            let mut active: cart::ActiveModel = cart.into();
            active.subtotal = Set(Decimal::ZERO);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
        }

        info!(%cart_id, "Cleared cart");
        Ok(())
    }

    /// Builds the pricing snapshot for the cart's lines, joining in each
    /// product's current category for coupon restriction checks. A carted
    /// product that has since been removed or deactivated fails the whole
    /// snapshot.
    pub async fn snapshot_lines(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<Vec<LineSnapshot>, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(conn)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    ServiceError::ProductUnavailable(format!(
                        "Product {} is no longer available",
                        item.product_name
                    ))
                })?;
            let category = product.category;
            lines.push(LineSnapshot {
                product_id: item.product_id,
                weight_option_id: item.weight_option_id,
                name: item.product_name,
                weight_label: item.weight_label,
                category,
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_total: item.line_total,
            });
        }
        Ok(lines)
    }

    async fn recalculate_subtotal(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;
        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();

        if let Some(cart) = Cart::find_by_id(cart_id).one(conn).await? {
            let mut active: cart::ActiveModel = cart.into();
            active.subtotal = Set(subtotal);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
        }
        Ok(())
    }
}
