use crate::{
    entities::{coupon, coupon_usage, Coupon, CouponModel, CouponUsage, DiscountType},
    errors::ServiceError,
    services::pricing::LineSnapshot,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// A coupon that passed every eligibility gate for the current checkout.
#[derive(Debug, Clone)]
pub struct AppliedCoupon {
    pub coupon: CouponModel,
    pub discount: Decimal,
}

/// Coupon validation and usage accounting.
///
/// At most one coupon applies per checkout. Ineligibility is not an error:
/// the coupon is skipped with a logged reason and pricing proceeds with a
/// zero discount.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up a coupon by code and checks every eligibility gate against
    /// the cart. Returns `Ok(None)` when the coupon should be silently
    /// skipped.
    #[instrument(skip(self, conn, lines))]
    pub async fn resolve_for_checkout(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        code: &str,
        lines: &[LineSnapshot],
        subtotal: Decimal,
    ) -> Result<Option<AppliedCoupon>, ServiceError> {
        let code = code.trim().to_uppercase();

        let Some(coupon) = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(conn)
            .await?
        else {
            debug!(code, "Coupon code not found, skipping");
            return Ok(None);
        };

        if coupon.is_deleted || !coupon.is_active {
            debug!(code, "Coupon inactive or deleted, skipping");
            return Ok(None);
        }

        if let Some(expires_at) = coupon.expires_at {
            if expires_at < Utc::now() {
                debug!(code, "Coupon expired, skipping");
                return Ok(None);
            }
        }

        if subtotal < coupon.min_order_value {
            debug!(code, %subtotal, min = %coupon.min_order_value, "Subtotal below coupon minimum, skipping");
            return Ok(None);
        }

        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                debug!(code, "Coupon global usage limit reached, skipping");
                return Ok(None);
            }
        }

        let user_usage = CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?;
        if let Some(ref usage) = user_usage {
            if usage.used_count >= coupon.usage_limit_per_user {
                debug!(code, %customer_id, "Per-user usage limit reached, skipping");
                return Ok(None);
            }
        }

        if !Self::restrictions_match(&coupon, lines) {
            debug!(code, "No cart line matches coupon restrictions, skipping");
            return Ok(None);
        }

        let discount = Self::calculate_discount(&coupon, subtotal);
        Ok(Some(AppliedCoupon { coupon, discount }))
    }

    /// Whether the cart satisfies the coupon's product/category restriction.
    /// A coupon with no restriction lists applies to any cart.
    fn restrictions_match(coupon: &CouponModel, lines: &[LineSnapshot]) -> bool {
        let products: Vec<Uuid> = coupon
            .applicable_products
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let categories: Vec<String> = coupon
            .applicable_categories
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        if products.is_empty() && categories.is_empty() {
            return true;
        }

        lines.iter().any(|line| {
            products.contains(&line.product_id)
                || line
                    .category
                    .as_ref()
                    .map(|c| categories.contains(c))
                    .unwrap_or(false)
        })
    }

    /// Discount for a subtotal: percentage capped at `max_discount`, fixed
    /// capped at the subtotal. Never negative, never more than the subtotal.
    pub fn calculate_discount(coupon: &CouponModel, subtotal: Decimal) -> Decimal {
        let discount = match coupon.discount_type {
            DiscountType::Percentage => {
                let raw = subtotal * coupon.discount_value / Decimal::from(100);
                match coupon.max_discount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            DiscountType::Fixed => coupon.discount_value.min(subtotal),
        };

        discount.max(Decimal::ZERO).min(subtotal)
    }

    /// Records one successful application: bumps the global counter and the
    /// per-customer row. Runs on the checkout transaction so the increments
    /// roll back together with the order.
    #[instrument(skip(self, conn))]
    pub async fn record_usage(
        &self,
        conn: &impl ConnectionTrait,
        coupon_id: Uuid,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let coupon = Coupon::find_by_id(coupon_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        let used_count = coupon.used_count;
        let mut active: coupon::ActiveModel = coupon.into();
        active.used_count = Set(used_count + 1);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        let usage = CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?;

        match usage {
            Some(row) => {
                let used = row.used_count;
                let mut active: coupon_usage::ActiveModel = row.into();
                active.used_count = Set(used + 1);
                active.updated_at = Set(Utc::now());
                active.update(conn).await?;
            }
            None => {
                coupon_usage::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    coupon_id: Set(coupon_id),
                    customer_id: Set(customer_id),
                    used_count: Set(1),
                    updated_at: Set(Utc::now()),
                }
                .insert(conn)
                .await?;
            }
        }

        Ok(())
    }

    /// Fetch a coupon by code for cart selection. Unlike checkout
    /// resolution, an unknown or inactive code is an error here so the
    /// client can tell the user.
    pub async fn find_selectable(&self, code: &str) -> Result<CouponModel, ServiceError> {
        let code = code.trim().to_uppercase();
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .filter(coupon::Column::IsDeleted.eq(false))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

        if !coupon.is_active {
            return Err(ServiceError::CouponNotApplicable(format!(
                "Coupon {} is not active",
                code
            )));
        }

        Ok(coupon)
    }
}
