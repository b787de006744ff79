use crate::{
    config::CheckoutConfig,
    entities::DeliveryType,
    errors::ServiceError,
    services::{coupons::CouponService, rewards::RewardService},
};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Immutable view of one cart line at pricing time. Orders snapshot these
/// fields so later product edits never rewrite history.
#[derive(Debug, Clone)]
pub struct LineSnapshot {
    pub product_id: Uuid,
    pub weight_option_id: Option<Uuid>,
    pub name: String,
    pub weight_label: Option<String>,
    pub category: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Everything the pricing pass decided for one checkout.
#[derive(Debug, Clone)]
pub struct PricingOutcome {
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub reward_discount: Decimal,
    pub delivery_charge: Decimal,
    pub total: Decimal,
    pub applied_coupon_code: Option<String>,
    pub applied_coupon_id: Option<Uuid>,
    pub redeemed_points: i64,
}

/// Computes order totals: subtotal, at most one coupon, optional reward
/// redemption, delivery charge, then `max(0, subtotal - discounts + delivery)`.
#[derive(Clone)]
pub struct PricingService {
    coupons: CouponService,
    rewards: RewardService,
    checkout_config: CheckoutConfig,
}

impl PricingService {
    pub fn new(
        coupons: CouponService,
        rewards: RewardService,
        checkout_config: CheckoutConfig,
    ) -> Self {
        Self {
            coupons,
            rewards,
            checkout_config,
        }
    }

    pub fn subtotal(lines: &[LineSnapshot]) -> Decimal {
        lines.iter().map(|l| l.line_total).sum()
    }

    pub fn delivery_charge(&self, delivery_type: DeliveryType) -> Decimal {
        match delivery_type {
            DeliveryType::Normal => self.checkout_config.delivery_charge_normal,
            DeliveryType::Expedited => self.checkout_config.delivery_charge_expedited,
        }
    }

    /// Prices a checkout inside the caller's transaction.
    ///
    /// An ineligible coupon prices as no coupon. A failed redemption prices
    /// as no redemption unless `strict_reward_redemption` is set, in which
    /// case the error propagates and aborts the checkout. When the coupon
    /// does apply, its usage counters are written here so the increment
    /// commits or rolls back with the order.
    #[instrument(skip(self, conn, lines), fields(customer_id = %customer_id))]
    pub async fn price_checkout(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        lines: &[LineSnapshot],
        coupon_code: Option<&str>,
        redeem_points: Option<i64>,
        delivery_type: DeliveryType,
        order_id: Uuid,
    ) -> Result<PricingOutcome, ServiceError> {
        let subtotal = Self::subtotal(lines);

        let mut coupon_discount = Decimal::ZERO;
        let mut applied_coupon_code = None;
        let mut applied_coupon_id = None;
        if let Some(code) = coupon_code {
            if let Some(applied) = self
                .coupons
                .resolve_for_checkout(conn, customer_id, code, lines, subtotal)
                .await?
            {
                coupon_discount = applied.discount;
                applied_coupon_code = Some(applied.coupon.code.clone());
                applied_coupon_id = Some(applied.coupon.id);
                self.coupons
                    .record_usage(conn, applied.coupon.id, customer_id)
                    .await?;
            }
        }

        let mut reward_discount = Decimal::ZERO;
        let mut redeemed_points = 0;
        if let Some(points) = redeem_points.filter(|p| *p > 0) {
            match self.redeem_points(conn, customer_id, points, order_id).await {
                Ok(discount) => {
                    reward_discount = discount;
                    redeemed_points = points;
                }
                Err(err @ (ServiceError::InsufficientBalance { .. }
                | ServiceError::BelowMinimumRedemption { .. }
                | ServiceError::InvalidOperation(_))) => {
                    if self.checkout_config.strict_reward_redemption {
                        return Err(err);
                    }
                    warn!(%customer_id, points, error = %err, "Skipping reward redemption");
                }
                Err(err) => return Err(err),
            }
        }

        let delivery_charge = self.delivery_charge(delivery_type);
        let total =
            (subtotal - coupon_discount - reward_discount + delivery_charge).max(Decimal::ZERO);

        Ok(PricingOutcome {
            subtotal,
            coupon_discount,
            reward_discount,
            delivery_charge,
            total,
            applied_coupon_code,
            applied_coupon_id,
            redeemed_points,
        })
    }

    async fn redeem_points(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        points: i64,
        order_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let config = self
            .rewards
            .active_config(conn)
            .await?
            .ok_or_else(|| ServiceError::InvalidOperation("Reward program is not active".into()))?;

        self.rewards
            .redeem(conn, customer_id, points, Some(order_id), &config)
            .await?;

        Ok(RewardService::redemption_discount(&config, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, quantity: i32) -> LineSnapshot {
        LineSnapshot {
            product_id: Uuid::new_v4(),
            weight_option_id: None,
            name: "Test product".to_string(),
            weight_label: None,
            category: None,
            unit_price: price,
            quantity,
            line_total: price * Decimal::from(quantity),
        }
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let lines = vec![line(dec!(100), 2), line(dec!(50), 1)];
        assert_eq!(PricingService::subtotal(&lines), dec!(250));
    }

    #[test]
    fn subtotal_of_empty_cart_is_zero() {
        assert_eq!(PricingService::subtotal(&[]), Decimal::ZERO);
    }

    #[test]
    fn total_never_goes_negative() {
        // 100 - 80 coupon - 60 rewards + 50 delivery would be 10, but with
        // a 200 coupon the clamp kicks in.
        let subtotal = dec!(100);
        let total = (subtotal - dec!(200) - dec!(0) + dec!(50)).max(Decimal::ZERO);
        assert_eq!(total, Decimal::ZERO);
    }
}
