use crate::{
    entities::{
        reward_account, reward_config, reward_transaction, RewardAccount, RewardAccountModel,
        RewardConfig, RewardConfigModel, RewardTransaction, RewardTransactionModel,
        RewardTransactionType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Reward point ledger.
///
/// Every balance change writes exactly one `reward_transactions` row with
/// the signed amount and resulting balance, keeping
/// `balance == lifetime_earned - lifetime_redeemed` for earned/redeemed
/// activity.
#[derive(Clone)]
pub struct RewardService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl RewardService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// The single active reward configuration, if the program is on.
    pub async fn active_config(
        &self,
        conn: &impl ConnectionTrait,
    ) -> Result<Option<RewardConfigModel>, ServiceError> {
        Ok(RewardConfig::find()
            .filter(reward_config::Column::IsActive.eq(true))
            .one(conn)
            .await?)
    }

    /// Fetches the customer's account, creating an empty one on first use.
    pub async fn find_or_create_account(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> Result<RewardAccountModel, ServiceError> {
        let existing = RewardAccount::find()
            .filter(reward_account::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?;

        if let Some(account) = existing {
            return Ok(account);
        }

        let account = reward_account::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            balance: Set(0),
            lifetime_earned: Set(0),
            lifetime_redeemed: Set(0),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        Ok(account.insert(conn).await?)
    }

    /// Debits `points` from the customer's balance.
    ///
    /// Fails with `InsufficientBalance` or `BelowMinimumRedemption`; the
    /// caller decides whether those are fatal (strict mode) or mean "no
    /// discount" (default). Runs on the checkout transaction.
    #[instrument(skip(self, conn, config))]
    pub async fn redeem(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        points: i64,
        order_id: Option<Uuid>,
        config: &RewardConfigModel,
    ) -> Result<RewardAccountModel, ServiceError> {
        if points < config.min_redemption_points {
            return Err(ServiceError::BelowMinimumRedemption {
                requested: points,
                minimum: config.min_redemption_points,
            });
        }

        let account = self.find_or_create_account(conn, customer_id).await?;
        if !account.is_active || points > account.balance {
            return Err(ServiceError::InsufficientBalance {
                requested: points,
                available: if account.is_active { account.balance } else { 0 },
            });
        }

        let balance_after = account.balance - points;
        let lifetime_redeemed = account.lifetime_redeemed + points;
        let account_id = account.id;

        let mut active: reward_account::ActiveModel = account.into();
        active.balance = Set(balance_after);
        active.lifetime_redeemed = Set(lifetime_redeemed);
        active.updated_at = Set(Utc::now());
        let updated = active.update(conn).await?;

        self.append_transaction(
            conn,
            account_id,
            customer_id,
            order_id,
            RewardTransactionType::Redeemed,
            -points,
            balance_after,
            Some(format!("Redeemed {} points at checkout", points)),
        )
        .await?;

        Ok(updated)
    }

    /// Credits `points` unconditionally, appending an `earned` transaction.
    #[instrument(skip(self, conn))]
    pub async fn award(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        order_id: Uuid,
        points: i64,
        description: &str,
    ) -> Result<RewardAccountModel, ServiceError> {
        let account = self.find_or_create_account(conn, customer_id).await?;

        let balance_after = account.balance + points;
        let lifetime_earned = account.lifetime_earned + points;
        let account_id = account.id;

        let mut active: reward_account::ActiveModel = account.into();
        active.balance = Set(balance_after);
        active.lifetime_earned = Set(lifetime_earned);
        active.updated_at = Set(Utc::now());
        let updated = active.update(conn).await?;

        self.append_transaction(
            conn,
            account_id,
            customer_id,
            Some(order_id),
            RewardTransactionType::Earned,
            points,
            balance_after,
            Some(description.to_string()),
        )
        .await?;

        Ok(updated)
    }

    /// Points earned by an order of `order_total`, per the active config.
    /// Zero when the program is off or the order is below the threshold.
    pub fn calculate_rewards_for_order(
        config: Option<&RewardConfigModel>,
        order_total: Decimal,
    ) -> i64 {
        let Some(config) = config else {
            return 0;
        };
        if !config.is_active || order_total < config.min_order_for_reward {
            return 0;
        }

        let from_total = (order_total * config.points_per_rupee)
            .floor()
            .to_i64()
            .unwrap_or(0);
        config.points_per_order + from_total
    }

    /// Rupee discount produced by redeeming `points` at the config's rate.
    pub fn redemption_discount(config: &RewardConfigModel, points: i64) -> Decimal {
        if config.redemption_rate <= 0 {
            return Decimal::ZERO;
        }
        Decimal::from(points / config.redemption_rate)
    }

    /// Admin adjustment: signed delta, balance clamped at zero, routed to
    /// the matching lifetime counter, recorded as an `adjusted` transaction.
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        customer_id: Uuid,
        amount: i64,
        reason: &str,
    ) -> Result<RewardAccountModel, ServiceError> {
        let txn = self.db.begin().await?;

        let account = self.find_or_create_account(&txn, customer_id).await?;

        let balance_after = (account.balance + amount).max(0);
        let applied = balance_after - account.balance;
        let account_id = account.id;

        let mut active: reward_account::ActiveModel = account.clone().into();
        active.balance = Set(balance_after);
        if amount > 0 {
            active.lifetime_earned = Set(account.lifetime_earned + amount);
        } else {
            active.lifetime_redeemed = Set(account.lifetime_redeemed - amount);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        self.append_transaction(
            &txn,
            account_id,
            customer_id,
            None,
            RewardTransactionType::Adjusted,
            applied,
            balance_after,
            Some(reason.to_string()),
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::RewardsAdjusted {
                customer_id,
                amount: applied,
            })
            .await;

        info!(%customer_id, amount, "Adjusted reward balance");
        Ok(updated)
    }

    /// Account lookup for the rewards API; absent account reads as empty.
    pub async fn get_account(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<RewardAccountModel>, ServiceError> {
        Ok(RewardAccount::find()
            .filter(reward_account::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?)
    }

    /// Transaction history, newest first.
    pub async fn list_transactions(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<RewardTransactionModel>, u64), ServiceError> {
        let paginator = RewardTransaction::find()
            .filter(reward_transaction::Column::CustomerId.eq(customer_id))
            .order_by_desc(reward_transaction::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_transaction(
        &self,
        conn: &impl ConnectionTrait,
        account_id: Uuid,
        customer_id: Uuid,
        order_id: Option<Uuid>,
        transaction_type: RewardTransactionType,
        amount: i64,
        balance_after: i64,
        description: Option<String>,
    ) -> Result<(), ServiceError> {
        reward_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            customer_id: Set(customer_id),
            order_id: Set(order_id),
            transaction_type: Set(transaction_type),
            amount: Set(amount),
            balance_after: Set(balance_after),
            description: Set(description),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(active: bool) -> RewardConfigModel {
        RewardConfigModel {
            id: Uuid::new_v4(),
            points_per_order: 10,
            points_per_rupee: dec!(1),
            min_order_for_reward: dec!(100),
            redemption_rate: 10,
            min_redemption_points: 100,
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn order_rewards_add_flat_and_per_rupee_points() {
        // 10 + floor(250 * 1) = 260
        let c = config(true);
        assert_eq!(
            RewardService::calculate_rewards_for_order(Some(&c), dec!(250)),
            260
        );
    }

    #[test]
    fn order_below_threshold_earns_nothing() {
        let c = config(true);
        assert_eq!(
            RewardService::calculate_rewards_for_order(Some(&c), dec!(99)),
            0
        );
    }

    #[test]
    fn missing_or_inactive_config_earns_nothing() {
        assert_eq!(RewardService::calculate_rewards_for_order(None, dec!(500)), 0);
        let c = config(false);
        assert_eq!(
            RewardService::calculate_rewards_for_order(Some(&c), dec!(500)),
            0
        );
    }

    #[test]
    fn fractional_per_rupee_points_are_floored() {
        let mut c = config(true);
        c.points_per_rupee = dec!(0.5);
        // 10 + floor(250 * 0.5) = 10 + 125
        assert_eq!(
            RewardService::calculate_rewards_for_order(Some(&c), dec!(250)),
            135
        );
        // 10 + floor(101 * 0.5) = 10 + 50
        assert_eq!(
            RewardService::calculate_rewards_for_order(Some(&c), dec!(101)),
            60
        );
    }

    #[test]
    fn redemption_discount_floors_partial_rupees() {
        let c = config(true);
        // 500 points at 10 points/rupee -> 50 rupees
        assert_eq!(RewardService::redemption_discount(&c, 500), dec!(50));
        // 509 points -> still 50 rupees
        assert_eq!(RewardService::redemption_discount(&c, 509), dec!(50));
    }

    #[test]
    fn zero_redemption_rate_yields_no_discount() {
        let mut c = config(true);
        c.redemption_rate = 0;
        assert_eq!(RewardService::redemption_discount(&c, 500), Decimal::ZERO);
    }
}
