use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward program configuration.
///
/// A single active row drives accrual and redemption; no active row means
/// the reward program is off and orders earn nothing.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reward_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Flat points granted per qualifying order.
    pub points_per_order: i64,
    /// Points granted per rupee of order total (floored).
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub points_per_rupee: Decimal,
    /// Orders below this total earn nothing.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub min_order_for_reward: Decimal,
    /// Points needed for one rupee of redemption discount.
    pub redemption_rate: i64,
    pub min_redemption_points: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
