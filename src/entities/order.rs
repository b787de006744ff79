use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order entity
///
/// Line items, prices and discounts are immutable snapshots taken at
/// checkout; only status-progression fields change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    /// Unique together with `customer_id` (see `order::idempotency_index`);
    /// a duplicate submission surfaces as an insert conflict.
    #[sea_orm(nullable)]
    pub idempotency_key: Option<String>,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub delivery_type: DeliveryType,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub coupon_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub reward_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub delivery_charge: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    pub redeemed_points: i64,
    #[sea_orm(column_type = "Json", nullable)]
    pub shipping_address: Option<Json>,
    pub estimated_delivery: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,
    #[sea_orm(nullable)]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_log::Entity")]
    OrderLogs,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLogs.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Unique index backing idempotent checkout replays. Rows without a key
/// never collide; each keyed submission is unique per customer.
pub fn idempotency_index() -> sea_orm::sea_query::IndexCreateStatement {
    sea_orm::sea_query::Index::create()
        .name("idx_orders_customer_idempotency")
        .table(Entity)
        .col(Column::CustomerId)
        .col(Column::IdempotencyKey)
        .unique()
        .to_owned()
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "dispatched")]
    Dispatched,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Whether this status may legally transition to `next`.
    ///
    /// The forward chain is pending → confirmed → packed → dispatched →
    /// delivered; cancellation is allowed from any state that has not yet
    /// been dispatched.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed)
            | (Confirmed, Packed)
            | (Packed, Dispatched)
            | (Dispatched, Delivered) => true,
            (Pending | Confirmed | Packed, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Packed => "packed",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "expedited")]
    Expedited,
}

impl Default for DeliveryType {
    fn default() -> Self {
        DeliveryType::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn forward_chain_is_allowed() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Packed));
        assert!(Packed.can_transition_to(Dispatched));
        assert!(Dispatched.can_transition_to(Delivered));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!Pending.can_transition_to(Packed));
        assert!(!Confirmed.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Delivered));
    }

    #[test]
    fn cancellation_blocked_once_dispatched() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Packed.can_transition_to(Cancelled));
        assert!(!Dispatched.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn no_transitions_out_of_terminal_states() {
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
    }

    #[test]
    fn delivery_type_appears_in_request_schemas() {
        assert_eq!(
            <super::DeliveryType as utoipa::ToSchema>::name(),
            "DeliveryType"
        );
    }
}
