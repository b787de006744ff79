use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Schema, Set,
};
use storefront_api::{
    config::AppConfig,
    db::{establish_connection_with_config, DbConfig},
    entities,
    events::{self, EventSender},
    AppState,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness backed by an in-memory SQLite database with the full
/// schema created from the entity definitions.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_config = DbConfig {
            url: "sqlite::memory:".to_string(),
            // A single connection keeps every query on the same in-memory
            // database instance.
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let db = establish_connection_with_config(&db_config)
            .await
            .expect("failed to open in-memory sqlite");

        create_schema(&db).await;

        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(db), Arc::new(cfg), event_sender);

        Self {
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub async fn seed_customer(&self, name: &str) -> entities::CustomerModel {
        entities::customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_ref: Set(Some(format!("ext-{}", Uuid::new_v4().simple()))),
            name: Set(name.to_string()),
            email: Set(Some(format!("{}@example.com", name.to_lowercase()))),
            phone: Set(Some("9876543210".to_string())),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed customer")
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        stock: i32,
        category: Option<&str>,
    ) -> entities::ProductModel {
        entities::product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            sku: Set(format!("SKU-{}", Uuid::new_v4().simple())),
            price: Set(price),
            stock_quantity: Set(stock),
            category: Set(category.map(str::to_string)),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_weight_option(
        &self,
        product_id: Uuid,
        label: &str,
        price: Decimal,
        quantity: i32,
    ) -> entities::WeightOptionModel {
        entities::weight_option::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            weight_label: Set(label.to_string()),
            price: Set(price),
            quantity: Set(quantity),
            position: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed weight option")
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: entities::DiscountType,
        discount_value: Decimal,
        min_order_value: Decimal,
        max_discount: Option<Decimal>,
        usage_limit: Option<i32>,
        usage_limit_per_user: i32,
    ) -> entities::CouponModel {
        entities::coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            min_order_value: Set(min_order_value),
            max_discount: Set(max_discount),
            usage_limit: Set(usage_limit),
            usage_limit_per_user: Set(usage_limit_per_user),
            used_count: Set(0),
            applicable_products: Set(None),
            applicable_categories: Set(None),
            expires_at: Set(None),
            is_active: Set(true),
            is_deleted: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed coupon")
    }

    pub async fn seed_reward_config(
        &self,
        points_per_order: i64,
        points_per_rupee: Decimal,
        min_order_for_reward: Decimal,
        redemption_rate: i64,
        min_redemption_points: i64,
    ) -> entities::RewardConfigModel {
        entities::reward_config::ActiveModel {
            id: Set(Uuid::new_v4()),
            points_per_order: Set(points_per_order),
            points_per_rupee: Set(points_per_rupee),
            min_order_for_reward: Set(min_order_for_reward),
            redemption_rate: Set(redemption_rate),
            min_redemption_points: Set(min_redemption_points),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed reward config")
    }

    /// Gives a customer a starting reward balance through the ledger, so
    /// the balance invariant holds for seeded data too.
    pub async fn seed_reward_balance(&self, customer_id: Uuid, points: i64) {
        self.state
            .services
            .rewards
            .award(
                self.db(),
                customer_id,
                Uuid::new_v4(),
                points,
                "Seed balance",
            )
            .await
            .expect("seed reward balance");
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        entities::Product::find_by_id(product_id)
            .one(self.db())
            .await
            .expect("query product")
            .expect("product exists")
            .stock_quantity
    }
}

async fn create_schema(db: &DatabaseConnection) {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = vec![
        schema.create_table_from_entity(entities::Customer),
        schema.create_table_from_entity(entities::CustomerAddress),
        schema.create_table_from_entity(entities::Product),
        schema.create_table_from_entity(entities::WeightOption),
        schema.create_table_from_entity(entities::Cart),
        schema.create_table_from_entity(entities::CartItem),
        schema.create_table_from_entity(entities::CartCoupon),
        schema.create_table_from_entity(entities::Coupon),
        schema.create_table_from_entity(entities::CouponUsage),
        schema.create_table_from_entity(entities::Order),
        schema.create_table_from_entity(entities::OrderItem),
        schema.create_table_from_entity(entities::OrderLog),
        schema.create_table_from_entity(entities::RewardAccount),
        schema.create_table_from_entity(entities::RewardTransaction),
        schema.create_table_from_entity(entities::RewardConfig),
    ];

    for statement in statements {
        db.execute(backend.build(&statement))
            .await
            .expect("create table");
    }

    db.execute(backend.build(&entities::order::idempotency_index()))
        .await
        .expect("create idempotency index");
}
