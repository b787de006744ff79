//! End-to-end checkout tests against an in-memory database: pricing,
//! stock reservation atomicity, coupons, reward redemption and the
//! post-commit cart/reward side effects.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, SqlErr,
};
use storefront_api::{
    entities::{
        self, cart_coupon, order_log, reward_transaction, DeliveryType, DiscountType, OrderStatus,
        RewardTransactionType,
    },
    errors::ServiceError,
    services::checkout::CheckoutRequest,
};

fn request(customer_id: &str) -> CheckoutRequest {
    CheckoutRequest {
        customer_id: customer_id.to_string(),
        payment_method: "cod".to_string(),
        delivery_type: DeliveryType::Normal,
        coupon_code: None,
        reward_points: None,
        address_id: None,
        address: None,
        skip_address: true,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn basic_checkout_prices_and_reserves_stock() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Asha").await;
    let product = app.seed_product("Almonds", dec!(100), 10, None).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 2)
        .await
        .unwrap();

    let response = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap();

    // subtotal 200 + normal delivery 50
    assert_eq!(response.total, dec!(250));
    assert_eq!(app.stock_of(product.id).await, 8);

    let order = entities::Order::find_by_id(response.order_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.order_status, OrderStatus::Pending);
    assert_eq!(order.subtotal, dec!(200));
    assert_eq!(order.delivery_charge, dec!(50));
    assert_eq!(order.total, dec!(250));

    let items = entities::OrderItem::find()
        .filter(entities::order_item::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].unit_price, dec!(100));
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Ravi").await;

    let err = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);
}

#[tokio::test]
async fn insufficient_stock_aborts_without_mutation() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Meera").await;
    let product = app.seed_product("Cashews", dec!(100), 3, None).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 5)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 5,
            available: 3,
            ..
        }
    );
    assert_eq!(app.stock_of(product.id).await, 3);
    let orders = entities::Order::find().all(app.db()).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn one_short_line_rolls_back_the_whole_reservation() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Vikram").await;
    let plenty = app.seed_product("Raisins", dec!(50), 100, None).await;
    let scarce = app.seed_product("Pistachios", dec!(200), 1, None).await;

    let carts = &app.state.services.carts;
    carts.add_item(customer.id, plenty.id, None, 2).await.unwrap();
    carts.add_item(customer.id, scarce.id, None, 2).await.unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock { .. });
    assert_eq!(app.stock_of(plenty.id).await, 100);
    assert_eq!(app.stock_of(scarce.id).await, 1);
    assert!(entities::Order::find().all(app.db()).await.unwrap().is_empty());
}

#[tokio::test]
async fn percentage_coupon_discount_is_capped() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Divya").await;
    let product = app.seed_product("Dates", dec!(100), 50, None).await;
    app.seed_coupon(
        "SAVE10",
        DiscountType::Percentage,
        dec!(10),
        dec!(0),
        Some(dec!(50)),
        None,
        1,
    )
    .await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 10)
        .await
        .unwrap();

    let mut req = request(&customer.id.to_string());
    req.coupon_code = Some("SAVE10".to_string());
    let response = app.state.services.checkout.place_order(req).await.unwrap();

    // 10% of 1000 is 100, capped at 50. Total 1000 - 50 + 50 delivery.
    assert_eq!(response.total, dec!(1000));
    let order = entities::Order::find_by_id(response.order_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.coupon_discount, dec!(50));
    assert_eq!(order.coupon_code.as_deref(), Some("SAVE10"));
}

#[tokio::test]
async fn ineligible_coupon_is_silently_skipped() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran").await;
    let product = app.seed_product("Walnuts", dec!(100), 10, None).await;
    app.seed_coupon(
        "BIGSPEND",
        DiscountType::Fixed,
        dec!(100),
        dec!(5000),
        None,
        None,
        1,
    )
    .await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 1)
        .await
        .unwrap();

    let mut req = request(&customer.id.to_string());
    req.coupon_code = Some("BIGSPEND".to_string());
    let response = app.state.services.checkout.place_order(req).await.unwrap();

    let order = entities::Order::find_by_id(response.order_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.coupon_discount, dec!(0));
    assert_eq!(order.coupon_code, None);
    assert_eq!(order.total, dec!(150));
}

#[tokio::test]
async fn reward_redemption_debits_the_ledger() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Sana").await;
    let product = app.seed_product("Figs", dec!(100), 10, None).await;
    app.seed_reward_config(0, dec!(0), dec!(100_000), 10, 100).await;
    app.seed_reward_balance(customer.id, 800).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 2)
        .await
        .unwrap();

    let mut req = request(&customer.id.to_string());
    req.reward_points = Some(500);
    let response = app.state.services.checkout.place_order(req).await.unwrap();

    // 500 points at 10 points per rupee: 50 off. 200 - 50 + 50 delivery.
    assert_eq!(response.total, dec!(200));

    let account = app
        .state
        .services
        .rewards
        .get_account(customer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, 300);
    assert_eq!(account.balance, account.lifetime_earned - account.lifetime_redeemed);

    let redeemed = entities::RewardTransaction::find()
        .filter(reward_transaction::Column::CustomerId.eq(customer.id))
        .filter(reward_transaction::Column::TransactionType.eq(RewardTransactionType::Redeemed))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(redeemed.len(), 1);
    assert_eq!(redeemed[0].amount, -500);
    assert_eq!(redeemed[0].balance_after, 300);
}

#[tokio::test]
async fn unafforded_redemption_is_skipped_by_default() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Rohan").await;
    let product = app.seed_product("Prunes", dec!(100), 10, None).await;
    app.seed_reward_config(0, dec!(0), dec!(100_000), 10, 100).await;
    app.seed_reward_balance(customer.id, 50).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 1)
        .await
        .unwrap();

    let mut req = request(&customer.id.to_string());
    req.reward_points = Some(500);
    let response = app.state.services.checkout.place_order(req).await.unwrap();

    // Redemption skipped, no discount, balance untouched.
    assert_eq!(response.total, dec!(150));
    let account = app
        .state
        .services
        .rewards
        .get_account(customer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, 50);
}

#[tokio::test]
async fn expedited_delivery_charges_more_and_arrives_sooner() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Nisha").await;
    let product = app.seed_product("Apricots", dec!(100), 10, None).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 1)
        .await
        .unwrap();

    let mut req = request(&customer.id.to_string());
    req.delivery_type = DeliveryType::Expedited;
    let response = app.state.services.checkout.place_order(req).await.unwrap();

    assert_eq!(response.total, dec!(200));
    let eta = response.estimated_delivery - Utc::now();
    assert!(eta > Duration::days(1) && eta <= Duration::days(2));
}

#[tokio::test]
async fn checkout_clears_cart_and_coupon_record() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Tara").await;
    let product = app.seed_product("Hazelnuts", dec!(100), 10, None).await;
    app.seed_coupon(
        "FLAT20",
        DiscountType::Fixed,
        dec!(20),
        dec!(0),
        None,
        None,
        1,
    )
    .await;

    let carts = &app.state.services.carts;
    carts.add_item(customer.id, product.id, None, 1).await.unwrap();
    carts
        .select_coupon(&app.state.services.coupons, customer.id, "FLAT20")
        .await
        .unwrap();

    app.state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap();

    let view = carts.get_view(customer.id).await.unwrap();
    assert!(view.items.is_empty());
    assert!(view.coupon.is_none());
    assert_eq!(view.cart.subtotal, dec!(0));
    assert!(entities::CartCoupon::find()
        .filter(cart_coupon::Column::CartId.eq(view.cart.id))
        .all(app.db())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn checkout_awards_points_and_appends_placement_log() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Imran").await;
    let product = app.seed_product("Pecans", dec!(100), 10, None).await;
    app.seed_reward_config(10, dec!(1), dec!(100), 10, 100).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 2)
        .await
        .unwrap();

    let response = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap();

    // 10 + floor(250 * 1) points on a 250-rupee order.
    assert_eq!(response.rewards_earned, 260);

    let account = app
        .state
        .services
        .rewards
        .get_account(customer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, 260);
    assert_eq!(account.lifetime_earned, 260);

    let logs = entities::OrderLog::find()
        .filter(order_log::Column::OrderId.eq(response.order_id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, OrderStatus::Pending);
    assert_eq!(logs[0].actor, "system");
}

#[tokio::test]
async fn repeated_idempotency_key_replays_the_order() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Zoya").await;
    let product = app.seed_product("Chestnuts", dec!(100), 10, None).await;

    let carts = &app.state.services.carts;
    carts.add_item(customer.id, product.id, None, 2).await.unwrap();

    let mut req = request(&customer.id.to_string());
    req.idempotency_key = Some("retry-123".to_string());
    let first = app
        .state
        .services
        .checkout
        .place_order(req.clone())
        .await
        .unwrap();

    // Client retry: cart repopulated or not, the same order comes back.
    carts.add_item(customer.id, product.id, None, 2).await.unwrap();
    let second = app.state.services.checkout.place_order(req).await.unwrap();

    assert_eq!(first.order_id, second.order_id);
    assert_eq!(first.order_number, second.order_number);
    // Only the first attempt decremented stock.
    assert_eq!(app.stock_of(product.id).await, 8);
    assert_eq!(
        entities::Order::find().all(app.db()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn weight_option_stock_is_tracked_separately() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Leela").await;
    let product = app.seed_product("Saffron", dec!(100), 10, None).await;
    let option = app
        .seed_weight_option(product.id, "5g", dec!(300), 4)
        .await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, Some(option.id), 3)
        .await
        .unwrap();

    let response = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap();

    // 3 x 300 + 50 delivery.
    assert_eq!(response.total, dec!(950));
    // Scalar product stock untouched; the option's pool was decremented.
    assert_eq!(app.stock_of(product.id).await, 10);
    let option = entities::WeightOption::find_by_id(option.id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(option.quantity, 1);
}

#[tokio::test]
async fn external_identifier_resolves_to_the_same_customer() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Omar").await;
    let product = app.seed_product("Cardamom", dec!(100), 10, None).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 1)
        .await
        .unwrap();

    let external_ref = customer.external_ref.clone().unwrap();
    let response = app
        .state
        .services
        .checkout
        .place_order(request(&external_ref))
        .await
        .unwrap();

    let order = entities::Order::find_by_id(response.order_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.customer_id, customer.id);
}

#[tokio::test]
async fn per_user_coupon_limit_is_enforced_on_second_order() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Farah").await;
    let product = app.seed_product("Cloves", dec!(100), 50, None).await;
    app.seed_coupon(
        "ONCE",
        DiscountType::Fixed,
        dec!(30),
        dec!(0),
        None,
        None,
        1,
    )
    .await;

    let carts = &app.state.services.carts;
    let checkout = &app.state.services.checkout;

    carts.add_item(customer.id, product.id, None, 1).await.unwrap();
    let mut req = request(&customer.id.to_string());
    req.coupon_code = Some("ONCE".to_string());
    let first = checkout.place_order(req.clone()).await.unwrap();
    assert_eq!(first.total, dec!(120));

    carts.add_item(customer.id, product.id, None, 1).await.unwrap();
    let second = checkout.place_order(req).await.unwrap();

    // Limit hit: coupon skipped, full price.
    assert_eq!(second.total, dec!(150));
    let order = entities::Order::find_by_id(second.order_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.coupon_code, None);
}

#[tokio::test]
async fn deactivated_product_fails_checkout_without_an_order() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Tara").await;
    let product = app.seed_product("Apricots", dec!(100), 10, None).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 2)
        .await
        .unwrap();

    // Product pulled from the catalogue after it was carted.
    let mut active: entities::product::ActiveModel = product.clone().into();
    active.is_active = Set(false);
    active.update(app.db()).await.unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductUnavailable(_));

    assert_eq!(app.stock_of(product.id).await, 10);
    assert!(entities::Order::find()
        .all(app.db())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn idempotency_key_is_unique_per_customer_in_the_schema() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Kiran").await;
    let product = app.seed_product("Pistachios", dec!(100), 10, None).await;

    let carts = &app.state.services.carts;
    let checkout = &app.state.services.checkout;

    carts.add_item(customer.id, product.id, None, 1).await.unwrap();
    let mut req = request(&customer.id.to_string());
    req.idempotency_key = Some("submit-1".to_string());
    checkout.place_order(req).await.unwrap();

    carts.add_item(customer.id, product.id, None, 1).await.unwrap();
    let mut req = request(&customer.id.to_string());
    req.idempotency_key = Some("submit-2".to_string());
    let second = checkout.place_order(req).await.unwrap();

    // Forcing the second order onto the first key must hit the index, so
    // a concurrent double submit cannot produce two orders.
    let order = entities::Order::find_by_id(second.order_id)
        .one(app.db())
        .await
        .unwrap()
        .unwrap();
    let mut active: entities::order::ActiveModel = order.into();
    active.idempotency_key = Set(Some("submit-1".to_string()));
    let err = active.update(app.db()).await.unwrap_err();
    assert_matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)));
}

#[tokio::test]
async fn failed_reward_award_is_not_reported_as_earned() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Omar").await;
    let product = app.seed_product("Hazelnuts", dec!(100), 10, None).await;
    app.seed_reward_config(10, dec!(1), dec!(100), 10, 100).await;

    app.state
        .services
        .carts
        .add_item(customer.id, product.id, None, 2)
        .await
        .unwrap();

    // Break the ledger so the post-commit award fails.
    app.db()
        .execute_unprepared("DROP TABLE reward_transactions")
        .await
        .unwrap();

    let response = app
        .state
        .services
        .checkout
        .place_order(request(&customer.id.to_string()))
        .await
        .unwrap();

    // The order went through, but no points were credited and none are
    // claimed in the response.
    assert_eq!(response.rewards_earned, 0);
    assert!(entities::Order::find_by_id(response.order_id)
        .one(app.db())
        .await
        .unwrap()
        .is_some());
}
