//! Reward ledger behaviour: redemption guards, admin adjustments and the
//! balance/lifetime invariant.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use storefront_api::{
    entities::{self, reward_transaction, RewardTransactionType},
    errors::ServiceError,
};
use test_case::test_case;

#[tokio::test]
async fn redeeming_below_the_minimum_fails() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Asha").await;
    let config = app.seed_reward_config(0, dec!(0), dec!(100_000), 10, 100).await;
    app.seed_reward_balance(customer.id, 500).await;

    let err = app
        .state
        .services
        .rewards
        .redeem(app.db(), customer.id, 50, None, &config)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::BelowMinimumRedemption {
            requested: 50,
            minimum: 100
        }
    );
}

#[tokio::test]
async fn redeeming_more_than_the_balance_fails() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Ravi").await;
    let config = app.seed_reward_config(0, dec!(0), dec!(100_000), 10, 100).await;
    app.seed_reward_balance(customer.id, 200).await;

    let err = app
        .state
        .services
        .rewards
        .redeem(app.db(), customer.id, 300, None, &config)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientBalance {
            requested: 300,
            available: 200
        }
    );
}

#[test_case(500, 200, 700 ; "positive adjustment adds to balance")]
#[test_case(500, -200, 300 ; "negative adjustment subtracts")]
#[test_case(100, -500, 0 ; "balance clamps at zero")]
#[tokio::test]
async fn adjustments_apply_signed_deltas(seed: i64, delta: i64, expected: i64) {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Meera").await;
    app.seed_reward_balance(customer.id, seed).await;

    let account = app
        .state
        .services
        .rewards
        .adjust(customer.id, delta, "manual correction")
        .await
        .unwrap();
    assert_eq!(account.balance, expected);
}

#[tokio::test]
async fn adjustment_appends_an_adjusted_transaction_with_applied_amount() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Vikram").await;
    app.seed_reward_balance(customer.id, 100).await;

    // Requested -500 but only -100 can apply.
    app.state
        .services
        .rewards
        .adjust(customer.id, -500, "fraud rollback")
        .await
        .unwrap();

    let latest = entities::RewardTransaction::find()
        .filter(reward_transaction::Column::CustomerId.eq(customer.id))
        .order_by_desc(reward_transaction::Column::CreatedAt)
        .all(app.db())
        .await
        .unwrap();
    let adjusted = latest
        .iter()
        .find(|t| t.transaction_type == RewardTransactionType::Adjusted)
        .expect("adjusted transaction");
    assert_eq!(adjusted.amount, -100);
    assert_eq!(adjusted.balance_after, 0);
}

#[tokio::test]
async fn every_ledger_row_records_the_running_balance() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Divya").await;
    let config = app.seed_reward_config(0, dec!(0), dec!(100_000), 10, 100).await;

    let rewards = &app.state.services.rewards;
    app.seed_reward_balance(customer.id, 1000).await;
    rewards
        .redeem(app.db(), customer.id, 400, None, &config)
        .await
        .unwrap();
    rewards
        .award(app.db(), customer.id, uuid::Uuid::new_v4(), 150, "Earned on order")
        .await
        .unwrap();

    let account = rewards.get_account(customer.id).await.unwrap().unwrap();
    assert_eq!(account.balance, 750);
    assert_eq!(
        account.balance,
        account.lifetime_earned - account.lifetime_redeemed
    );

    let (transactions, total) = rewards
        .list_transactions(customer.id, 1, 20)
        .await
        .unwrap();
    assert_eq!(total, 3);
    // Newest first: the award of 150 leaving 750.
    assert_eq!(transactions[0].amount, 150);
    assert_eq!(transactions[0].balance_after, 750);
}
