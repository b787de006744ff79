pub mod addresses;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod rewards;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        AddressService, CartService, CheckoutService, CouponService, CustomerService,
        InventoryService, OrderService, PricingService, RewardService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The wired-up service graph handlers run against.
#[derive(Clone)]
pub struct AppServices {
    pub customers: CustomerService,
    pub carts: CartService,
    pub coupons: CouponService,
    pub addresses: AddressService,
    pub inventory: InventoryService,
    pub rewards: RewardService,
    pub orders: OrderService,
    pub checkout: CheckoutService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let customers = CustomerService::new(db.clone());
        let carts = CartService::new(db.clone(), event_sender.clone(), config.currency.clone());
        let coupons = CouponService::new(db.clone());
        let addresses = AddressService::new(db.clone());
        let inventory = InventoryService::new(db.clone());
        let rewards = RewardService::new(db.clone(), event_sender.clone());
        let orders = OrderService::new(db.clone(), inventory.clone(), event_sender.clone());
        let pricing = PricingService::new(
            coupons.clone(),
            rewards.clone(),
            config.checkout.clone(),
        );
        let checkout = CheckoutService::new(
            db,
            customers.clone(),
            carts.clone(),
            addresses.clone(),
            inventory.clone(),
            pricing,
            rewards.clone(),
            orders.clone(),
            event_sender,
            config.checkout.clone(),
            config.currency.clone(),
        );

        Self {
            customers,
            carts,
            coupons,
            addresses,
            inventory,
            rewards,
            orders,
            checkout,
        }
    }
}
