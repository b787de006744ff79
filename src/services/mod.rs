pub mod addresses;
pub mod carts;
pub mod checkout;
pub mod coupons;
pub mod customers;
pub mod inventory;
pub mod orders;
pub mod pricing;
pub mod rewards;

pub use addresses::AddressService;
pub use carts::CartService;
pub use checkout::CheckoutService;
pub use coupons::CouponService;
pub use customers::CustomerService;
pub use inventory::InventoryService;
pub use orders::OrderService;
pub use pricing::PricingService;
pub use rewards::RewardService;
