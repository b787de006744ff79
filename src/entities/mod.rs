//! Database entities for the storefront checkout domain.

pub mod cart;
pub mod cart_coupon;
pub mod cart_item;
pub mod coupon;
pub mod coupon_usage;
pub mod customer;
pub mod customer_address;
pub mod order;
pub mod order_item;
pub mod order_log;
pub mod product;
pub mod reward_account;
pub mod reward_config;
pub mod reward_transaction;
pub mod weight_option;

// Re-export entities
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_coupon::{Entity as CartCoupon, Model as CartCouponModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{DiscountType, Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use customer::{Entity as Customer, Model as CustomerModel};
pub use customer_address::{Entity as CustomerAddress, Model as CustomerAddressModel};
pub use order::{DeliveryType, Entity as Order, Model as OrderModel, OrderStatus, PaymentStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use order_log::{Entity as OrderLog, Model as OrderLogModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use reward_account::{Entity as RewardAccount, Model as RewardAccountModel};
pub use reward_config::{Entity as RewardConfig, Model as RewardConfigModel};
pub use reward_transaction::{
    Entity as RewardTransaction, Model as RewardTransactionModel, RewardTransactionType,
};
pub use weight_option::{Entity as WeightOption, Model as WeightOptionModel};
