//! Billing module - money movement and recurring billing.
//!
//! - `transaction` - sales and credits, with settlement, refund and void
//! - `subscription` - recurring billing of a stored card against a plan
//! - `plan` - gateway-configured plans (read only)
//! - `modification` - add-ons and discounts (read only)

mod modification;
mod plan;
mod subscription;
mod transaction;

pub use modification::{
    AddOn, AddOnKind, Discount, DiscountKind, Modification, ModificationKind, ADD_ON_SCHEMA,
    DISCOUNT_SCHEMA,
};
pub use plan::{Plan, PLAN_SCHEMA};
pub use subscription::{Subscription, SUBSCRIPTION_SCHEMA};
pub use transaction::{Transaction, DEFAULT_TYPE, TRANSACTION_SCHEMA};
