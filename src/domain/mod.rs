//! Domain layer containing the model framework and the gateway resources.
//!
//! # Module Organization
//!
//! - `foundation` - Model framework (schemas, associations, validation, lifecycle)
//! - `vault` - Stored payment data (customers, credit cards, addresses)
//! - `billing` - Transactions, subscriptions, plans, add-ons and discounts

pub mod billing;
pub mod foundation;
pub mod vault;
