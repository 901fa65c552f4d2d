//! Vault module - stored payment data.
//!
//! Customers, their credit cards and addresses. Addresses play the billing
//! and shipping roles on cards and transactions through association names,
//! not separate types.

pub mod country;

mod address;
mod credit_card;
mod customer;

pub use address::{Address, ADDRESS_SCHEMA};
pub use country::Country;
pub use credit_card::{CreditCard, CREDIT_CARD_SCHEMA, SENSITIVE_FIELDS};
pub use customer::{Customer, CUSTOMER_SCHEMA};
