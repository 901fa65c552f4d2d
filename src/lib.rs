//! Paygate Models - local model objects over a remote payment gateway
//!
//! This crate exposes a payment gateway's resources (customers, credit cards,
//! addresses, transactions, subscriptions) as models with attribute
//! whitelisting, association wiring, validation and persistence-like
//! lifecycle operations. Network I/O is delegated to a [`ports::GatewayClient`].

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
