//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the models to external systems:
//! - `gateway` - In-memory gateway for tests and local development

pub mod gateway;

pub use gateway::{GatewayCall, InMemoryGateway};
