//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `GatewayClient` - Remote payment gateway (create/update/find/delete plus
//!   transaction actions)

mod gateway_client;

pub use gateway_client::{GatewayClient, GatewayError, RemoteError};
