//! Gateway client port.
//!
//! The only external boundary of the crate. Models hand whitelisted payloads
//! to a `GatewayClient` and hydrate themselves from the maps it returns.
//! Transport, retries and timeouts belong to the implementation.
//!
//! # Design
//!
//! - **Resource agnostic**: one generic CRUD surface keyed by [`Resource`]
//! - **Schema-shaped responses**: responses mirror the resource's attribute
//!   and association schema, including nested detail objects
//! - **Field-level rejection**: gateway validation failures carry
//!   per-attribute errors that models surface as their own

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{Attributes, Resource};

/// Port for the remote payment gateway.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Create a resource from `payload`; returns the created resource.
    async fn create(&self, resource: Resource, payload: Attributes)
        -> Result<Attributes, GatewayError>;

    /// Update resource `id` with `payload`; returns the updated resource.
    async fn update(
        &self,
        resource: Resource,
        id: &str,
        payload: Attributes,
    ) -> Result<Attributes, GatewayError>;

    /// Fetch resource `id`. Fails with `NotFound` when missing.
    async fn find(&self, resource: Resource, id: &str) -> Result<Attributes, GatewayError>;

    /// Delete (or cancel) resource `id`.
    async fn delete(&self, resource: Resource, id: &str) -> Result<(), GatewayError>;

    /// List every resource of a kind.
    async fn all(&self, resource: Resource) -> Result<Vec<Attributes>, GatewayError>;

    /// Submit an authorized transaction for settlement, optionally for a lower amount.
    async fn submit_for_settlement(
        &self,
        id: &str,
        amount: Option<&str>,
    ) -> Result<Attributes, GatewayError>;

    /// Refund a settled transaction, optionally partially.
    ///
    /// Returns the refunded transaction with its `refund_ids` updated.
    async fn refund(&self, id: &str, amount: Option<&str>) -> Result<Attributes, GatewayError>;

    /// Void an authorized or submitted transaction.
    async fn void(&self, id: &str) -> Result<Attributes, GatewayError>;
}

/// A single field error reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Association path from the submitted resource, empty for its own fields.
    #[serde(default)]
    pub path: Vec<String>,

    /// Attribute the error applies to (`base` for resource-wide errors).
    pub attribute: String,

    /// Gateway error code.
    pub code: String,

    /// Human-readable message.
    pub message: String,
}

impl RemoteError {
    pub fn new(
        attribute: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: Vec::new(),
            attribute: attribute.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Scopes the error under a nested association.
    pub fn within(mut self, association: impl Into<String>) -> Self {
        self.path.insert(0, association.into());
        self
    }

    /// The same error relative to `association`, if it is scoped there.
    pub fn relative_to(&self, association: &str) -> Option<RemoteError> {
        match self.path.split_first() {
            Some((head, rest)) if head == association => Some(RemoteError {
                path: rest.to_vec(),
                attribute: self.attribute.clone(),
                code: self.code.clone(),
                message: self.message.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.path.is_empty()
    }
}

/// Errors from gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway rejected the request with field errors.
    ///
    /// `params` echoes the submitted values the gateway chose to return.
    #[error("gateway validation failed ({} errors)", errors.len())]
    Validation {
        errors: Vec<RemoteError>,
        params: Attributes,
    },

    #[error("{resource} '{id}' not found")]
    NotFound { resource: Resource, id: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unexpected gateway error: {0}")]
    Unexpected(String),
}

impl GatewayError {
    pub fn validation(errors: Vec<RemoteError>) -> Self {
        GatewayError::Validation {
            errors,
            params: Attributes::new(),
        }
    }

    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        GatewayError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        GatewayError::Unexpected(message.into())
    }
}
