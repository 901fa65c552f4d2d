//! Error types for the model layer.

use thiserror::Error;

use super::{Errors, Operation, Resource};
use crate::ports::GatewayError;

/// Errors raised by model lifecycle operations.
///
/// Non-strict lifecycle calls turn `Validation` and `RemoteValidation` into
/// an `Ok(false)` result with the model's error set populated; strict calls
/// raise them as `RecordInvalid`. Every other variant is always raised.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Validation failed: {0}")]
    Validation(Errors),

    #[error("Gateway rejected the record: {0}")]
    RemoteValidation(Errors),

    #[error("Record invalid: {0}")]
    RecordInvalid(Errors),

    #[error("Operation '{operation}' is not supported for {resource}")]
    NotSupported {
        resource: Resource,
        operation: Operation,
    },

    #[error("{resource} '{id}' not found")]
    NotFound { resource: Resource, id: String },

    #[error("{resource} must be persisted before this operation")]
    NotPersisted { resource: Resource },

    #[error("Gateway error: {0}")]
    Gateway(GatewayError),
}

impl ModelError {
    pub fn not_supported(resource: Resource, operation: Operation) -> Self {
        ModelError::NotSupported {
            resource,
            operation,
        }
    }

    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        ModelError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Field errors carried by validation-class variants.
    pub fn errors(&self) -> Option<&Errors> {
        match self {
            ModelError::Validation(errors)
            | ModelError::RemoteValidation(errors)
            | ModelError::RecordInvalid(errors) => Some(errors),
            _ => None,
        }
    }

    /// True for local or remote field-validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModelError::Validation(_) | ModelError::RemoteValidation(_)
        )
    }

    /// Converts validation-class failures into `RecordInvalid`.
    pub fn into_record_invalid(self) -> Self {
        match self {
            ModelError::Validation(errors) | ModelError::RemoteValidation(errors) => {
                ModelError::RecordInvalid(errors)
            }
            other => other,
        }
    }
}

impl From<GatewayError> for ModelError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { resource, id } => ModelError::NotFound { resource, id },
            other => ModelError::Gateway(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_supported_displays_resource_and_operation() {
        let err = ModelError::not_supported(Resource::Transaction, Operation::Delete);
        assert_eq!(
            err.to_string(),
            "Operation 'delete' is not supported for transaction"
        );
    }

    #[test]
    fn validation_variants_become_record_invalid() {
        let mut errors = Errors::new();
        errors.add("amount", "can't be blank");

        let local = ModelError::Validation(errors.clone()).into_record_invalid();
        let remote = ModelError::RemoteValidation(errors.clone()).into_record_invalid();

        assert!(matches!(local, ModelError::RecordInvalid(ref e) if *e == errors));
        assert!(matches!(remote, ModelError::RecordInvalid(ref e) if *e == errors));
        assert_eq!(local.to_string(), "Record invalid: amount can't be blank");
    }

    #[test]
    fn other_variants_pass_through_unchanged() {
        let err = ModelError::not_found(Resource::Plan, "gold").into_record_invalid();
        assert!(matches!(err, ModelError::NotFound { .. }));
        assert!(err.errors().is_none());
    }

    #[test]
    fn gateway_not_found_maps_to_model_not_found() {
        let err: ModelError = GatewayError::not_found(Resource::Customer, "c1").into();
        assert!(matches!(
            err,
            ModelError::NotFound { resource: Resource::Customer, ref id } if id == "c1"
        ));
    }
}
