//! Lifecycle operations shared by every model.
//!
//! [`Persistence`] is blanket-implemented for all [`Model`] types. Each
//! operation comes in two flavours:
//!
//! - `create`, `update`, `save`, `destroy` return `Ok(false)` when local or
//!   remote validation fails, leaving the error set on the model
//! - the `_strict` variants raise [`ModelError::RecordInvalid`] instead
//!
//! Unsupported operations, missing records and transport failures raise in
//! both flavours.
//!
//! # Around-persist
//!
//! Every gateway submission runs inside a [`PersistScope`]. The scope calls
//! `Model::before_persist` on entry and `Model::after_persist` when dropped,
//! so cleanup runs on success, on failure, on early return, on panic and
//! when the enclosing future is dropped mid-flight.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;

use super::{Action, Attributes, Errors, Model, ModelError, Operation};
use crate::ports::{GatewayClient, GatewayError};

/// Guard that brackets a gateway submission with the around-persist hooks.
pub struct PersistScope<'a, T: Model> {
    model: &'a mut T,
    operation: Operation,
}

impl<'a, T: Model> PersistScope<'a, T> {
    pub fn enter(model: &'a mut T, operation: Operation) -> Self {
        model.before_persist();
        Self { model, operation }
    }
}

impl<T: Model> Deref for PersistScope<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.model
    }
}

impl<T: Model> DerefMut for PersistScope<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.model
    }
}

impl<T: Model> Drop for PersistScope<'_, T> {
    fn drop(&mut self) {
        self.model.after_persist();
        tracing::trace!(
            resource = %T::resource(),
            operation = %self.operation,
            "Persist scope closed"
        );
    }
}

/// Fails with `NotSupported` if the type declares `operation` unsupported.
pub fn ensure_supported<T: Model>(operation: Operation) -> Result<(), ModelError> {
    if T::schema().supports(operation) {
        Ok(())
    } else {
        tracing::debug!(
            resource = %T::resource(),
            operation = %operation,
            "Rejected unsupported operation"
        );
        Err(ModelError::not_supported(T::resource(), operation))
    }
}

/// Applies a gateway outcome to `model`.
///
/// A response is hydrated into the model and clears its error set. Gateway
/// field errors become the model's error set and a `RemoteValidation` error.
pub fn apply_outcome<T: Model>(
    model: &mut T,
    operation: Operation,
    outcome: Result<Attributes, GatewayError>,
) -> Result<(), ModelError> {
    match outcome {
        Ok(response) => {
            model.hydrate(&response);
            model.record_mut().set_errors(Errors::new());
            tracing::info!(
                resource = %T::resource(),
                operation = %operation,
                id = model.id().unwrap_or_default(),
                "Gateway accepted request"
            );
            Ok(())
        }
        Err(GatewayError::Validation { errors, params }) => {
            model.apply_remote_errors(&errors, &params);
            tracing::warn!(
                resource = %T::resource(),
                operation = %operation,
                error_count = errors.len(),
                "Gateway rejected request"
            );
            Err(ModelError::RemoteValidation(model.errors().clone()))
        }
        Err(other) => {
            tracing::error!(
                resource = %T::resource(),
                operation = %operation,
                error = %other,
                "Gateway request failed"
            );
            Err(other.into())
        }
    }
}

/// Maps a lifecycle result to the non-strict convention.
pub fn conclude(result: Result<(), ModelError>) -> Result<bool, ModelError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_validation() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Maps a lifecycle result to the strict convention.
pub fn strict(result: Result<(), ModelError>) -> Result<(), ModelError> {
    result.map_err(ModelError::into_record_invalid)
}

async fn submit<T: Model>(
    model: &mut T,
    gateway: &dyn GatewayClient,
    action: Action,
) -> Result<(), ModelError> {
    let operation = Operation::from(action);
    ensure_supported::<T>(operation)?;
    if model.is_destroyed() {
        return Err(ModelError::not_supported(T::resource(), operation));
    }

    let id = match action {
        Action::Create => None,
        Action::Update => Some(
            model
                .id()
                .map(str::to_string)
                .ok_or(ModelError::NotPersisted {
                    resource: T::resource(),
                })?,
        ),
    };

    model.normalize();
    if !model.validate(action) {
        tracing::debug!(
            resource = %T::resource(),
            operation = %operation,
            error_count = model.errors().len(),
            "Local validation failed"
        );
        return Err(ModelError::Validation(model.errors().clone()));
    }

    let payload = model.payload_for(action);
    tracing::debug!(
        resource = %T::resource(),
        operation = %operation,
        fields = payload.len(),
        "Submitting to gateway"
    );

    let mut scope = PersistScope::enter(model, operation);
    let outcome = match id {
        None => gateway.create(T::resource(), payload).await,
        Some(id) => gateway.update(T::resource(), &id, payload).await,
    };
    apply_outcome(&mut *scope, operation, outcome)
}

async fn remove<T: Model>(model: &mut T, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
    ensure_supported::<T>(Operation::Destroy)?;
    if model.is_destroyed() {
        return Err(ModelError::not_supported(T::resource(), Operation::Destroy));
    }

    if let Some(id) = model.id().map(str::to_string) {
        match gateway.delete(T::resource(), &id).await {
            Ok(()) => {}
            Err(GatewayError::Validation { errors, params }) => {
                model.apply_remote_errors(&errors, &params);
                return Err(ModelError::RemoteValidation(model.errors().clone()));
            }
            Err(other) => return Err(other.into()),
        }
        tracing::info!(resource = %T::resource(), id = %id, "Destroyed");
    }

    model.record_mut().mark_destroyed();
    Ok(())
}

/// Lifecycle operations available on every model.
#[async_trait]
pub trait Persistence: Model {
    /// Fetches a record by identity.
    async fn find(gateway: &dyn GatewayClient, id: &str) -> Result<Self, ModelError>;

    /// Fetches every record of this type.
    async fn all(gateway: &dyn GatewayClient) -> Result<Vec<Self>, ModelError>;

    /// Deletes a record by identity without loading it.
    async fn delete(gateway: &dyn GatewayClient, id: &str) -> Result<(), ModelError>;

    async fn create(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError>;

    async fn create_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError>;

    async fn update(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError>;

    async fn update_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError>;

    /// Creates when not yet persisted, updates otherwise.
    async fn save(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError>;

    async fn save_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError>;

    /// Deletes the remote record (if persisted) and tombstones this instance.
    async fn destroy(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError>;

    async fn destroy_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError>;
}

#[async_trait]
impl<T: Model> Persistence for T {
    async fn find(gateway: &dyn GatewayClient, id: &str) -> Result<Self, ModelError> {
        ensure_supported::<T>(Operation::Find)?;
        let id = id.trim();
        if id.is_empty() {
            return Err(ModelError::not_found(T::resource(), id));
        }
        let response = gateway.find(T::resource(), id).await?;
        Ok(T::from_response(response))
    }

    async fn all(gateway: &dyn GatewayClient) -> Result<Vec<Self>, ModelError> {
        ensure_supported::<T>(Operation::All)?;
        let responses = gateway.all(T::resource()).await?;
        Ok(responses.into_iter().map(T::from_response).collect())
    }

    async fn delete(gateway: &dyn GatewayClient, id: &str) -> Result<(), ModelError> {
        ensure_supported::<T>(Operation::Delete)?;
        let id = id.trim();
        if id.is_empty() {
            return Err(ModelError::not_found(T::resource(), id));
        }
        gateway.delete(T::resource(), id).await?;
        tracing::info!(resource = %T::resource(), id, "Deleted");
        Ok(())
    }

    async fn create(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError> {
        conclude(submit(self, gateway, Action::Create).await)
    }

    async fn create_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
        strict(submit(self, gateway, Action::Create).await)
    }

    async fn update(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError> {
        conclude(submit(self, gateway, Action::Update).await)
    }

    async fn update_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
        strict(submit(self, gateway, Action::Update).await)
    }

    async fn save(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError> {
        if self.is_persisted() {
            self.update(gateway).await
        } else {
            self.create(gateway).await
        }
    }

    async fn save_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
        if self.is_persisted() {
            self.update_strict(gateway).await
        } else {
            self.create_strict(gateway).await
        }
    }

    async fn destroy(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError> {
        conclude(remove(self, gateway).await)
    }

    async fn destroy_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
        strict(remove(self, gateway).await)
    }
}
