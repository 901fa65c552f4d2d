//! Association registry and typed association slots.
//!
//! Each model declares its relations as static [`AssociationDef`]s and holds
//! one slot per relation:
//!
//! - [`HasOne`] for embedded sub-objects
//! - [`BelongsTo`] for foreign-key references resolved lazily by id
//! - [`HasMany`] for ordered collections
//!
//! Slots implement the dyn-safe [`AssociationSlot`] trait. A model's
//! `slots()` list is the dispatch table the lifecycle engine walks when it
//! hydrates, validates, shapes payloads and routes gateway errors.

use serde_json::Value;

use super::{Action, Attributes, Errors, Model, ModelError, Resource};
use crate::domain::foundation::persistence::Persistence;
use crate::ports::{GatewayClient, RemoteError};

/// How an association is stored and transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Nested object.
    ///
    /// Hydrated from `source` (falling back to the association name). When
    /// new it is sent as a full payload under the association name; once
    /// persisted only its identity goes out, under `reference_key`.
    Embedded {
        source: &'static str,
        reference_key: Option<&'static str>,
    },

    /// Looked up by the value of `foreign_key` on the owner.
    Reference { foreign_key: &'static str },

    /// Ordered list hydrated from the `source` array. Never transmitted.
    Collection { source: &'static str },
}

/// A named relation declared by a model.
#[derive(Debug)]
pub struct AssociationDef {
    pub name: &'static str,
    pub kind: AssociationKind,
    pub target: Resource,
}

impl AssociationDef {
    /// Response key the association is hydrated from, if any.
    pub fn source(&self) -> Option<&'static str> {
        match self.kind {
            AssociationKind::Embedded { source, .. } | AssociationKind::Collection { source } => {
                Some(source)
            }
            AssociationKind::Reference { .. } => None,
        }
    }

    /// Owner field holding the referenced identity.
    pub fn foreign_key(&self) -> Option<&'static str> {
        match self.kind {
            AssociationKind::Reference { foreign_key } => Some(foreign_key),
            AssociationKind::Embedded { reference_key, .. } => reference_key,
            AssociationKind::Collection { .. } => None,
        }
    }

    /// Whether the raw value under the association name belongs to the slot
    /// rather than to the owner's record.
    pub fn owns_raw_key(&self) -> bool {
        !matches!(self.kind, AssociationKind::Reference { .. })
    }
}

/// Operations the lifecycle engine performs on any association.
pub trait AssociationSlot: Send + Sync {
    fn def(&self) -> &'static AssociationDef;

    /// Rebuilds the slot from the owner's response or constructor attributes.
    fn hydrate(&mut self, attributes: &Attributes);

    /// Rebuilds the slot from a successful gateway response.
    fn hydrate_response(&mut self, response: &Attributes) {
        self.hydrate(response);
    }

    /// Validation errors of a new embedded object, `None` when not applicable.
    fn validation_errors(&self) -> Option<Errors> {
        None
    }

    /// Key and value to embed in the owner's outbound payload.
    fn outbound(&self) -> Option<(&'static str, Value)> {
        None
    }

    /// Routes gateway errors scoped to this association into the target.
    ///
    /// Returns the target's resulting error set, or `None` when there is no
    /// target to receive them.
    fn apply_remote_errors(&mut self, _errors: &[RemoteError]) -> Option<Errors> {
        None
    }

    /// Runs the target's after-persist cleanup.
    fn after_persist(&mut self) {}
}

/// Embedded one-to-one association.
#[derive(Debug, Clone)]
pub struct HasOne<T> {
    def: &'static AssociationDef,
    value: Option<T>,
}

impl<T: Model> HasOne<T> {
    pub fn new(def: &'static AssociationDef) -> Self {
        Self { def, value: None }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    pub fn set(&mut self, value: Option<T>) {
        self.value = value;
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Model> AssociationSlot for HasOne<T> {
    fn def(&self) -> &'static AssociationDef {
        self.def
    }

    fn hydrate(&mut self, attributes: &Attributes) {
        let raw = self
            .def
            .source()
            .and_then(|source| attributes.get(source))
            .filter(|v| v.is_object())
            .or_else(|| attributes.get(self.def.name));

        match raw {
            Some(Value::Object(nested)) => self.value = Some(T::from_response(nested.clone())),
            Some(Value::Null) => self.value = None,
            _ => {}
        }
    }

    /// A new object the response does not echo was consumed by the
    /// submission and is dropped.
    fn hydrate_response(&mut self, response: &Attributes) {
        let echoed = self
            .def
            .source()
            .into_iter()
            .chain([self.def.name])
            .any(|key| response.contains_key(key));
        if !echoed && self.value.as_ref().is_some_and(|value| !value.is_persisted()) {
            self.value = None;
        }
        self.hydrate(response);
    }

    fn validation_errors(&self) -> Option<Errors> {
        self.value
            .as_ref()
            .filter(|value| !value.is_persisted())
            .map(|value| value.validation_errors(Action::Create))
    }

    fn outbound(&self) -> Option<(&'static str, Value)> {
        let value = self.value.as_ref()?;
        if value.is_persisted() {
            let key = self.def.foreign_key()?;
            let id = value.id()?;
            Some((key, Value::String(id.to_string())))
        } else {
            Some((self.def.name, Value::Object(value.payload_for(Action::Create))))
        }
    }

    fn apply_remote_errors(&mut self, errors: &[RemoteError]) -> Option<Errors> {
        let value = self.value.as_mut()?;
        value.apply_remote_errors(errors, &Attributes::new());
        Some(value.errors().clone())
    }

    fn after_persist(&mut self) {
        if let Some(value) = self.value.as_mut() {
            value.after_persist();
        }
    }
}

/// Ordered one-to-many association.
#[derive(Debug, Clone)]
pub struct HasMany<T> {
    def: &'static AssociationDef,
    items: Vec<T>,
}

impl<T: Model> HasMany<T> {
    pub fn new(def: &'static AssociationDef) -> Self {
        Self {
            def,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }
}

impl<T: Model> AssociationSlot for HasMany<T> {
    fn def(&self) -> &'static AssociationDef {
        self.def
    }

    fn hydrate(&mut self, attributes: &Attributes) {
        let raw = self
            .def
            .source()
            .and_then(|source| attributes.get(source))
            .or_else(|| attributes.get(self.def.name));

        match raw {
            Some(Value::Array(entries)) => {
                self.items = entries
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|entry| T::from_response(entry.clone()))
                    .collect();
            }
            Some(Value::Null) => self.items.clear(),
            _ => {}
        }
    }
}

/// Foreign-key reference resolved on demand and cached per instance.
#[derive(Debug, Clone)]
pub struct BelongsTo<T> {
    def: &'static AssociationDef,
    cached: Option<(String, T)>,
}

impl<T: Model> BelongsTo<T> {
    pub fn new(def: &'static AssociationDef) -> Self {
        Self { def, cached: None }
    }

    /// The cached target, if it was loaded for `key`.
    pub fn cached(&self, key: Option<&str>) -> Option<&T> {
        match (&self.cached, key) {
            (Some((cached_key, value)), Some(key)) if cached_key == key => Some(value),
            _ => None,
        }
    }

    /// Stores an already-loaded target under its own identity.
    pub fn preload(&mut self, value: T) {
        if let Some(id) = value.id().map(str::to_string) {
            self.cached = Some((id, value));
        }
    }

    /// Resolves the target for `key`, fetching it once per distinct key.
    ///
    /// A blank key resolves to `None` without a gateway call.
    pub async fn load(
        &mut self,
        gateway: &dyn GatewayClient,
        key: Option<&str>,
    ) -> Result<Option<&T>, ModelError> {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let fresh = !matches!(&self.cached, Some((cached_key, _)) if cached_key == key);
        if fresh {
            tracing::debug!(
                association = self.def.name,
                target = %self.def.target,
                key,
                "Resolving reference"
            );
            let value = T::find(gateway, key).await?;
            self.cached = Some((key.to_string(), value));
        }

        Ok(self.cached.as_ref().map(|(_, value)| value))
    }
}

impl<T: Model> AssociationSlot for BelongsTo<T> {
    fn def(&self) -> &'static AssociationDef {
        self.def
    }

    /// References are keyed by the owner's foreign key; the cache is
    /// invalidated lazily when that key changes.
    fn hydrate(&mut self, _attributes: &Attributes) {}
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapters::InMemoryGateway;
    use crate::domain::billing::Plan;

    static EMBEDDED: AssociationDef = AssociationDef {
        name: "credit_card",
        kind: AssociationKind::Embedded {
            source: "credit_card_details",
            reference_key: Some("payment_method_token"),
        },
        target: Resource::CreditCard,
    };

    static REFERENCE: AssociationDef = AssociationDef {
        name: "plan",
        kind: AssociationKind::Reference {
            foreign_key: "plan_id",
        },
        target: Resource::Plan,
    };

    static COLLECTION: AssociationDef = AssociationDef {
        name: "add_ons",
        kind: AssociationKind::Collection { source: "add_ons" },
        target: Resource::AddOn,
    };

    #[test]
    fn def_reports_source_and_foreign_key() {
        assert_eq!(EMBEDDED.source(), Some("credit_card_details"));
        assert_eq!(EMBEDDED.foreign_key(), Some("payment_method_token"));
        assert_eq!(REFERENCE.source(), None);
        assert_eq!(REFERENCE.foreign_key(), Some("plan_id"));
        assert_eq!(COLLECTION.foreign_key(), None);
    }

    #[test]
    fn references_leave_raw_keys_to_the_owner() {
        assert!(EMBEDDED.owns_raw_key());
        assert!(COLLECTION.owns_raw_key());
        assert!(!REFERENCE.owns_raw_key());
    }

    fn gateway_with_plans() -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        for (id, name) in [("basic", "Basic"), ("pro", "Pro")] {
            let plan = json!({"id": id, "name": name, "price": "10.00"});
            gateway.seed(Resource::Plan, plan.as_object().cloned().unwrap_or_default());
        }
        gateway
    }

    #[tokio::test]
    async fn reference_is_fetched_once_per_key() {
        let gateway = gateway_with_plans();
        let mut plan: BelongsTo<Plan> = BelongsTo::new(&REFERENCE);

        let loaded = plan.load(&gateway, Some("basic")).await.unwrap();
        assert_eq!(loaded.and_then(Plan::name), Some("Basic"));
        plan.load(&gateway, Some("basic")).await.unwrap();
        assert_eq!(gateway.call_count("find"), 1);

        let loaded = plan.load(&gateway, Some("pro")).await.unwrap();
        assert_eq!(loaded.and_then(Plan::name), Some("Pro"));
        plan.load(&gateway, Some("pro")).await.unwrap();
        assert_eq!(gateway.call_count("find"), 2);
        assert!(plan.cached(Some("basic")).is_none());
        assert!(plan.cached(Some("pro")).is_some());
    }

    #[tokio::test]
    async fn blank_reference_key_resolves_to_none() {
        let gateway = gateway_with_plans();
        let mut plan: BelongsTo<Plan> = BelongsTo::new(&REFERENCE);

        for key in [None, Some(""), Some("   ")] {
            assert!(plan.load(&gateway, key).await.unwrap().is_none());
        }
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_reference_is_not_cached() {
        let gateway = gateway_with_plans();
        let mut plan: BelongsTo<Plan> = BelongsTo::new(&REFERENCE);

        let err = plan.load(&gateway, Some("gold")).await.unwrap_err();
        assert!(matches!(err, ModelError::NotFound { .. }));
        assert!(plan.cached(Some("gold")).is_none());
    }
}
