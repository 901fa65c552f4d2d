//! Model base: the per-type schema descriptor and the generic behaviour every
//! domain type shares.
//!
//! A domain type implements the handful of required [`Model`] methods
//! (schema, record access, association slots) and optionally overrides the
//! hooks. Everything else, attribute views, payload shaping, validation,
//! hydration and remote error routing, comes from provided methods driven by
//! the type's [`ModelSchema`].

use serde_json::Value;

use super::associations::{AssociationDef, AssociationSlot};
use super::attributes::{AttributeSchema, Attributes, Record};
use super::validation::{run_rules, Errors, Rule, BASE};
use super::{Action, Operation, Resource};
use crate::ports::RemoteError;

/// Static description of a domain type.
#[derive(Debug)]
pub struct ModelSchema {
    pub resource: Resource,
    pub attributes: AttributeSchema,
    pub associations: &'static [&'static AssociationDef],
    pub rules: &'static [Rule],
    /// Lifecycle operations this type refuses.
    pub unsupported: &'static [Operation],
}

impl ModelSchema {
    pub fn supports(&self, operation: Operation) -> bool {
        !self.unsupported.contains(&operation)
    }

    pub fn association(&self, name: &str) -> Option<&'static AssociationDef> {
        self.associations.iter().copied().find(|def| def.name == name)
    }
}

/// A local model over one remote resource.
pub trait Model: Sized + Send + Sync + 'static {
    fn schema() -> &'static ModelSchema;

    /// Wraps `record` with empty association slots.
    fn from_record(record: Record) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// Association slots, in declaration order.
    fn slots(&self) -> Vec<&dyn AssociationSlot> {
        Vec::new()
    }

    fn slots_mut(&mut self) -> Vec<&mut dyn AssociationSlot> {
        Vec::new()
    }

    /// Canonicalises attribute values after construction or hydration and
    /// before validation.
    fn normalize(&mut self) {}

    /// Checks that do not fit a declarative [`Rule`].
    fn validate_extra(&self, _action: Action, _errors: &mut Errors) {}

    /// Final adjustments to an outbound payload.
    fn customize_payload(&self, _action: Action, _payload: &mut Attributes) {}

    /// Runs before the gateway is called.
    fn before_persist(&mut self) {}

    /// Clears values that must not outlive a submission attempt.
    fn clear_sensitive(&mut self) {}

    // ------------------------------------------------------------------
    // Provided behaviour
    // ------------------------------------------------------------------

    /// Builds an unpersisted model from caller-supplied attributes.
    ///
    /// Nested objects under an association name are routed into the slot.
    fn new(attributes: Attributes) -> Self {
        let mut model = Self::from_record(Record::new(attributes.clone()));
        for slot in model.slots_mut() {
            slot.hydrate(&attributes);
        }
        model.detach_association_keys();
        model.normalize();
        model
    }

    /// Builds a model from a gateway response.
    fn from_response(response: Attributes) -> Self {
        Self::new(response)
    }

    fn resource() -> Resource {
        Self::schema().resource
    }

    fn id(&self) -> Option<&str> {
        self.record().identity(&Self::schema().attributes)
    }

    /// True iff the identity is non-empty.
    fn is_persisted(&self) -> bool {
        self.record().is_persisted(&Self::schema().attributes)
    }

    fn is_destroyed(&self) -> bool {
        self.record().is_destroyed()
    }

    fn get(&self, field: &str) -> Option<&Value> {
        self.record().get(field)
    }

    /// Stores a value locally. Readonly or unknown fields are kept for reads
    /// but never transmitted.
    fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.record_mut().set(field, value);
        self.normalize();
    }

    /// Assigns several attributes at once, routing nested objects into slots.
    fn assign_attributes(&mut self, attributes: Attributes) {
        for (key, value) in &attributes {
            self.record_mut().set(key, value.clone());
        }
        for slot in self.slots_mut() {
            slot.hydrate(&attributes);
        }
        self.detach_association_keys();
        self.normalize();
    }

    /// Externally visible attributes; hidden fields are left out.
    fn attributes(&self) -> Attributes {
        self.record().visible(&Self::schema().attributes)
    }

    fn errors(&self) -> &Errors {
        self.record().errors()
    }

    /// Outbound payload for `action`.
    ///
    /// Whitelisted scalars, then embedded associations (a reference when the
    /// target is persisted, its full create payload otherwise), then the
    /// type's own adjustments. Readonly names are stripped last.
    fn payload_for(&self, action: Action) -> Attributes {
        let schema = Self::schema();
        let mut payload = self.record().payload(&schema.attributes, action);
        for slot in self.slots() {
            if let Some((key, value)) = slot.outbound() {
                payload.insert(key.to_string(), value);
            }
        }
        self.customize_payload(action, &mut payload);
        payload.retain(|key, _| !schema.attributes.is_readonly(key));
        payload
    }

    /// Runs every rule for `action` without touching the stored error set.
    fn validation_errors(&self, action: Action) -> Errors {
        let mut errors = Errors::new();
        run_rules(Self::schema().rules, self.record(), action, &mut errors);
        self.validate_extra(action, &mut errors);
        for slot in self.slots() {
            if let Some(nested) = slot.validation_errors() {
                errors.merge_association(slot.def().name, &nested);
            }
        }
        errors
    }

    /// Validates for `action`, storing the resulting error set.
    fn validate(&mut self, action: Action) -> bool {
        let errors = self.validation_errors(action);
        let valid = errors.is_empty();
        self.record_mut().set_errors(errors);
        valid
    }

    /// Validates for the action `save` would perform.
    fn valid(&mut self) -> bool {
        let action = if self.is_persisted() {
            Action::Update
        } else {
            Action::Create
        };
        self.validate(action)
    }

    /// Replaces readonly attributes and re-hydrates every association.
    fn hydrate(&mut self, response: &Attributes) {
        let schema = Self::schema();
        self.record_mut().apply_response(&schema.attributes, response);
        for slot in self.slots_mut() {
            slot.hydrate_response(response);
        }
        self.detach_association_keys();
        self.normalize();
    }

    /// Surfaces gateway field errors as this model's error set.
    ///
    /// Errors scoped to an embedded association go to that association and
    /// fold back in under its name, minus its `base` messages. Echoed values
    /// are merged into the record.
    fn apply_remote_errors(&mut self, errors: &[RemoteError], echoed: &Attributes) {
        let mut own = Errors::new();
        for error in errors.iter().filter(|e| e.is_top_level()) {
            own.add(error.attribute.clone(), error.message.clone());
        }

        let mut routed = Vec::new();
        for slot in self.slots_mut() {
            let name = slot.def().name;
            let nested: Vec<RemoteError> =
                errors.iter().filter_map(|e| e.relative_to(name)).collect();
            if nested.is_empty() {
                continue;
            }
            routed.push(name);
            match slot.apply_remote_errors(&nested) {
                Some(child) => own.merge_association(name, &child),
                None => {
                    for error in nested.iter().filter(|e| e.attribute != BASE) {
                        own.add(name, format!("{} {}", error.attribute, error.message));
                    }
                }
            }
        }

        for error in errors.iter().filter(|e| e.attribute != BASE) {
            if let Some(head) = error.path.first() {
                if !routed.iter().any(|name| *name == head.as_str()) {
                    own.add(head.clone(), format!("{} {}", error.attribute, error.message));
                }
            }
        }

        let schema = Self::schema();
        let record = self.record_mut();
        record.apply_echoed(&schema.attributes, echoed);
        record.set_errors(own);
    }

    /// After-persist cleanup for this model and every association.
    fn after_persist(&mut self) {
        self.clear_sensitive();
        for slot in self.slots_mut() {
            slot.after_persist();
        }
    }

    /// Drops raw association payloads from the record once slots own them.
    fn detach_association_keys(&mut self) {
        for def in Self::schema().associations {
            if def.owns_raw_key() {
                if let Some(Value::Object(_) | Value::Array(_)) = self.record().get(def.name) {
                    self.record_mut().remove(def.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::vault::{Address, CreditCard};

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    fn card_with_address(address: Value) -> CreditCard {
        CreditCard::new(attrs(json!({
            "number": "4111111111111111",
            "expiration_date": "05/2030",
            "billing_address": address
        })))
    }

    fn plain_card() -> CreditCard {
        CreditCard::new(attrs(json!({
            "number": "4111111111111111",
            "expiration_date": "05/2030"
        })))
    }

    #[test]
    fn nested_objects_move_into_their_slot() {
        let card = card_with_address(json!({"street_address": "1 Main St", "postal_code": "60606"}));

        assert!(card.get("billing_address").is_none());
        let address = card.billing_address().unwrap();
        assert_eq!(address.get("postal_code"), Some(&json!("60606")));
        assert!(!address.is_persisted());
    }

    #[test]
    fn payload_embeds_new_association_and_drops_readonly() {
        let mut card = card_with_address(json!({"street_address": "1 Main St", "postal_code": "60606"}));
        card.set("bin", "411111");

        let payload = card.payload_for(Action::Create);
        assert!(!payload.contains_key("bin"));
        assert_eq!(payload["billing_address"]["postal_code"], json!("60606"));
        assert!(!payload.contains_key("billing_address_id"));
    }

    #[test]
    fn payload_references_persisted_association() {
        let mut card = plain_card();
        card.set_billing_address(Some(Address::from_response(attrs(json!({
            "id": "ad",
            "postal_code": "60606"
        })))));

        let payload = card.payload_for(Action::Create);
        assert_eq!(payload["billing_address_id"], json!("ad"));
        assert!(!payload.contains_key("billing_address"));
    }

    #[test]
    fn new_association_errors_fold_under_its_name() {
        let mut card = card_with_address(json!({"street_address": "1 Main St"}));

        assert!(!card.validate(Action::Create));
        assert_eq!(card.errors().on("billing_address"), ["postal_code can't be blank"]);
        assert!(card.errors().on("number").is_empty());
    }

    #[test]
    fn remote_errors_route_into_live_association() {
        let mut card = card_with_address(json!({"street_address": "1 Main St", "postal_code": "x"}));
        let errors = [
            RemoteError::new("postal_code", "81813", "Postal code can only contain letters.")
                .within("billing_address"),
            RemoteError::new(BASE, "81800", "Address is invalid.").within("billing_address"),
            RemoteError::new("number", "81715", "Credit card number is invalid."),
        ];

        card.apply_remote_errors(&errors, &Attributes::new());

        assert_eq!(card.errors().on("number"), ["Credit card number is invalid."]);
        assert_eq!(
            card.errors().on("billing_address"),
            ["postal_code Postal code can only contain letters."]
        );
        let address = card.billing_address().unwrap();
        assert_eq!(
            address.errors().on("postal_code"),
            ["Postal code can only contain letters."]
        );
    }

    #[test]
    fn remote_errors_without_a_live_slot_stay_on_the_owner() {
        let mut card = plain_card();
        let errors = [RemoteError::new("postal_code", "81808", "Postal code is required.")
            .within("billing_address")];

        card.apply_remote_errors(&errors, &attrs(json!({"cardholder_name": "Jane", "bin": "4"})));

        assert_eq!(
            card.errors().on("billing_address"),
            ["postal_code Postal code is required."]
        );
        assert_eq!(card.cardholder_name(), Some("Jane"));
        assert!(card.bin().is_none());
    }

    #[test]
    fn hydrate_replaces_readonly_values() {
        let mut card = CreditCard::from_response(attrs(json!({"token": "t1", "last_4": "1111"})));
        card.hydrate(&attrs(json!({"token": "t1", "bin": "555555"})));

        assert_eq!(card.bin(), Some("555555"));
        assert!(card.last_4().is_none());
        assert_eq!(card.id(), Some("t1"));
    }
}
