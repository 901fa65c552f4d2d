//! Attribute schema registry and the attribute record every model wraps.
//!
//! A model's fields are declared once as an [`AttributeSchema`] constant,
//! partitioned into `create`, `update` and `readonly` roles. The generic
//! engine consults the schema to decide what is transmitted for each
//! [`Action`]; readonly names never leave the process.

use serde_json::{Map, Value};

use super::{Action, Errors};

/// Field name to value mapping used for payloads, responses and records.
pub type Attributes = Map<String, Value>;

/// Role a field plays in a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Sent on create only.
    Create,
    /// Sent on update only.
    Update,
    /// Sent on both create and update.
    CreateAndUpdate,
    /// Populated from responses only.
    Readonly,
}

/// Per-type declaration of which fields are creatable, updatable or readonly.
#[derive(Debug)]
pub struct AttributeSchema {
    /// Field holding the gateway-assigned identity (`id`, or `token` for cards).
    pub identity: &'static str,

    /// Fields allowed on initial submission.
    pub create: &'static [&'static str],

    /// Fields allowed on modification.
    pub update: &'static [&'static str],

    /// Fields populated from responses only.
    pub readonly: &'static [&'static str],

    /// Fields kept internally but left out of the public attribute view.
    pub hidden: &'static [&'static str],
}

impl AttributeSchema {
    /// Fields allowed for `action`, never including a readonly name.
    pub fn fields_for(&self, action: Action) -> Vec<&'static str> {
        let declared = match action {
            Action::Create => self.create,
            Action::Update => self.update,
        };
        declared
            .iter()
            .copied()
            .filter(|field| !self.is_readonly(field))
            .collect()
    }

    pub fn is_readonly(&self, field: &str) -> bool {
        self.readonly.contains(&field)
    }

    pub fn is_hidden(&self, field: &str) -> bool {
        self.hidden.contains(&field)
    }

    /// Role of a declared field, `None` for unknown names.
    pub fn role_of(&self, field: &str) -> Option<FieldRole> {
        if self.is_readonly(field) {
            return Some(FieldRole::Readonly);
        }
        match (self.create.contains(&field), self.update.contains(&field)) {
            (true, true) => Some(FieldRole::CreateAndUpdate),
            (true, false) => Some(FieldRole::Create),
            (false, true) => Some(FieldRole::Update),
            (false, false) => None,
        }
    }
}

/// True for null, empty or whitespace-only strings, empty arrays and objects.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Renders scalars as strings the way the gateway's text fields compare them.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Attribute storage backing a model instance.
///
/// Holds every field the model has seen, declared or not, together with the
/// error set of the last validation or submission. Unknown fields stay
/// readable through [`Record::get`] but are never transmitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: Attributes,
    errors: Errors,
    destroyed: bool,
}

impl Record {
    pub fn new(values: Attributes) -> Self {
        Self {
            values,
            errors: Errors::new(),
            destroyed: false,
        }
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn set_errors(&mut self, errors: Errors) {
        self.errors = errors;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).filter(|v| !v.is_null())
    }

    /// String view of a scalar field; blank strings read as `None`.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Scalar rendered as a string (numbers and booleans included).
    pub fn get_string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(value_as_string)
    }

    /// Boolean view accepting `true`/`false` and their string forms.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        match self.get(field) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn values(&self) -> &Attributes {
        &self.values
    }

    /// Identity value, if non-empty.
    pub fn identity<'a>(&'a self, schema: &AttributeSchema) -> Option<&'a str> {
        self.get_str(schema.identity)
    }

    /// Persisted iff identity is non-empty.
    pub fn is_persisted(&self, schema: &AttributeSchema) -> bool {
        self.identity(schema).is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    /// Whitelisted, non-null values for `action`.
    pub fn payload(&self, schema: &AttributeSchema, action: Action) -> Attributes {
        schema
            .fields_for(action)
            .into_iter()
            .filter_map(|field| {
                self.get(field)
                    .map(|value| (field.to_string(), value.clone()))
            })
            .collect()
    }

    /// Public view: every stored field except hidden ones.
    pub fn visible(&self, schema: &AttributeSchema) -> Attributes {
        self.values
            .iter()
            .filter(|(key, value)| !schema.is_hidden(key) && !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Writes a gateway response into the record.
    ///
    /// Every response field is stored; readonly fields absent from the
    /// response are cleared so stale server state does not linger.
    pub fn apply_response(&mut self, schema: &AttributeSchema, response: &Attributes) {
        for field in schema.readonly {
            if !response.contains_key(*field) {
                self.values.remove(*field);
            }
        }
        for (key, value) in response {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merges values echoed back by a rejected request, skipping readonly names.
    pub fn apply_echoed(&mut self, schema: &AttributeSchema, echoed: &Attributes) {
        for (key, value) in echoed {
            if schema.is_readonly(key) || value.is_object() || value.is_array() {
                continue;
            }
            self.values.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static SCHEMA: AttributeSchema = AttributeSchema {
        identity: "id",
        create: &["id", "name", "amount", "status"],
        update: &["name"],
        readonly: &["status", "created_at"],
        hidden: &["secret_details"],
    };

    fn record(value: Value) -> Record {
        Record::new(value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn fields_for_excludes_readonly_even_when_listed() {
        let fields = SCHEMA.fields_for(Action::Create);
        assert_eq!(fields, vec!["id", "name", "amount"]);
        assert_eq!(SCHEMA.fields_for(Action::Update), vec!["name"]);
    }

    #[test]
    fn role_of_reports_declared_roles() {
        assert_eq!(SCHEMA.role_of("name"), Some(FieldRole::CreateAndUpdate));
        assert_eq!(SCHEMA.role_of("amount"), Some(FieldRole::Create));
        assert_eq!(SCHEMA.role_of("status"), Some(FieldRole::Readonly));
        assert_eq!(SCHEMA.role_of("unknown"), None);
    }

    #[test]
    fn payload_skips_unknown_readonly_and_null_fields() {
        let r = record(json!({
            "name": "Jane",
            "amount": null,
            "status": "active",
            "nickname": "jj"
        }));
        let payload = r.payload(&SCHEMA, Action::Create);
        assert_eq!(Value::Object(payload), json!({"name": "Jane"}));
        assert_eq!(r.get_str("nickname"), Some("jj"));
    }

    #[test]
    fn persisted_tracks_identity() {
        assert!(!record(json!({})).is_persisted(&SCHEMA));
        assert!(!record(json!({"id": ""})).is_persisted(&SCHEMA));
        assert!(!record(json!({"id": "   "})).is_persisted(&SCHEMA));
        assert!(record(json!({"id": "abc"})).is_persisted(&SCHEMA));
    }

    #[test]
    fn apply_response_replaces_readonly_fields() {
        let mut r = record(json!({"name": "Jane", "status": "stale", "created_at": "x"}));
        let response = json!({"id": "1", "status": "active"});
        r.apply_response(&SCHEMA, response.as_object().unwrap());

        assert_eq!(r.get_str("status"), Some("active"));
        assert!(r.get("created_at").is_none());
        assert_eq!(r.get_str("name"), Some("Jane"));
        assert!(r.is_persisted(&SCHEMA));
    }

    #[test]
    fn visible_hides_internal_fields() {
        let r = record(json!({"name": "Jane", "secret_details": {"a": 1}}));
        let visible = r.visible(&SCHEMA);
        assert!(visible.contains_key("name"));
        assert!(!visible.contains_key("secret_details"));
        assert!(r.get("secret_details").is_some());
    }

    #[test]
    fn apply_echoed_ignores_readonly_and_nested() {
        let mut r = record(json!({"name": "Jane"}));
        let echoed = json!({"name": "Janet", "status": "x", "credit_card": {"number": "1"}});
        r.apply_echoed(&SCHEMA, echoed.as_object().unwrap());
        assert_eq!(r.get_str("name"), Some("Janet"));
        assert!(r.get("status").is_none());
        assert!(r.get("credit_card").is_none());
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(null))));
        assert!(is_blank(Some(&json!("  "))));
        assert!(is_blank(Some(&json!([]))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }
}
