//! In-memory gateway for tests and local development.
//!
//! Implements `GatewayClient` against process-local state. Responses follow
//! the remote gateway's shapes closely enough to drive every model path:
//!
//! - identities assigned on create, timestamps on every write
//! - vaulted cards keep `bin`, `last_4` and a masked number, never the raw
//!   number or cvv
//! - customers are rendered with their `credit_cards` and `addresses`
//! - transactions carry `*_details` hashes and a status history
//! - rejected requests return field errors scoped by association path,
//!   echoing submitted scalars (minus card secrets)
//!
//! Also supports error injection and call tracking for assertions.
//!
//! # Example
//!
//! ```ignore
//! let gateway = InMemoryGateway::new();
//! gateway.seed(Resource::Plan, plan_attributes);
//!
//! let mut subscription = Subscription::new(attributes);
//! subscription.create(&gateway).await?;
//!
//! assert_eq!(gateway.call_count("create"), 1);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Datelike, Months, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{GatewayConfig, ValidationError};
use crate::domain::foundation::{value_as_string, Attributes, Resource};
use crate::ports::{GatewayClient, GatewayError, RemoteError};

/// Card fields that are accepted but never stored or echoed.
const CARD_SECRETS: [&str; 2] = ["number", "cvv"];

const ADDRESS_FIELDS: [&str; 13] = [
    "company",
    "country_code_alpha2",
    "country_code_alpha3",
    "country_code_numeric",
    "country_name",
    "extended_address",
    "first_name",
    "last_name",
    "locality",
    "postal_code",
    "region",
    "street_address",
    "customer_id",
];

/// Recorded gateway call for assertions.
#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub method: String,
    pub resource: Resource,
    pub id: Option<String>,
    pub payload: Option<Attributes>,
    /// Merchant the call was made on behalf of, when configured.
    pub merchant_id: Option<String>,
}

/// In-memory stand-in for the remote gateway.
#[derive(Default, Clone)]
pub struct InMemoryGateway {
    /// Inner state (shared across clones and tasks).
    inner: Arc<Mutex<GatewayState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct GatewayState {
    /// Stored records by resource, then identity.
    records: HashMap<Resource, BTreeMap<String, Attributes>>,

    /// Error to return on the next call.
    next_error: Option<GatewayError>,

    /// Errors returned by every call to a method.
    method_errors: HashMap<String, GatewayError>,

    /// Every call made, in order.
    call_log: Vec<GatewayCall>,

    /// Merchant account from configuration.
    merchant_id: Option<String>,
}

type Outcome<T> = Result<T, GatewayError>;

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway bound to the configured merchant account.
    ///
    /// The configuration is validated first; every recorded call carries
    /// its `merchant_id`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let gateway = Self::default();
        gateway.state().merchant_id = Some(config.merchant_id.trim().to_string());
        tracing::debug!(
            merchant_id = %config.merchant_id,
            environment = ?config.environment,
            "In-memory gateway configured"
        );
        Ok(gateway)
    }

    pub fn merchant_id(&self) -> Option<String> {
        self.state().merchant_id.clone()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Stores a record as-is, generating an identity if it has none.
    ///
    /// Plans, add-ons and discounts can only enter the gateway this way.
    pub fn seed(&self, resource: Resource, mut attributes: Attributes) -> String {
        let key = identity_field(resource);
        let id = text(&attributes, key).unwrap_or_else(new_id);
        attributes.insert(key.to_string(), Value::String(id.clone()));
        self.state().insert(resource, id.clone(), attributes);
        id
    }

    /// The stored record, rendered as a `find` would return it.
    pub fn stored(&self, resource: Resource, id: &str) -> Option<Attributes> {
        let state = self.state();
        state.get(resource, id).map(|record| state.render(resource, record))
    }

    /// Moves a submitted transaction to `settled`, as batch settlement would.
    pub fn settle_transaction(&self, id: &str) -> Outcome<()> {
        let mut state = self.state();
        let mut txn = state.fetch(Resource::Transaction, id)?;
        transition(&mut txn, "settled");
        state.insert(Resource::Transaction, id.to_string(), txn);
        Ok(())
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for every call to a specific method.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// All recorded calls.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Payload of the most recent call to `method`.
    pub fn last_payload(&self, method: &str) -> Option<Attributes> {
        self.state()
            .call_log
            .iter()
            .rev()
            .find(|c| c.method == method)
            .and_then(|c| c.payload.clone())
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(
        &self,
        method: &str,
        resource: Resource,
        id: Option<&str>,
        payload: Option<&Attributes>,
    ) {
        let mut state = self.state();
        let merchant_id = state.merchant_id.clone();
        state.call_log.push(GatewayCall {
            method: method.to_string(),
            resource,
            id: id.map(str::to_string),
            payload: payload.cloned(),
            merchant_id,
        });
    }

    fn check_error(&self, method: &str) -> Outcome<()> {
        let mut state = self.state();

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

impl GatewayState {
    fn get(&self, resource: Resource, id: &str) -> Option<&Attributes> {
        self.records.get(&resource).and_then(|table| table.get(id))
    }

    fn fetch(&self, resource: Resource, id: &str) -> Outcome<Attributes> {
        self.get(resource, id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(resource, id))
    }

    fn insert(&mut self, resource: Resource, id: String, record: Attributes) {
        self.records.entry(resource).or_default().insert(id, record);
    }

    fn remove(&mut self, resource: Resource, id: &str) -> Option<Attributes> {
        self.records.get_mut(&resource).and_then(|table| table.remove(id))
    }

    fn owned_by<'a>(
        &'a self,
        resource: Resource,
        customer_id: &'a str,
    ) -> impl Iterator<Item = &'a Attributes> + 'a {
        self.records
            .get(&resource)
            .into_iter()
            .flat_map(|table| table.values())
            .filter(move |record| text(record, "customer_id").as_deref() == Some(customer_id))
    }

    fn default_card(&self, customer_id: &str) -> Option<Attributes> {
        self.owned_by(Resource::CreditCard, customer_id)
            .find(|card| card.get("default") == Some(&Value::Bool(true)))
            .cloned()
    }

    /// Record as the gateway returns it.
    fn render(&self, resource: Resource, record: &Attributes) -> Attributes {
        let mut rendered = record.clone();
        if resource == Resource::Customer {
            let id = text(record, "id").unwrap_or_default();
            let cards: Vec<Value> = self
                .owned_by(Resource::CreditCard, &id)
                .cloned()
                .map(Value::Object)
                .collect();
            let addresses: Vec<Value> = self
                .owned_by(Resource::Address, &id)
                .cloned()
                .map(Value::Object)
                .collect();
            rendered.insert("credit_cards".to_string(), Value::Array(cards));
            rendered.insert("addresses".to_string(), Value::Array(addresses));
        }
        rendered
    }

    fn all(&self, resource: Resource) -> Vec<Attributes> {
        self.records
            .get(&resource)
            .map(|table| {
                table
                    .values()
                    .map(|record| self.render(resource, record))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ────────────────────────────────────────────────────────────────────────────
    // Vault
    // ────────────────────────────────────────────────────────────────────────────

    fn create_customer(&mut self, payload: &Attributes) -> Outcome<Attributes> {
        let id = match text(payload, "id") {
            Some(id) if self.get(Resource::Customer, &id).is_some() => {
                return Err(rejected(
                    vec![RemoteError::new(
                        "id",
                        "91609",
                        "Customer ID has already been taken.",
                    )],
                    payload,
                ));
            }
            Some(id) => id,
            None => new_id(),
        };

        let mut customer = Attributes::new();
        merge_fields(&mut customer, payload, &["credit_card"]);
        customer.insert("id".to_string(), Value::String(id.clone()));
        stamp(&mut customer, true);
        self.insert(Resource::Customer, id.clone(), customer.clone());

        if let Some(card) = object(payload, "credit_card") {
            if let Err(errors) = self.vault_card(&id, card) {
                self.remove(Resource::Customer, &id);
                return Err(rejected(scoped(errors, "credit_card"), payload));
            }
        }

        Ok(self.render(Resource::Customer, &customer))
    }

    fn create_address(&mut self, payload: &Attributes) -> Outcome<Attributes> {
        let customer_id = self.require_customer(payload)?;
        self.vault_address(&customer_id, payload)
            .map_err(|errors| rejected(errors, payload))
    }

    fn create_card(&mut self, payload: &Attributes) -> Outcome<Attributes> {
        let customer_id = self.require_customer(payload)?;
        self.vault_card(&customer_id, payload)
            .map_err(|errors| rejected(errors, payload))
    }

    fn require_customer(&self, payload: &Attributes) -> Outcome<String> {
        match text(payload, "customer_id") {
            Some(id) if self.get(Resource::Customer, &id).is_some() => Ok(id),
            Some(_) => Err(rejected(
                vec![RemoteError::new("customer_id", "91705", "Customer ID is invalid.")],
                payload,
            )),
            None => Err(rejected(
                vec![RemoteError::new("customer_id", "91704", "Customer ID is required.")],
                payload,
            )),
        }
    }

    fn vault_address(
        &mut self,
        customer_id: &str,
        payload: &Attributes,
    ) -> Result<Attributes, Vec<RemoteError>> {
        let mut address = address_from_payload(payload, None)?;
        let id = new_id();
        address.insert("id".to_string(), Value::String(id.clone()));
        address.insert(
            "customer_id".to_string(),
            Value::String(customer_id.to_string()),
        );
        stamp(&mut address, true);
        self.insert(Resource::Address, id, address.clone());
        Ok(address)
    }

    fn vault_card(
        &mut self,
        customer_id: &str,
        payload: &Attributes,
    ) -> Result<Attributes, Vec<RemoteError>> {
        let mut errors = Vec::new();
        let mut card = card_from_payload(payload, None).unwrap_or_else(|card_errors| {
            errors.extend(card_errors);
            Attributes::new()
        });

        let token = text(payload, "token").unwrap_or_else(new_id);
        if self.get(Resource::CreditCard, &token).is_some() {
            errors.push(RemoteError::new("token", "91719", "Token has already been taken."));
        }

        let billing = match (
            object(payload, "billing_address"),
            text(payload, "billing_address_id"),
        ) {
            (Some(raw), _) => match address_from_payload(raw, None) {
                Ok(address) => Some(address),
                Err(address_errors) => {
                    errors.extend(scoped(address_errors, "billing_address"));
                    None
                }
            },
            (None, Some(id)) => match self.get(Resource::Address, &id) {
                Some(address) => Some(address.clone()),
                None => {
                    errors.push(RemoteError::new(
                        "billing_address_id",
                        "91702",
                        "Billing address ID is invalid.",
                    ));
                    None
                }
            },
            (None, None) => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        if let Some(mut address) = billing {
            if text(&address, "id").is_none() {
                let id = new_id();
                address.insert("id".to_string(), Value::String(id.clone()));
                address.insert(
                    "customer_id".to_string(),
                    Value::String(customer_id.to_string()),
                );
                stamp(&mut address, true);
                self.insert(Resource::Address, id, address.clone());
            }
            card.insert("billing_address".to_string(), Value::Object(address));
        }

        let make_default = option_flag(payload, "make_default")
            || self.default_card(customer_id).is_none();
        if make_default {
            self.clear_default_card(customer_id);
        }

        card.insert("token".to_string(), Value::String(token.clone()));
        card.insert(
            "customer_id".to_string(),
            Value::String(customer_id.to_string()),
        );
        card.insert("default".to_string(), Value::Bool(make_default));
        stamp(&mut card, true);
        self.insert(Resource::CreditCard, token, card.clone());
        Ok(card)
    }

    fn clear_default_card(&mut self, customer_id: &str) {
        if let Some(table) = self.records.get_mut(&Resource::CreditCard) {
            for card in table.values_mut() {
                if text(card, "customer_id").as_deref() == Some(customer_id) {
                    card.insert("default".to_string(), Value::Bool(false));
                }
            }
        }
    }

    fn update_vault_record(
        &mut self,
        resource: Resource,
        id: &str,
        payload: &Attributes,
    ) -> Outcome<Attributes> {
        let existing = self.fetch(resource, id)?;
        let mut updated = match resource {
            Resource::CreditCard => card_from_payload(payload, Some(&existing))
                .map_err(|errors| rejected(errors, payload))?,
            Resource::Address => address_from_payload(payload, Some(&existing))
                .map_err(|errors| rejected(errors, payload))?,
            _ => {
                let mut record = existing;
                merge_fields(&mut record, payload, &["credit_card"]);
                record
            }
        };

        if resource == Resource::CreditCard && option_flag(payload, "make_default") {
            if let Some(customer_id) = text(&updated, "customer_id") {
                self.clear_default_card(&customer_id);
            }
            updated.insert("default".to_string(), Value::Bool(true));
        }

        stamp(&mut updated, false);
        self.insert(resource, id.to_string(), updated.clone());
        Ok(self.render(resource, &updated))
    }

    fn delete_customer(&mut self, id: &str) -> Outcome<()> {
        self.remove(Resource::Customer, id)
            .ok_or_else(|| GatewayError::not_found(Resource::Customer, id))?;
        for resource in [Resource::CreditCard, Resource::Address] {
            if let Some(table) = self.records.get_mut(&resource) {
                table.retain(|_, record| text(record, "customer_id").as_deref() != Some(id));
            }
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────────
    // Transactions
    // ────────────────────────────────────────────────────────────────────────────

    fn create_transaction(&mut self, payload: &Attributes) -> Outcome<Attributes> {
        let mut errors = Vec::new();

        let amount = match text(payload, "amount").map(|raw| parse_cents(&raw)) {
            None => {
                errors.push(RemoteError::new("amount", "81502", "Amount is required."));
                None
            }
            Some(None) => {
                errors.push(RemoteError::new(
                    "amount",
                    "81503",
                    "Amount is an invalid format.",
                ));
                None
            }
            Some(Some(cents)) if cents <= 0 => {
                errors.push(RemoteError::new(
                    "amount",
                    "81531",
                    "Amount must be greater than zero.",
                ));
                None
            }
            Some(Some(cents)) => Some(cents),
        };

        let kind = text(payload, "type").unwrap_or_else(|| "sale".to_string());
        if kind != "sale" && kind != "credit" {
            errors.push(RemoteError::new("type", "91523", "Transaction type is invalid."));
        }

        let customer = match (text(payload, "customer_id"), object(payload, "customer")) {
            (Some(id), _) => match self.get(Resource::Customer, &id) {
                Some(customer) => Some(customer.clone()),
                None => {
                    errors.push(RemoteError::new(
                        "customer_id",
                        "91510",
                        "Customer ID is invalid.",
                    ));
                    None
                }
            },
            (None, Some(raw)) => {
                let mut details = raw.clone();
                details.insert("id".to_string(), Value::Null);
                Some(details)
            }
            (None, None) => None,
        };

        let card = if let Some(raw) = object(payload, "credit_card") {
            match card_from_payload(raw, None) {
                Ok(card) => Some(card),
                Err(card_errors) => {
                    errors.extend(scoped(card_errors, "credit_card"));
                    None
                }
            }
        } else if let Some(token) = text(payload, "payment_method_token") {
            match self.get(Resource::CreditCard, &token) {
                Some(card) => Some(card.clone()),
                None => {
                    errors.push(RemoteError::new(
                        "payment_method_token",
                        "91518",
                        "Payment method token is invalid.",
                    ));
                    None
                }
            }
        } else {
            let fallback = customer
                .as_ref()
                .and_then(|c| text(c, "id"))
                .and_then(|id| self.default_card(&id));
            if fallback.is_none() {
                errors.push(RemoteError::new(
                    "base",
                    "91508",
                    "Cannot determine payment method.",
                ));
            }
            fallback
        };

        let billing = self.address_detail(payload, "billing", "billing_address_id", &mut errors);
        let shipping =
            self.address_detail(payload, "shipping", "shipping_address_id", &mut errors);

        let Some(amount) = amount.filter(|_| errors.is_empty()) else {
            return Err(rejected(errors, payload));
        };

        let status = if option_flag(payload, "submit_for_settlement") {
            "submitted_for_settlement"
        } else {
            "authorized"
        };

        let mut txn = Attributes::new();
        merge_fields(
            &mut txn,
            payload,
            &[
                "amount",
                "billing",
                "billing_address_id",
                "credit_card",
                "customer",
                "customer_id",
                "payment_method_token",
                "shipping",
                "shipping_address_id",
            ],
        );
        let id = new_id();
        txn.insert("id".to_string(), Value::String(id.clone()));
        txn.insert("type".to_string(), Value::String(kind));
        txn.insert("amount".to_string(), Value::String(format_cents(amount)));
        txn.insert("currency_iso_code".to_string(), json!("USD"));
        txn.insert("refund_ids".to_string(), json!([]));
        txn.insert("status_history".to_string(), json!([]));
        for (key, details) in [
            ("customer_details", customer),
            ("credit_card_details", card),
            ("billing_details", billing),
            ("shipping_details", shipping),
        ] {
            if let Some(details) = details {
                txn.insert(key.to_string(), Value::Object(details));
            }
        }
        stamp(&mut txn, true);
        transition(&mut txn, status);

        self.insert(Resource::Transaction, id, txn.clone());
        Ok(txn)
    }

    fn address_detail(
        &self,
        payload: &Attributes,
        name: &str,
        reference_key: &str,
        errors: &mut Vec<RemoteError>,
    ) -> Option<Attributes> {
        if let Some(id) = text(payload, reference_key) {
            let found = self.get(Resource::Address, &id).cloned();
            if found.is_none() {
                errors.push(RemoteError::new(reference_key, "91702", "Address ID is invalid."));
            }
            return found;
        }
        let raw = object(payload, name)?;
        match address_from_payload(raw, None) {
            Ok(mut address) => {
                address.insert("id".to_string(), Value::Null);
                Some(address)
            }
            Err(address_errors) => {
                errors.extend(scoped(address_errors, name));
                None
            }
        }
    }

    fn submit_for_settlement(&mut self, id: &str, amount: Option<&str>) -> Outcome<Attributes> {
        let mut txn = self.fetch(Resource::Transaction, id)?;
        let echoed = id_params(id, amount);

        if status_of(&txn) != "authorized" {
            return Err(rejected(
                vec![RemoteError::new(
                    "base",
                    "91507",
                    "Cannot submit for settlement unless status is authorized.",
                )],
                &echoed,
            ));
        }

        let authorized = amount_of(&txn);
        if let Some(raw) = amount {
            match parse_cents(raw) {
                Some(cents) if cents > 0 && cents <= authorized => {
                    txn.insert("amount".to_string(), Value::String(format_cents(cents)));
                }
                Some(cents) if cents > authorized => {
                    return Err(rejected(
                        vec![RemoteError::new(
                            "amount",
                            "91522",
                            "Settlement amount cannot be more than the authorized amount.",
                        )],
                        &echoed,
                    ));
                }
                _ => {
                    return Err(rejected(
                        vec![RemoteError::new(
                            "amount",
                            "81503",
                            "Amount is an invalid format.",
                        )],
                        &echoed,
                    ));
                }
            }
        }

        transition(&mut txn, "submitted_for_settlement");
        stamp(&mut txn, false);
        self.insert(Resource::Transaction, id.to_string(), txn.clone());
        Ok(txn)
    }

    fn refund(&mut self, id: &str, amount: Option<&str>) -> Outcome<Attributes> {
        let mut txn = self.fetch(Resource::Transaction, id)?;
        let echoed = id_params(id, amount);

        if !matches!(status_of(&txn), "settled" | "settling") {
            return Err(rejected(
                vec![RemoteError::new(
                    "base",
                    "91506",
                    "Cannot refund transaction unless it is settled.",
                )],
                &echoed,
            ));
        }

        let refunded: i64 = refund_ids(&txn)
            .iter()
            .filter_map(|refund_id| self.get(Resource::Transaction, refund_id))
            .map(amount_of)
            .sum();
        let remaining = amount_of(&txn) - refunded;
        if remaining <= 0 {
            return Err(rejected(
                vec![RemoteError::new(
                    "base",
                    "91512",
                    "Transaction has already been completely refunded.",
                )],
                &echoed,
            ));
        }

        let cents = match amount.map(parse_cents) {
            None => remaining,
            Some(Some(cents)) if cents > 0 && cents <= remaining => cents,
            Some(Some(cents)) if cents > remaining => {
                return Err(rejected(
                    vec![RemoteError::new("amount", "91521", "Refund amount is too large.")],
                    &echoed,
                ));
            }
            Some(_) => {
                return Err(rejected(
                    vec![RemoteError::new(
                        "amount",
                        "81503",
                        "Amount is an invalid format.",
                    )],
                    &echoed,
                ));
            }
        };

        let refund_id = new_id();
        let mut refund = Attributes::new();
        for key in [
            "customer_details",
            "credit_card_details",
            "billing_details",
            "currency_iso_code",
        ] {
            if let Some(value) = txn.get(key) {
                refund.insert(key.to_string(), value.clone());
            }
        }
        refund.insert("id".to_string(), Value::String(refund_id.clone()));
        refund.insert("type".to_string(), json!("credit"));
        refund.insert("amount".to_string(), Value::String(format_cents(cents)));
        refund.insert("refunded_transaction_id".to_string(), json!(id));
        refund.insert("refund_ids".to_string(), json!([]));
        refund.insert("status_history".to_string(), json!([]));
        stamp(&mut refund, true);
        transition(&mut refund, "submitted_for_settlement");
        self.insert(Resource::Transaction, refund_id.clone(), refund);

        let mut ids = refund_ids(&txn);
        ids.push(refund_id);
        txn.insert("refund_ids".to_string(), json!(ids));
        stamp(&mut txn, false);
        self.insert(Resource::Transaction, id.to_string(), txn.clone());
        Ok(txn)
    }

    fn void(&mut self, id: &str) -> Outcome<Attributes> {
        let mut txn = self.fetch(Resource::Transaction, id)?;
        if !matches!(
            status_of(&txn),
            "authorized" | "submitted_for_settlement"
        ) {
            return Err(rejected(
                vec![RemoteError::new(
                    "base",
                    "91504",
                    "Transaction can only be voided if status is authorized or submitted_for_settlement.",
                )],
                &id_params(id, None),
            ));
        }
        transition(&mut txn, "voided");
        stamp(&mut txn, false);
        self.insert(Resource::Transaction, id.to_string(), txn.clone());
        Ok(txn)
    }

    // ────────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ────────────────────────────────────────────────────────────────────────────

    fn check_subscription_refs(
        &self,
        payload: &Attributes,
        required: bool,
        errors: &mut Vec<RemoteError>,
    ) -> (Option<Attributes>, Option<Attributes>) {
        let card = match text(payload, "payment_method_token") {
            Some(token) => self.get(Resource::CreditCard, &token).cloned(),
            None => None,
        };
        if card.is_none() && (required || payload.contains_key("payment_method_token")) {
            errors.push(RemoteError::new(
                "payment_method_token",
                "91903",
                "Payment method token is invalid.",
            ));
        }

        let plan = match text(payload, "plan_id") {
            Some(plan_id) => self.get(Resource::Plan, &plan_id).cloned(),
            None => None,
        };
        if plan.is_none() && (required || payload.contains_key("plan_id")) {
            errors.push(RemoteError::new("plan_id", "91904", "Plan ID is invalid."));
        }

        (card, plan)
    }

    fn create_subscription(&mut self, payload: &Attributes) -> Outcome<Attributes> {
        let mut errors = Vec::new();
        let (card, plan) = self.check_subscription_refs(payload, true, &mut errors);

        let requested_id = text(payload, "id");
        if let Some(id) = &requested_id {
            if self.get(Resource::Subscription, id).is_some() {
                errors.push(RemoteError::new("id", "81906", "ID has already been taken."));
            }
        }

        let price = text(payload, "price")
            .or_else(|| plan.as_ref().and_then(|p| text(p, "price")))
            .map(|raw| parse_cents(&raw));
        if let Some(None) = price {
            errors.push(RemoteError::new("price", "81904", "Price is an invalid format."));
        }

        let (Some(card), Some(plan)) = (card, plan) else {
            return Err(rejected(errors, payload));
        };
        if !errors.is_empty() {
            return Err(rejected(errors, payload));
        }
        let price = price.flatten().unwrap_or(0);

        let id = requested_id.unwrap_or_else(new_id);
        let mut subscription = Attributes::new();
        merge_fields(&mut subscription, payload, &["price"]);
        let never_expires = payload
            .get("never_expires")
            .and_then(Value::as_bool)
            .unwrap_or(!payload.contains_key("number_of_billing_cycles"));
        let today = Utc::now().date_naive();
        let next_billing = today
            .checked_add_months(Months::new(1))
            .unwrap_or(today);

        subscription.insert("id".to_string(), Value::String(id.clone()));
        subscription.insert("price".to_string(), Value::String(format_cents(price)));
        subscription.insert("status".to_string(), json!("Active"));
        subscription.insert("balance".to_string(), json!("0.00"));
        subscription.insert("current_billing_cycle".to_string(), json!(1));
        subscription.insert("failure_count".to_string(), json!(0));
        subscription.insert("days_past_due".to_string(), Value::Null);
        subscription.insert("never_expires".to_string(), Value::Bool(never_expires));
        subscription.insert(
            "billing_period_start_date".to_string(),
            json!(today.to_string()),
        );
        subscription.insert(
            "next_billing_date".to_string(),
            json!(next_billing.to_string()),
        );
        for key in ["add_ons", "discounts"] {
            subscription.insert(
                key.to_string(),
                plan.get(key).cloned().unwrap_or_else(|| json!([])),
            );
        }

        let mut transactions = Vec::new();
        if !payload
            .get("trial_period")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let txn_id = new_id();
            let mut txn = Attributes::new();
            txn.insert("id".to_string(), Value::String(txn_id.clone()));
            txn.insert("type".to_string(), json!("sale"));
            txn.insert("amount".to_string(), Value::String(format_cents(price)));
            txn.insert("currency_iso_code".to_string(), json!("USD"));
            txn.insert("subscription_id".to_string(), Value::String(id.clone()));
            txn.insert("plan_id".to_string(), plan.get("id").cloned().unwrap_or(Value::Null));
            txn.insert("refund_ids".to_string(), json!([]));
            txn.insert("status_history".to_string(), json!([]));
            if let Some(customer) = text(&card, "customer_id")
                .and_then(|customer_id| self.get(Resource::Customer, &customer_id).cloned())
            {
                txn.insert("customer_details".to_string(), Value::Object(customer));
            }
            txn.insert("credit_card_details".to_string(), Value::Object(card));
            stamp(&mut txn, true);
            transition(&mut txn, "submitted_for_settlement");
            self.insert(Resource::Transaction, txn_id, txn.clone());
            transactions.push(Value::Object(txn));
        }
        subscription.insert("transactions".to_string(), Value::Array(transactions));
        stamp(&mut subscription, true);

        self.insert(Resource::Subscription, id, subscription.clone());
        Ok(subscription)
    }

    fn update_subscription(&mut self, id: &str, payload: &Attributes) -> Outcome<Attributes> {
        let mut subscription = self.fetch(Resource::Subscription, id)?;
        if status_of(&subscription) == "Canceled" {
            return Err(rejected(
                vec![RemoteError::new(
                    "base",
                    "81901",
                    "Cannot edit a canceled subscription.",
                )],
                payload,
            ));
        }

        let mut errors = Vec::new();
        self.check_subscription_refs(payload, false, &mut errors);
        let price = text(payload, "price").map(|raw| parse_cents(&raw));
        if let Some(None) = price {
            errors.push(RemoteError::new("price", "81904", "Price is an invalid format."));
        }
        if !errors.is_empty() {
            return Err(rejected(errors, payload));
        }

        merge_fields(&mut subscription, payload, &["price"]);
        if let Some(Some(cents)) = price {
            subscription.insert("price".to_string(), Value::String(format_cents(cents)));
        }
        stamp(&mut subscription, false);
        self.insert(Resource::Subscription, id.to_string(), subscription.clone());
        Ok(subscription)
    }

    fn cancel_subscription(&mut self, id: &str) -> Outcome<()> {
        let mut subscription = self.fetch(Resource::Subscription, id)?;
        if status_of(&subscription) == "Canceled" {
            return Err(rejected(
                vec![RemoteError::new(
                    "base",
                    "81905",
                    "Subscription has already been canceled.",
                )],
                &id_params(id, None),
            ));
        }
        subscription.insert("status".to_string(), json!("Canceled"));
        stamp(&mut subscription, false);
        self.insert(Resource::Subscription, id.to_string(), subscription);
        Ok(())
    }
}

#[async_trait]
impl GatewayClient for InMemoryGateway {
    async fn create(&self, resource: Resource, payload: Attributes) -> Outcome<Attributes> {
        self.record_call("create", resource, None, Some(&payload));
        self.check_error("create")?;

        let mut state = self.state();
        match resource {
            Resource::Customer => state.create_customer(&payload),
            Resource::CreditCard => state.create_card(&payload),
            Resource::Address => state.create_address(&payload),
            Resource::Transaction => state.create_transaction(&payload),
            Resource::Subscription => state.create_subscription(&payload),
            Resource::Plan | Resource::AddOn | Resource::Discount => Err(
                GatewayError::unexpected(format!("{} cannot be created", resource)),
            ),
        }
    }

    async fn update(
        &self,
        resource: Resource,
        id: &str,
        payload: Attributes,
    ) -> Outcome<Attributes> {
        self.record_call("update", resource, Some(id), Some(&payload));
        self.check_error("update")?;

        let mut state = self.state();
        match resource {
            Resource::Customer | Resource::CreditCard | Resource::Address => {
                state.update_vault_record(resource, id, &payload)
            }
            Resource::Subscription => state.update_subscription(id, &payload),
            Resource::Transaction | Resource::Plan | Resource::AddOn | Resource::Discount => Err(
                GatewayError::unexpected(format!("{} cannot be updated", resource)),
            ),
        }
    }

    async fn find(&self, resource: Resource, id: &str) -> Outcome<Attributes> {
        self.record_call("find", resource, Some(id), None);
        self.check_error("find")?;

        let state = self.state();
        let record = state.fetch(resource, id)?;
        Ok(state.render(resource, &record))
    }

    async fn delete(&self, resource: Resource, id: &str) -> Outcome<()> {
        self.record_call("delete", resource, Some(id), None);
        self.check_error("delete")?;

        let mut state = self.state();
        match resource {
            Resource::Customer => state.delete_customer(id),
            Resource::Subscription => state.cancel_subscription(id),
            Resource::CreditCard | Resource::Address => state
                .remove(resource, id)
                .map(|_| ())
                .ok_or_else(|| GatewayError::not_found(resource, id)),
            Resource::Transaction | Resource::Plan | Resource::AddOn | Resource::Discount => Err(
                GatewayError::unexpected(format!("{} cannot be deleted", resource)),
            ),
        }
    }

    async fn all(&self, resource: Resource) -> Outcome<Vec<Attributes>> {
        self.record_call("all", resource, None, None);
        self.check_error("all")?;

        Ok(self.state().all(resource))
    }

    async fn submit_for_settlement(
        &self,
        id: &str,
        amount: Option<&str>,
    ) -> Outcome<Attributes> {
        self.record_call(
            "submit_for_settlement",
            Resource::Transaction,
            Some(id),
            Some(&id_params(id, amount)),
        );
        self.check_error("submit_for_settlement")?;

        self.state().submit_for_settlement(id, amount)
    }

    async fn refund(&self, id: &str, amount: Option<&str>) -> Outcome<Attributes> {
        self.record_call(
            "refund",
            Resource::Transaction,
            Some(id),
            Some(&id_params(id, amount)),
        );
        self.check_error("refund")?;

        self.state().refund(id, amount)
    }

    async fn void(&self, id: &str) -> Outcome<Attributes> {
        self.record_call("void", Resource::Transaction, Some(id), None);
        self.check_error("void")?;

        self.state().void(id)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Record helpers
// ════════════════════════════════════════════════════════════════════════════════

fn identity_field(resource: Resource) -> &'static str {
    match resource {
        Resource::CreditCard => "token",
        _ => "id",
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn text(attributes: &Attributes, field: &str) -> Option<String> {
    attributes
        .get(field)
        .and_then(value_as_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn object<'a>(attributes: &'a Attributes, field: &str) -> Option<&'a Attributes> {
    attributes.get(field).and_then(Value::as_object)
}

fn option_flag(payload: &Attributes, option: &str) -> bool {
    object(payload, "options")
        .and_then(|options| options.get(option))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Copies submitted fields except `options`, card secrets and `skip`.
fn merge_fields(target: &mut Attributes, payload: &Attributes, skip: &[&str]) {
    for (key, value) in payload {
        let key = key.as_str();
        if key == "options" || CARD_SECRETS.contains(&key) || skip.contains(&key) {
            continue;
        }
        target.insert(key.to_string(), value.clone());
    }
}

fn stamp(record: &mut Attributes, created: bool) {
    let now = Value::String(Utc::now().to_rfc3339());
    if created {
        record.insert("created_at".to_string(), now.clone());
    }
    record.insert("updated_at".to_string(), now);
}

fn status_of(record: &Attributes) -> &str {
    record.get("status").and_then(Value::as_str).unwrap_or_default()
}

fn transition(txn: &mut Attributes, status: &str) {
    let entry = json!({
        "status": status,
        "amount": txn.get("amount").cloned().unwrap_or(Value::Null),
        "timestamp": Utc::now().to_rfc3339(),
    });
    if let Some(Value::Array(history)) = txn.get_mut("status_history") {
        history.push(entry);
    } else {
        txn.insert("status_history".to_string(), json!([entry]));
    }
    txn.insert("status".to_string(), Value::String(status.to_string()));
}

fn refund_ids(txn: &Attributes) -> Vec<String> {
    match txn.get("refund_ids") {
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn amount_of(txn: &Attributes) -> i64 {
    text(txn, "amount")
        .and_then(|raw| parse_cents(&raw))
        .unwrap_or(0)
}

fn id_params(id: &str, amount: Option<&str>) -> Attributes {
    let mut params = Attributes::new();
    params.insert("id".to_string(), Value::String(id.to_string()));
    if let Some(amount) = amount {
        params.insert("amount".to_string(), Value::String(amount.to_string()));
    }
    params
}

/// Validation failure echoing submitted scalars, minus card secrets.
fn rejected(errors: Vec<RemoteError>, payload: &Attributes) -> GatewayError {
    let params = payload
        .iter()
        .filter(|(key, value)| {
            !CARD_SECRETS.contains(&key.as_str()) && !value.is_object() && !value.is_array()
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    GatewayError::Validation { errors, params }
}

fn scoped(errors: Vec<RemoteError>, association: &str) -> Vec<RemoteError> {
    errors
        .into_iter()
        .map(|error| error.within(association))
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Money
// ════════════════════════════════════════════════════════════════════════════════

/// Parses a decimal amount with at most two fractional digits into cents.
fn parse_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() || fraction.len() > 2 || !digits(whole) || !digits(fraction) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<2}", fraction).parse().ok()?
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

// ════════════════════════════════════════════════════════════════════════════════
// Cards and addresses
// ════════════════════════════════════════════════════════════════════════════════

fn luhn_valid(number: &str) -> bool {
    if number.len() < 12 || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = number
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| match (i % 2, d * 2) {
            (1, doubled) if doubled > 9 => doubled - 9,
            (1, doubled) => doubled,
            _ => d,
        })
        .sum();
    sum % 10 == 0
}

fn card_brand(number: &str) -> &'static str {
    match number.chars().next() {
        Some('4') => "Visa",
        Some('2') | Some('5') => "MasterCard",
        Some('3') => "American Express",
        Some('6') => "Discover",
        _ => "Unknown",
    }
}

/// Parses `MM/YY` or `MM/YYYY` into a month and a four-digit year.
fn split_expiration(date: &str) -> Option<(u32, i32)> {
    let (month, year) = date.split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    let year = year.trim();
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };
    (1..=12).contains(&month).then_some((month, year))
}

/// Stored view of submitted card data.
///
/// The raw number becomes `bin`, `last_4`, `card_type` and `masked_number`;
/// it and the cvv are dropped.
fn card_from_payload(
    payload: &Attributes,
    existing: Option<&Attributes>,
) -> Result<Attributes, Vec<RemoteError>> {
    let mut errors = Vec::new();
    let mut card = existing.cloned().unwrap_or_default();

    match text(payload, "number") {
        Some(number) if luhn_valid(&number) => {
            let bin = &number[..6];
            let last_4 = &number[number.len() - 4..];
            card.insert("bin".to_string(), json!(bin));
            card.insert("last_4".to_string(), json!(last_4));
            card.insert("card_type".to_string(), json!(card_brand(&number)));
            card.insert(
                "masked_number".to_string(),
                json!(format!("{}******{}", bin, last_4)),
            );
        }
        Some(_) => errors.push(RemoteError::new(
            "number",
            "81715",
            "Credit card number is invalid.",
        )),
        None if existing.is_none() => errors.push(RemoteError::new(
            "number",
            "81714",
            "Credit card number is required.",
        )),
        None => {}
    }

    let expiration = match text(payload, "expiration_date") {
        Some(date) => split_expiration(&date).ok_or(()),
        None => match (
            text(payload, "expiration_month").and_then(|m| m.parse::<u32>().ok()),
            text(payload, "expiration_year").and_then(|y| y.parse::<i32>().ok()),
        ) {
            (Some(month), Some(year)) if (1..=12).contains(&month) => Ok((month, year)),
            _ => Err(()),
        },
    };
    match expiration {
        Ok((month, year)) => {
            let today = Utc::now().date_naive();
            let expired = (year, month) < (today.year(), today.month());
            card.insert(
                "expiration_month".to_string(),
                json!(format!("{:02}", month)),
            );
            card.insert("expiration_year".to_string(), json!(year.to_string()));
            card.insert(
                "expiration_date".to_string(),
                json!(format!("{:02}/{}", month, year)),
            );
            card.insert("expired".to_string(), Value::Bool(expired));
        }
        Err(()) if existing.is_none() => errors.push(RemoteError::new(
            "expiration_date",
            "81709",
            "Expiration date is required.",
        )),
        Err(()) => {}
    }

    merge_fields(
        &mut card,
        payload,
        &[
            "billing_address",
            "billing_address_id",
            "expiration_date",
            "expiration_month",
            "expiration_year",
            "customer_id",
            "token",
        ],
    );

    if errors.is_empty() {
        Ok(card)
    } else {
        Err(errors)
    }
}

/// Stored view of submitted address data.
fn address_from_payload(
    payload: &Attributes,
    existing: Option<&Attributes>,
) -> Result<Attributes, Vec<RemoteError>> {
    let mut address = existing.cloned().unwrap_or_default();
    for field in ADDRESS_FIELDS {
        if let Some(value) = payload.get(field) {
            address.insert(field.to_string(), value.clone());
        }
    }
    let filled = ADDRESS_FIELDS
        .iter()
        .filter(|field| **field != "customer_id")
        .any(|field| text(&address, field).is_some());
    if !filled {
        return Err(vec![RemoteError::new(
            "base",
            "81801",
            "Addresses must have at least one field filled in.",
        )]);
    }
    Ok(address)
}
