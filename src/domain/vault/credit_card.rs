//! Credit card model.
//!
//! Cards are identified by `token` rather than `id`. The raw `number` and
//! `cvv` are only ever held between construction and the next submission
//! attempt; after-persist cleanup drops them whether or not the gateway
//! accepted the card.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Address;
use crate::domain::foundation::{
    Action, AssociationDef, AssociationKind, AssociationSlot, AttributeSchema, Errors, HasOne,
    Model, ModelSchema, Record, Resource, Rule,
};

static DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+$").expect("DIGITS: invalid regex pattern"));

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[-_a-z0-9]+$").expect("TOKEN: invalid regex pattern"));

static EXPIRATION_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0?[1-9]|1[0-2])/(\d{2}|\d{4})$").expect("EXPIRATION_DATE: invalid regex pattern")
});

/// Fields dropped after every submission attempt.
pub const SENSITIVE_FIELDS: [&str; 2] = ["number", "cvv"];

pub static BILLING_ADDRESS: AssociationDef = AssociationDef {
    name: "billing_address",
    kind: AssociationKind::Embedded {
        source: "billing_address",
        reference_key: Some("billing_address_id"),
    },
    target: Resource::Address,
};

static CREDIT_CARD_RULES: [Rule; 10] = [
    Rule::max_length("cardholder_name", 175),
    Rule::presence("number").on(Action::Create),
    Rule::format("number", &DIGITS),
    Rule::length("number", 12, 19),
    Rule::format("cvv", &DIGITS),
    Rule::length("cvv", 3, 4),
    Rule::integer_within("expiration_month", 1.0, 12.0),
    Rule::integer_within("expiration_year", 1976.0, 2200.0),
    Rule::format("expiration_date", &EXPIRATION_DATE),
    Rule::format("token", &TOKEN),
];

pub static CREDIT_CARD_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::CreditCard,
    attributes: AttributeSchema {
        identity: "token",
        create: &[
            "billing_address_id",
            "cardholder_name",
            "customer_id",
            "cvv",
            "device_data",
            "expiration_date",
            "expiration_month",
            "expiration_year",
            "number",
            "options",
            "token",
        ],
        update: &[
            "billing_address_id",
            "cardholder_name",
            "cvv",
            "device_data",
            "expiration_date",
            "expiration_month",
            "expiration_year",
            "number",
            "options",
        ],
        readonly: &[
            "bin",
            "card_type",
            "created_at",
            "default",
            "expired",
            "image_url",
            "last_4",
            "masked_number",
            "unique_number_identifier",
            "updated_at",
        ],
        hidden: &[],
    },
    associations: &[&BILLING_ADDRESS],
    rules: &CREDIT_CARD_RULES,
    unsupported: &[],
};

/// A card stored in the gateway vault.
#[derive(Debug, Clone)]
pub struct CreditCard {
    record: Record,
    billing_address: HasOne<Address>,
}

impl Model for CreditCard {
    fn schema() -> &'static ModelSchema {
        &CREDIT_CARD_SCHEMA
    }

    fn from_record(record: Record) -> Self {
        Self {
            record,
            billing_address: HasOne::new(&BILLING_ADDRESS),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn slots(&self) -> Vec<&dyn AssociationSlot> {
        vec![&self.billing_address]
    }

    fn slots_mut(&mut self) -> Vec<&mut dyn AssociationSlot> {
        vec![&mut self.billing_address]
    }

    fn validate_extra(&self, action: Action, errors: &mut Errors) {
        if action != Action::Create || self.record.contains("expiration_date") {
            return;
        }
        for field in ["expiration_month", "expiration_year"] {
            if !self.record.contains(field) {
                errors.add(field, "can't be blank");
            }
        }
    }

    fn clear_sensitive(&mut self) {
        for field in SENSITIVE_FIELDS {
            self.record.remove(field);
        }
    }
}

impl CreditCard {
    pub fn token(&self) -> Option<&str> {
        self.id()
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.record.get_str("customer_id")
    }

    pub fn cardholder_name(&self) -> Option<&str> {
        self.record.get_str("cardholder_name")
    }

    pub fn bin(&self) -> Option<&str> {
        self.record.get_str("bin")
    }

    pub fn last_4(&self) -> Option<&str> {
        self.record.get_str("last_4")
    }

    pub fn card_type(&self) -> Option<&str> {
        self.record.get_str("card_type")
    }

    /// `MM/YYYY` from `expiration_date`, or assembled from month and year.
    pub fn expiration_date(&self) -> Option<String> {
        if let Some(date) = self.record.get_str("expiration_date") {
            return Some(date.to_string());
        }
        let month = self.record.get_string("expiration_month")?;
        let year = self.record.get_string("expiration_year")?;
        Some(format!("{:0>2}/{}", month, year))
    }

    /// Gateway-provided masked number, else `bin******last_4`.
    pub fn masked_number(&self) -> Option<String> {
        if let Some(masked) = self.record.get_str("masked_number") {
            return Some(masked.to_string());
        }
        Some(format!("{}******{}", self.bin()?, self.last_4()?))
    }

    /// Whether this is the owning customer's default card.
    pub fn is_default(&self) -> bool {
        self.record.get_bool("default").unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.record.get_bool("expired").unwrap_or(false)
    }

    /// True while an unsubmitted raw number or cvv is held.
    pub fn has_sensitive_data(&self) -> bool {
        SENSITIVE_FIELDS.iter().any(|f| self.record.contains(f))
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.get()
    }

    pub fn set_billing_address(&mut self, address: Option<Address>) {
        self.billing_address.set(address);
    }
}
