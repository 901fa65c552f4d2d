//! Address model, used standalone and as a customer, card, billing or
//! shipping address.

use once_cell::sync::Lazy;
use regex::Regex;

use super::country;
use crate::domain::foundation::{
    AttributeSchema, Model, ModelSchema, Record, Resource, Rule,
};

static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[- a-z0-9]+$").expect("POSTAL_CODE: invalid regex pattern"));

const MAX_LENGTH: usize = 255;

static ADDRESS_RULES: [Rule; 10] = [
    Rule::max_length("first_name", MAX_LENGTH),
    Rule::max_length("last_name", MAX_LENGTH),
    Rule::max_length("company", MAX_LENGTH),
    Rule::max_length("street_address", MAX_LENGTH),
    Rule::max_length("extended_address", MAX_LENGTH),
    Rule::max_length("locality", MAX_LENGTH),
    Rule::max_length("region", MAX_LENGTH),
    Rule::presence("street_address"),
    Rule::presence("postal_code"),
    Rule::format("postal_code", &POSTAL_CODE),
];

pub static ADDRESS_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::Address,
    attributes: AttributeSchema {
        identity: "id",
        create: &[
            "company",
            "country_code_alpha2",
            "country_code_alpha3",
            "country_code_numeric",
            "country_name",
            "customer_id",
            "extended_address",
            "first_name",
            "last_name",
            "locality",
            "postal_code",
            "region",
            "street_address",
        ],
        update: &[
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
        ],
        readonly: &["id", "created_at", "updated_at"],
        hidden: &[],
    },
    associations: &[],
    rules: &ADDRESS_RULES,
    unsupported: &[],
};

/// A postal address stored in the gateway vault.
#[derive(Debug, Clone)]
pub struct Address {
    record: Record,
}

impl Model for Address {
    fn schema() -> &'static ModelSchema {
        &ADDRESS_SCHEMA
    }

    fn from_record(record: Record) -> Self {
        Self { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn normalize(&mut self) {
        country::normalize(&mut self.record);
    }
}

impl Address {
    pub fn first_name(&self) -> Option<&str> {
        self.record.get_str("first_name")
    }

    pub fn last_name(&self) -> Option<&str> {
        self.record.get_str("last_name")
    }

    /// First and last name joined, skipping whichever is missing.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name(), self.last_name()]
            .into_iter()
            .flatten()
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    pub fn street_address(&self) -> Option<&str> {
        self.record.get_str("street_address")
    }

    pub fn locality(&self) -> Option<&str> {
        self.record.get_str("locality")
    }

    pub fn region(&self) -> Option<&str> {
        self.record.get_str("region")
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.record.get_str("postal_code")
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.record.get_str("customer_id")
    }

    pub fn country_code_alpha2(&self) -> Option<&str> {
        self.record.get_str("country_code_alpha2")
    }

    pub fn country_name(&self) -> Option<&str> {
        self.record.get_str("country_name")
    }
}
