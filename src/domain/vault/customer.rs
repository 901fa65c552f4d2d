//! Customer model.
//!
//! A customer may be created together with a first card embedded under
//! `credit_card`. Stored cards and addresses come back as collections.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Address, CreditCard};
use crate::domain::foundation::{
    AssociationDef, AssociationKind, AssociationSlot, AttributeSchema, HasMany, HasOne, Model,
    ModelSchema, Record, Resource, Rule,
};

static CUSTOMER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[-_a-z0-9]*$").expect("CUSTOMER_ID: invalid regex pattern"));

/// Ids the gateway reserves for its own routes.
const RESERVED_IDS: &[&str] = &["all", "new"];

const MAX_LENGTH: usize = 255;

pub static CREDIT_CARD: AssociationDef = AssociationDef {
    name: "credit_card",
    kind: AssociationKind::Embedded {
        source: "credit_card",
        reference_key: None,
    },
    target: Resource::CreditCard,
};

pub static CREDIT_CARDS: AssociationDef = AssociationDef {
    name: "credit_cards",
    kind: AssociationKind::Collection {
        source: "credit_cards",
    },
    target: Resource::CreditCard,
};

pub static ADDRESSES: AssociationDef = AssociationDef {
    name: "addresses",
    kind: AssociationKind::Collection {
        source: "addresses",
    },
    target: Resource::Address,
};

static CUSTOMER_RULES: [Rule; 10] = [
    Rule::format("id", &CUSTOMER_ID),
    Rule::max_length("id", 36),
    Rule::exclusion("id", RESERVED_IDS),
    Rule::max_length("first_name", MAX_LENGTH),
    Rule::max_length("last_name", MAX_LENGTH),
    Rule::max_length("company", MAX_LENGTH),
    Rule::max_length("website", MAX_LENGTH),
    Rule::max_length("phone", MAX_LENGTH),
    Rule::max_length("fax", MAX_LENGTH),
    Rule::max_length("email", MAX_LENGTH),
];

pub static CUSTOMER_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::Customer,
    attributes: AttributeSchema {
        identity: "id",
        create: &[
            "company",
            "custom_fields",
            "device_data",
            "email",
            "fax",
            "first_name",
            "id",
            "last_name",
            "phone",
            "website",
        ],
        update: &[
            "company",
            "custom_fields",
            "device_data",
            "email",
            "fax",
            "first_name",
            "last_name",
            "phone",
            "website",
        ],
        readonly: &["created_at", "updated_at"],
        hidden: &[],
    },
    associations: &[&CREDIT_CARD, &CREDIT_CARDS, &ADDRESSES],
    rules: &CUSTOMER_RULES,
    unsupported: &[],
};

/// A customer stored in the gateway vault.
#[derive(Debug, Clone)]
pub struct Customer {
    record: Record,
    credit_card: HasOne<CreditCard>,
    credit_cards: HasMany<CreditCard>,
    addresses: HasMany<Address>,
}

impl Model for Customer {
    fn schema() -> &'static ModelSchema {
        &CUSTOMER_SCHEMA
    }

    fn from_record(record: Record) -> Self {
        Self {
            record,
            credit_card: HasOne::new(&CREDIT_CARD),
            credit_cards: HasMany::new(&CREDIT_CARDS),
            addresses: HasMany::new(&ADDRESSES),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn slots(&self) -> Vec<&dyn AssociationSlot> {
        vec![&self.credit_card, &self.credit_cards, &self.addresses]
    }

    fn slots_mut(&mut self) -> Vec<&mut dyn AssociationSlot> {
        vec![
            &mut self.credit_card,
            &mut self.credit_cards,
            &mut self.addresses,
        ]
    }
}

impl Customer {
    pub fn first_name(&self) -> Option<&str> {
        self.record.get_str("first_name")
    }

    pub fn last_name(&self) -> Option<&str> {
        self.record.get_str("last_name")
    }

    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name(), self.last_name()]
            .into_iter()
            .flatten()
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    pub fn email(&self) -> Option<&str> {
        self.record.get_str("email")
    }

    pub fn company(&self) -> Option<&str> {
        self.record.get_str("company")
    }

    /// Card to be created along with this customer.
    pub fn credit_card(&self) -> Option<&CreditCard> {
        self.credit_card.get()
    }

    pub fn set_credit_card(&mut self, card: Option<CreditCard>) {
        self.credit_card.set(card);
    }

    pub fn credit_cards(&self) -> &[CreditCard] {
        self.credit_cards.items()
    }

    pub fn addresses(&self) -> &[Address] {
        self.addresses.items()
    }

    /// The stored card flagged as default, if any.
    pub fn default_credit_card(&self) -> Option<&CreditCard> {
        self.credit_cards.iter().find(|card| card.is_default())
    }
}
