//! Add-ons and discounts.
//!
//! Both are gateway-managed price modifications attached to plans and
//! subscriptions. They share one shape and differ only in resource kind, so
//! a single generic type carries both.

use std::fmt;
use std::marker::PhantomData;

use crate::domain::foundation::{AttributeSchema, Model, ModelSchema, Operation, Record, Resource};

const MODIFICATION_FIELDS: &[&str] = &[
    "amount",
    "created_at",
    "current_billing_cycle",
    "description",
    "id",
    "kind",
    "merchant_id",
    "name",
    "never_expires",
    "number_of_billing_cycles",
    "quantity",
    "updated_at",
];

const READ_ONLY: &[Operation] = &[
    Operation::Create,
    Operation::Update,
    Operation::Destroy,
    Operation::Delete,
];

pub static ADD_ON_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::AddOn,
    attributes: AttributeSchema {
        identity: "id",
        create: &[],
        update: &[],
        readonly: MODIFICATION_FIELDS,
        hidden: &[],
    },
    associations: &[],
    rules: &[],
    unsupported: READ_ONLY,
};

pub static DISCOUNT_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::Discount,
    attributes: AttributeSchema {
        identity: "id",
        create: &[],
        update: &[],
        readonly: MODIFICATION_FIELDS,
        hidden: &[],
    },
    associations: &[],
    rules: &[],
    unsupported: READ_ONLY,
};

/// Selects the resource a [`Modification`] stands for.
pub trait ModificationKind: fmt::Debug + Clone + Send + Sync + 'static {
    fn schema() -> &'static ModelSchema;
}

#[derive(Debug, Clone)]
pub struct AddOnKind;

impl ModificationKind for AddOnKind {
    fn schema() -> &'static ModelSchema {
        &ADD_ON_SCHEMA
    }
}

#[derive(Debug, Clone)]
pub struct DiscountKind;

impl ModificationKind for DiscountKind {
    fn schema() -> &'static ModelSchema {
        &DISCOUNT_SCHEMA
    }
}

/// A read-only price modification.
#[derive(Debug, Clone)]
pub struct Modification<K> {
    record: Record,
    kind: PhantomData<K>,
}

pub type AddOn = Modification<AddOnKind>;
pub type Discount = Modification<DiscountKind>;

impl<K: ModificationKind> Model for Modification<K> {
    fn schema() -> &'static ModelSchema {
        K::schema()
    }

    fn from_record(record: Record) -> Self {
        Self {
            record,
            kind: PhantomData,
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl<K: ModificationKind> Modification<K> {
    pub fn name(&self) -> Option<&str> {
        self.record.get_str("name")
    }

    /// Decimal amount as the gateway reports it.
    pub fn amount(&self) -> Option<String> {
        self.record.get_string("amount")
    }

    pub fn quantity(&self) -> Option<u64> {
        self.record.get("quantity").and_then(|v| v.as_u64())
    }

    pub fn is_never_expires(&self) -> bool {
        self.record.get_bool("never_expires").unwrap_or(false)
    }
}
