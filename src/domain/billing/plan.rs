//! Plan model. Plans are configured in the gateway and only read here.

use super::{AddOn, Discount};
use crate::domain::foundation::{
    AssociationDef, AssociationKind, AssociationSlot, AttributeSchema, HasMany, Model, ModelSchema,
    Operation, Record, Resource,
};

pub static PLAN_ADD_ONS: AssociationDef = AssociationDef {
    name: "add_ons",
    kind: AssociationKind::Collection { source: "add_ons" },
    target: Resource::AddOn,
};

pub static PLAN_DISCOUNTS: AssociationDef = AssociationDef {
    name: "discounts",
    kind: AssociationKind::Collection {
        source: "discounts",
    },
    target: Resource::Discount,
};

pub static PLAN_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::Plan,
    attributes: AttributeSchema {
        identity: "id",
        create: &[],
        update: &[],
        readonly: &[
            "billing_day_of_month",
            "billing_frequency",
            "created_at",
            "currency_iso_code",
            "description",
            "id",
            "merchant_id",
            "name",
            "number_of_billing_cycles",
            "price",
            "trial_duration",
            "trial_duration_unit",
            "trial_period",
            "updated_at",
        ],
        hidden: &[],
    },
    associations: &[&PLAN_ADD_ONS, &PLAN_DISCOUNTS],
    rules: &[],
    unsupported: &[
        Operation::Create,
        Operation::Update,
        Operation::Destroy,
        Operation::Delete,
    ],
};

/// A billing plan subscriptions are created against.
#[derive(Debug, Clone)]
pub struct Plan {
    record: Record,
    add_ons: HasMany<AddOn>,
    discounts: HasMany<Discount>,
}

impl Model for Plan {
    fn schema() -> &'static ModelSchema {
        &PLAN_SCHEMA
    }

    fn from_record(record: Record) -> Self {
        Self {
            record,
            add_ons: HasMany::new(&PLAN_ADD_ONS),
            discounts: HasMany::new(&PLAN_DISCOUNTS),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn slots(&self) -> Vec<&dyn AssociationSlot> {
        vec![&self.add_ons, &self.discounts]
    }

    fn slots_mut(&mut self) -> Vec<&mut dyn AssociationSlot> {
        vec![&mut self.add_ons, &mut self.discounts]
    }
}

impl Plan {
    pub fn name(&self) -> Option<&str> {
        self.record.get_str("name")
    }

    pub fn price(&self) -> Option<String> {
        self.record.get_string("price")
    }

    /// Billing frequency in months.
    pub fn billing_frequency(&self) -> Option<u64> {
        self.record.get("billing_frequency").and_then(|v| v.as_u64())
    }

    pub fn add_ons(&self) -> &[AddOn] {
        self.add_ons.items()
    }

    pub fn discounts(&self) -> &[Discount] {
        self.discounts.items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hydrates_modifications_in_order() {
        let plan = Plan::from_response(
            json!({
                "id": "basic",
                "name": "Basic",
                "price": "9.99",
                "billing_frequency": 1,
                "add_ons": [{"id": "seat"}, {"id": "storage"}],
                "discounts": [{"id": "promo"}]
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        assert!(plan.is_persisted());
        let ids: Vec<_> = plan.add_ons().iter().filter_map(|a| a.id()).collect();
        assert_eq!(ids, vec!["seat", "storage"]);
        assert_eq!(plan.discounts().len(), 1);
        assert_eq!(plan.billing_frequency(), Some(1));
    }

    #[test]
    fn plans_are_read_only() {
        assert!(!PLAN_SCHEMA.supports(Operation::Create));
        assert!(!PLAN_SCHEMA.supports(Operation::Delete));
        assert!(PLAN_SCHEMA.supports(Operation::Find));
    }
}
