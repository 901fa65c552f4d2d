//! Subscription model.
//!
//! A subscription bills a stored card against a plan. Cancelling is the
//! gateway's delete; afterwards the local instance is a tombstone.

use serde_json::Value;

use super::{AddOn, Discount, Plan, Transaction};
use crate::domain::foundation::{
    Action, AssociationDef, AssociationKind, AssociationSlot, AttributeSchema, BelongsTo, Errors,
    HasMany, Model, ModelError, ModelSchema, Persistence, Record, Resource, Rule,
};
use crate::domain::vault::CreditCard;
use crate::ports::GatewayClient;

const DURATION_UNITS: &[&str] = &["day", "month"];

/// Highest day-of-month billing may be pinned to before "last day" (31).
const LAST_REGULAR_BILLING_DAY: i64 = 28;
const END_OF_MONTH: i64 = 31;

pub static PLAN: AssociationDef = AssociationDef {
    name: "plan",
    kind: AssociationKind::Reference {
        foreign_key: "plan_id",
    },
    target: Resource::Plan,
};

pub static CREDIT_CARD: AssociationDef = AssociationDef {
    name: "credit_card",
    kind: AssociationKind::Reference {
        foreign_key: "payment_method_token",
    },
    target: Resource::CreditCard,
};

pub static SUBSCRIPTION_ADD_ONS: AssociationDef = AssociationDef {
    name: "add_ons",
    kind: AssociationKind::Collection { source: "add_ons" },
    target: Resource::AddOn,
};

pub static SUBSCRIPTION_DISCOUNTS: AssociationDef = AssociationDef {
    name: "discounts",
    kind: AssociationKind::Collection {
        source: "discounts",
    },
    target: Resource::Discount,
};

pub static TRANSACTIONS: AssociationDef = AssociationDef {
    name: "transactions",
    kind: AssociationKind::Collection {
        source: "transactions",
    },
    target: Resource::Transaction,
};

static SUBSCRIPTION_RULES: [Rule; 7] = [
    Rule::presence("plan_id"),
    Rule::presence("payment_method_token").on(Action::Create),
    Rule::numericality("price"),
    Rule::integer_at_least("number_of_billing_cycles", 1.0),
    Rule::integer_at_least("trial_duration", 1.0),
    Rule::inclusion("trial_duration_unit", DURATION_UNITS),
    Rule::max_length("id", 36),
];

pub static SUBSCRIPTION_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::Subscription,
    attributes: AttributeSchema {
        identity: "id",
        create: &[
            "billing_day_of_month",
            "descriptor",
            "first_billing_date",
            "id",
            "merchant_account_id",
            "never_expires",
            "number_of_billing_cycles",
            "options",
            "payment_method_token",
            "plan_id",
            "price",
            "trial_duration",
            "trial_duration_unit",
            "trial_period",
        ],
        update: &[
            "merchant_account_id",
            "never_expires",
            "number_of_billing_cycles",
            "options",
            "payment_method_token",
            "plan_id",
            "price",
        ],
        readonly: &[
            "balance",
            "billing_period_end_date",
            "billing_period_start_date",
            "created_at",
            "current_billing_cycle",
            "days_past_due",
            "failure_count",
            "next_billing_date",
            "next_billing_period_amount",
            "paid_through_date",
            "status",
            "updated_at",
        ],
        hidden: &["descriptor"],
    },
    associations: &[
        &PLAN,
        &CREDIT_CARD,
        &SUBSCRIPTION_ADD_ONS,
        &SUBSCRIPTION_DISCOUNTS,
        &TRANSACTIONS,
    ],
    rules: &SUBSCRIPTION_RULES,
    unsupported: &[],
};

/// Recurring billing of a stored card against a plan.
#[derive(Debug, Clone)]
pub struct Subscription {
    record: Record,
    plan: BelongsTo<Plan>,
    credit_card: BelongsTo<CreditCard>,
    add_ons: HasMany<AddOn>,
    discounts: HasMany<Discount>,
    transactions: HasMany<Transaction>,
}

impl Model for Subscription {
    fn schema() -> &'static ModelSchema {
        &SUBSCRIPTION_SCHEMA
    }

    fn from_record(record: Record) -> Self {
        Self {
            record,
            plan: BelongsTo::new(&PLAN),
            credit_card: BelongsTo::new(&CREDIT_CARD),
            add_ons: HasMany::new(&SUBSCRIPTION_ADD_ONS),
            discounts: HasMany::new(&SUBSCRIPTION_DISCOUNTS),
            transactions: HasMany::new(&TRANSACTIONS),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn slots(&self) -> Vec<&dyn AssociationSlot> {
        vec![
            &self.plan,
            &self.credit_card,
            &self.add_ons,
            &self.discounts,
            &self.transactions,
        ]
    }

    fn slots_mut(&mut self) -> Vec<&mut dyn AssociationSlot> {
        vec![
            &mut self.plan,
            &mut self.credit_card,
            &mut self.add_ons,
            &mut self.discounts,
            &mut self.transactions,
        ]
    }

    /// A blank price means "use the plan's price" and is never sent.
    fn normalize(&mut self) {
        if self.record.get_string("price").is_some_and(|p| p.trim().is_empty()) {
            self.record.remove("price");
        }
    }

    fn validate_extra(&self, _action: Action, errors: &mut Errors) {
        let Some(day) = self.record.get_string("billing_day_of_month") else {
            return;
        };
        match day.trim().parse::<i64>() {
            Ok(day) if (1..=LAST_REGULAR_BILLING_DAY).contains(&day) || day == END_OF_MONTH => {}
            Ok(_) => errors.add("billing_day_of_month", "is not included in the list"),
            Err(_) => errors.add("billing_day_of_month", "must be an integer"),
        }
    }
}

impl Subscription {
    /// Cancels the subscription. Same remote effect as `destroy`.
    pub async fn cancel(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError> {
        self.destroy(gateway).await
    }

    pub async fn cancel_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
        self.destroy_strict(gateway).await
    }

    /// Cancels subscription `id` without loading it.
    pub async fn cancel_by_id(gateway: &dyn GatewayClient, id: &str) -> Result<(), ModelError> {
        Self::delete(gateway, id).await
    }

    /// Sets the price override; blank input clears it.
    pub fn set_price(&mut self, price: impl Into<Value>) {
        self.set("price", price);
    }

    pub fn price(&self) -> Option<String> {
        self.record.get_string("price")
    }

    pub fn is_never_expires(&self) -> bool {
        self.record.get_bool("never_expires").unwrap_or(false)
    }

    pub fn status(&self) -> Option<&str> {
        self.record.get_str("status")
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.record.get_str("plan_id")
    }

    pub fn payment_method_token(&self) -> Option<&str> {
        self.record.get_str("payment_method_token")
    }

    pub fn add_ons(&self) -> &[AddOn] {
        self.add_ons.items()
    }

    pub fn discounts(&self) -> &[Discount] {
        self.discounts.items()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.transactions.items()
    }

    /// The plan named by `plan_id`, fetched once per distinct id.
    pub async fn plan(&mut self, gateway: &dyn GatewayClient) -> Result<Option<&Plan>, ModelError> {
        let key = self.record.get_str("plan_id");
        self.plan.load(gateway, key).await
    }

    /// The card named by `payment_method_token`, fetched once per distinct token.
    pub async fn credit_card(
        &mut self,
        gateway: &dyn GatewayClient,
    ) -> Result<Option<&CreditCard>, ModelError> {
        let key = self.record.get_str("payment_method_token");
        self.credit_card.load(gateway, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Attributes;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    fn new_subscription() -> Subscription {
        Subscription::new(attrs(json!({
            "plan_id": "basic",
            "payment_method_token": "tok_1"
        })))
    }

    #[test]
    fn blank_price_is_stored_as_absent() {
        let mut s = new_subscription();
        s.set_price("");
        assert!(s.price().is_none());
        assert!(s.get("price").is_none());
        assert!(!s.payload_for(Action::Create).contains_key("price"));

        s.set_price("12.50");
        assert_eq!(s.price(), Some("12.50".to_string()));

        let from_constructor = Subscription::new(attrs(json!({"plan_id": "basic", "price": "  "})));
        assert!(from_constructor.price().is_none());
    }

    #[test]
    fn never_expires_query() {
        let mut s = new_subscription();
        assert!(!s.is_never_expires());
        s.set("never_expires", true);
        assert!(s.is_never_expires());
    }

    #[test]
    fn descriptor_is_sent_but_hidden() {
        let s = Subscription::new(attrs(json!({
            "plan_id": "basic",
            "payment_method_token": "tok_1",
            "descriptor": {"name": "ACME*GOLD"}
        })));
        assert!(s.payload_for(Action::Create).contains_key("descriptor"));
        assert!(!s.attributes().contains_key("descriptor"));
    }

    #[test]
    fn required_fields() {
        let mut s = Subscription::new(Attributes::new());
        assert!(!s.valid());
        assert_eq!(s.errors().on("plan_id"), ["can't be blank"]);
        assert_eq!(s.errors().on("payment_method_token"), ["can't be blank"]);

        assert!(new_subscription().valid());
    }

    #[test]
    fn payment_method_token_only_required_on_create() {
        let mut stored = Subscription::from_response(attrs(json!({
            "id": "sub_1",
            "plan_id": "basic"
        })));
        assert!(stored.valid());
    }

    #[test]
    fn billing_day_of_month_range() {
        for (day, ok) in [(1, true), (28, true), (29, false), (31, true), (0, false)] {
            let mut s = new_subscription();
            s.set("billing_day_of_month", day);
            assert_eq!(s.valid(), ok, "day {}", day);
        }
    }

    #[test]
    fn numeric_fields() {
        let mut s = new_subscription();
        s.set("price", "abc");
        s.set("number_of_billing_cycles", 0);
        s.set("trial_duration_unit", "week");
        assert!(!s.valid());
        assert_eq!(s.errors().on("price"), ["is not a number"]);
        assert_eq!(
            s.errors().on("number_of_billing_cycles"),
            ["must be greater than or equal to 1"]
        );
        assert_eq!(s.errors().on("trial_duration_unit"), ["is not included in the list"]);
    }

    #[test]
    fn update_payload_is_restricted() {
        let s = Subscription::from_response(attrs(json!({
            "id": "sub_1",
            "plan_id": "basic",
            "trial_period": true,
            "status": "Active",
            "next_billing_date": "2024-02-01"
        })));
        let payload = s.payload_for(Action::Update);
        assert_eq!(payload.get("plan_id"), Some(&json!("basic")));
        assert!(!payload.contains_key("trial_period"));
        assert!(!payload.contains_key("status"));
        assert!(!payload.contains_key("id"));
    }

    #[test]
    fn plan_and_card_are_references() {
        let s = new_subscription();
        let payload = s.payload_for(Action::Create);
        assert_eq!(payload.get("plan_id"), Some(&json!("basic")));
        assert!(!payload.contains_key("plan"));
        assert!(!payload.contains_key("credit_card"));
    }
}
