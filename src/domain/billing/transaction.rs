//! Transaction model.
//!
//! Transactions are create-only: once submitted they change state through
//! the dedicated settlement, refund and void actions, never through update.
//!
//! # Payment method resolution
//!
//! The outbound payload names a payment method in this order:
//!
//! 1. an explicit `credit_card` (its token when stored, full card data when new)
//! 2. an explicit `payment_method_token`
//! 3. the default card of the attached customer

use serde_json::Value;

use super::{AddOn, Discount, Subscription};
use crate::domain::foundation::persistence::{apply_outcome, conclude, ensure_supported, strict};
use crate::domain::foundation::{
    Action, AssociationDef, AssociationKind, AssociationSlot, AttributeSchema, Attributes,
    BelongsTo, Errors, HasMany, HasOne, Model, ModelError, ModelSchema, Operation, PersistScope,
    Record, Resource, Rule, BASE,
};
use crate::domain::vault::{Address, CreditCard, Customer};
use crate::ports::GatewayClient;

/// Type assumed when none is given.
pub const DEFAULT_TYPE: &str = "sale";

const TRANSACTION_TYPES: &[&str] = &["sale", "credit"];

pub static CUSTOMER: AssociationDef = AssociationDef {
    name: "customer",
    kind: AssociationKind::Embedded {
        source: "customer_details",
        reference_key: Some("customer_id"),
    },
    target: Resource::Customer,
};

pub static CREDIT_CARD: AssociationDef = AssociationDef {
    name: "credit_card",
    kind: AssociationKind::Embedded {
        source: "credit_card_details",
        reference_key: Some("payment_method_token"),
    },
    target: Resource::CreditCard,
};

pub static SUBSCRIPTION: AssociationDef = AssociationDef {
    name: "subscription",
    kind: AssociationKind::Reference {
        foreign_key: "subscription_id",
    },
    target: Resource::Subscription,
};

pub static BILLING: AssociationDef = AssociationDef {
    name: "billing",
    kind: AssociationKind::Embedded {
        source: "billing_details",
        reference_key: Some("billing_address_id"),
    },
    target: Resource::Address,
};

pub static SHIPPING: AssociationDef = AssociationDef {
    name: "shipping",
    kind: AssociationKind::Embedded {
        source: "shipping_details",
        reference_key: Some("shipping_address_id"),
    },
    target: Resource::Address,
};

pub static TRANSACTION_ADD_ONS: AssociationDef = AssociationDef {
    name: "add_ons",
    kind: AssociationKind::Collection { source: "add_ons" },
    target: Resource::AddOn,
};

pub static TRANSACTION_DISCOUNTS: AssociationDef = AssociationDef {
    name: "discounts",
    kind: AssociationKind::Collection {
        source: "discounts",
    },
    target: Resource::Discount,
};

static TRANSACTION_RULES: [Rule; 5] = [
    Rule::presence("amount"),
    Rule::greater_than("amount", 0.0),
    Rule::inclusion("type", TRANSACTION_TYPES),
    Rule::numericality("tax_amount"),
    Rule::max_length("order_id", 255),
];

pub static TRANSACTION_SCHEMA: ModelSchema = ModelSchema {
    resource: Resource::Transaction,
    attributes: AttributeSchema {
        identity: "id",
        create: &[
            "amount",
            "billing",
            "channel",
            "custom_fields",
            "customer_id",
            "descriptor",
            "merchant_account_id",
            "options",
            "order_id",
            "payment_method_token",
            "purchase_order_number",
            "recurring",
            "shipping",
            "tax_amount",
            "tax_exempt",
            "type",
            "venmo_sdk_payment_method_code",
        ],
        update: &[],
        readonly: &[
            "avs_error_response_code",
            "avs_postal_code_response_code",
            "avs_street_address_response_code",
            "billing_details",
            "created_at",
            "credit_card_details",
            "currency_iso_code",
            "customer_details",
            "cvv_response_code",
            "id",
            "plan_id",
            "refund_ids",
            "refunded_transaction_id",
            "settlement_batch_id",
            "shipping_details",
            "status",
            "status_history",
            "subscription_details",
            "subscription_id",
            "updated_at",
        ],
        hidden: &[
            "billing_details",
            "credit_card_details",
            "customer_details",
            "descriptor",
            "shipping_details",
            "status_history",
            "subscription_details",
        ],
    },
    associations: &[
        &CUSTOMER,
        &CREDIT_CARD,
        &SUBSCRIPTION,
        &BILLING,
        &SHIPPING,
        &TRANSACTION_ADD_ONS,
        &TRANSACTION_DISCOUNTS,
    ],
    rules: &TRANSACTION_RULES,
    unsupported: &[Operation::Update, Operation::Destroy, Operation::Delete],
};

/// State-changing actions on a stored transaction.
#[derive(Debug, Clone, Copy)]
enum TransactionAction<'a> {
    SubmitForSettlement(Option<&'a str>),
    Refund(Option<&'a str>),
    Void,
}

impl TransactionAction<'_> {
    fn operation(&self) -> Operation {
        match self {
            TransactionAction::SubmitForSettlement(_) => Operation::SubmitForSettlement,
            TransactionAction::Refund(_) => Operation::Refund,
            TransactionAction::Void => Operation::Void,
        }
    }
}

/// A sale or credit against a payment method.
#[derive(Debug, Clone)]
pub struct Transaction {
    record: Record,
    customer: HasOne<Customer>,
    credit_card: HasOne<CreditCard>,
    subscription: BelongsTo<Subscription>,
    billing: HasOne<Address>,
    shipping: HasOne<Address>,
    add_ons: HasMany<AddOn>,
    discounts: HasMany<Discount>,
}

impl Model for Transaction {
    fn schema() -> &'static ModelSchema {
        &TRANSACTION_SCHEMA
    }

    fn from_record(record: Record) -> Self {
        Self {
            record,
            customer: HasOne::new(&CUSTOMER),
            credit_card: HasOne::new(&CREDIT_CARD),
            subscription: BelongsTo::new(&SUBSCRIPTION),
            billing: HasOne::new(&BILLING),
            shipping: HasOne::new(&SHIPPING),
            add_ons: HasMany::new(&TRANSACTION_ADD_ONS),
            discounts: HasMany::new(&TRANSACTION_DISCOUNTS),
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
            &self.customer,
            &self.credit_card,
            &self.subscription,
            &self.billing,
            &self.shipping,
            &self.add_ons,
            &self.discounts,
        ]
    }

    fn slots_mut(&mut self) -> Vec<&mut dyn AssociationSlot> {
        vec![
            &mut self.customer,
            &mut self.credit_card,
            &mut self.subscription,
            &mut self.billing,
            &mut self.shipping,
            &mut self.add_ons,
            &mut self.discounts,
        ]
    }

    fn normalize(&mut self) {
        if self.record.get_str("type").is_none() {
            self.record.set("type", DEFAULT_TYPE);
        }
    }

    fn validate_extra(&self, action: Action, errors: &mut Errors) {
        if action == Action::Create && !self.has_payment_method() {
            errors.add(BASE, "Cannot determine payment method");
        }
    }

    fn customize_payload(&self, _action: Action, payload: &mut Attributes) {
        if self.credit_card.is_present() || payload.contains_key("payment_method_token") {
            return;
        }
        if let Some(token) = self.default_card_token() {
            payload.insert(
                "payment_method_token".to_string(),
                Value::String(token.to_string()),
            );
        }
    }
}

impl Transaction {
    /// Whether a payment method can be resolved for submission.
    pub fn has_payment_method(&self) -> bool {
        self.credit_card.is_present()
            || self.record.contains("payment_method_token")
            || self.record.contains("venmo_sdk_payment_method_code")
            || self.record.contains("customer_id")
            || self.customer.get().is_some_and(Customer::is_persisted)
    }

    fn default_card_token(&self) -> Option<&str> {
        self.customer
            .get()
            .and_then(Customer::default_credit_card)
            .and_then(CreditCard::token)
    }

    async fn perform(
        &mut self,
        gateway: &dyn GatewayClient,
        action: TransactionAction<'_>,
    ) -> Result<(), ModelError> {
        let operation = action.operation();
        ensure_supported::<Self>(operation)?;
        let id = self
            .id()
            .map(str::to_string)
            .ok_or(ModelError::NotPersisted {
                resource: Resource::Transaction,
            })?;

        tracing::debug!(transaction_id = %id, operation = %operation, "Performing transaction action");

        let mut scope = PersistScope::enter(self, operation);
        let outcome = match action {
            TransactionAction::SubmitForSettlement(amount) => {
                gateway.submit_for_settlement(&id, amount).await
            }
            TransactionAction::Refund(amount) => gateway.refund(&id, amount).await,
            TransactionAction::Void => gateway.void(&id).await,
        };
        apply_outcome(&mut *scope, operation, outcome)
    }

    /// Submits an authorized transaction for settlement, optionally for less
    /// than the authorized amount.
    pub async fn submit_for_settlement(
        &mut self,
        gateway: &dyn GatewayClient,
        amount: Option<&str>,
    ) -> Result<bool, ModelError> {
        conclude(
            self.perform(gateway, TransactionAction::SubmitForSettlement(amount))
                .await,
        )
    }

    pub async fn submit_for_settlement_strict(
        &mut self,
        gateway: &dyn GatewayClient,
        amount: Option<&str>,
    ) -> Result<(), ModelError> {
        strict(
            self.perform(gateway, TransactionAction::SubmitForSettlement(amount))
                .await,
        )
    }

    /// Refunds a settled transaction, in full or partially.
    pub async fn refund(
        &mut self,
        gateway: &dyn GatewayClient,
        amount: Option<&str>,
    ) -> Result<bool, ModelError> {
        conclude(self.perform(gateway, TransactionAction::Refund(amount)).await)
    }

    pub async fn refund_strict(
        &mut self,
        gateway: &dyn GatewayClient,
        amount: Option<&str>,
    ) -> Result<(), ModelError> {
        strict(self.perform(gateway, TransactionAction::Refund(amount)).await)
    }

    /// Voids an authorized or submitted transaction.
    pub async fn void(&mut self, gateway: &dyn GatewayClient) -> Result<bool, ModelError> {
        conclude(self.perform(gateway, TransactionAction::Void).await)
    }

    pub async fn void_strict(&mut self, gateway: &dyn GatewayClient) -> Result<(), ModelError> {
        strict(self.perform(gateway, TransactionAction::Void).await)
    }

    pub fn amount(&self) -> Option<String> {
        self.record.get_string("amount")
    }

    /// `sale` or `credit`.
    pub fn transaction_type(&self) -> &str {
        self.record.get_str("type").unwrap_or(DEFAULT_TYPE)
    }

    pub fn status(&self) -> Option<&str> {
        self.record.get_str("status")
    }

    pub fn refund_ids(&self) -> Vec<String> {
        match self.record.get("refund_ids") {
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn refunded_transaction_id(&self) -> Option<&str> {
        self.record.get_str("refunded_transaction_id")
    }

    pub fn customer(&self) -> Option<&Customer> {
        self.customer.get()
    }

    pub fn set_customer(&mut self, customer: Option<Customer>) {
        self.customer.set(customer);
    }

    pub fn credit_card(&self) -> Option<&CreditCard> {
        self.credit_card.get()
    }

    pub fn set_credit_card(&mut self, card: Option<CreditCard>) {
        self.credit_card.set(card);
    }

    pub fn billing(&self) -> Option<&Address> {
        self.billing.get()
    }

    pub fn set_billing(&mut self, address: Option<Address>) {
        self.billing.set(address);
    }

    pub fn shipping(&self) -> Option<&Address> {
        self.shipping.get()
    }

    pub fn set_shipping(&mut self, address: Option<Address>) {
        self.shipping.set(address);
    }

    pub fn add_ons(&self) -> &[AddOn] {
        self.add_ons.items()
    }

    pub fn discounts(&self) -> &[Discount] {
        self.discounts.items()
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.record.get_str("subscription_id")
    }

    /// The subscription that billed this transaction, fetched on first use.
    pub async fn subscription(
        &mut self,
        gateway: &dyn GatewayClient,
    ) -> Result<Option<&Subscription>, ModelError> {
        let key = self.record.get_str("subscription_id");
        self.subscription.load(gateway, key).await
    }
}
