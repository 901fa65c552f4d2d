//! Integration tests for model lifecycles against the in-memory gateway.
//!
//! These tests verify the end-to-end flow:
//! 1. Models validate locally and never reach the gateway when invalid
//! 2. Whitelisted payloads (with embedded associations) are submitted
//! 3. Responses hydrate the model and its associations
//! 4. Gateway field errors are routed back onto the model and its associations
//!
//! Uses `InMemoryGateway` so no network access is needed.

use serde_json::{json, Value};

use paygate_models::adapters::InMemoryGateway;
use paygate_models::domain::billing::{Plan, Subscription, Transaction};
use paygate_models::domain::foundation::{
    Action, Attributes, Model, ModelError, Operation, Persistence, Resource,
};
use paygate_models::domain::vault::{Address, CreditCard, Customer};
use paygate_models::ports::{GatewayClient, GatewayError};

// =============================================================================
// Test Infrastructure
// =============================================================================

const VISA: &str = "4111111111111111";

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

fn card_attrs() -> Value {
    json!({"number": VISA, "cvv": "123", "expiration_date": "05/2030"})
}

/// Stores a customer with one default card and returns it as found.
async fn stored_customer(gateway: &InMemoryGateway) -> Customer {
    let mut customer = Customer::new(attrs(json!({
        "first_name": "Jane",
        "last_name": "Doe",
        "credit_card": card_attrs()
    })));
    assert!(customer.create(gateway).await.unwrap());
    let id = customer.id().unwrap().to_string();
    Customer::find(gateway, &id).await.unwrap()
}

fn seed_plan(gateway: &InMemoryGateway) -> String {
    gateway.seed(
        Resource::Plan,
        attrs(json!({
            "id": "basic",
            "name": "Basic",
            "price": "10.00",
            "billing_frequency": 1,
            "add_ons": [{"id": "extra", "name": "Extra seat", "amount": "2.00"}],
            "discounts": []
        })),
    )
}

async fn authorized_transaction(gateway: &InMemoryGateway) -> Transaction {
    let mut txn = Transaction::new(attrs(json!({
        "amount": "10.00",
        "credit_card": card_attrs()
    })));
    assert!(txn.create(gateway).await.unwrap());
    txn
}

// =============================================================================
// Customers and cards
// =============================================================================

#[tokio::test]
async fn customer_created_with_embedded_card() {
    let gateway = InMemoryGateway::new();
    let mut customer = Customer::new(attrs(json!({
        "first_name": "Jane",
        "credit_card": card_attrs()
    })));

    assert!(customer.create(&gateway).await.unwrap());
    assert!(customer.is_persisted());
    assert!(customer.errors().is_empty());

    let payload = gateway.last_payload("create").unwrap();
    assert_eq!(payload["credit_card"]["number"], json!(VISA));

    assert_eq!(customer.credit_cards().len(), 1);
    let card = customer.default_credit_card().unwrap();
    assert!(card.is_persisted());
    assert_eq!(card.last_4(), Some("1111"));
    assert!(!card.has_sensitive_data());
    assert!(customer.credit_card().is_none());
}

#[tokio::test]
async fn created_customer_can_be_updated() {
    let gateway = InMemoryGateway::new();
    let mut customer = Customer::new(attrs(json!({
        "first_name": "Jane",
        "credit_card": card_attrs()
    })));
    assert!(customer.create(&gateway).await.unwrap());

    customer.set("first_name", "Janet");
    assert!(customer.save(&gateway).await.unwrap());

    assert_eq!(gateway.call_count("update"), 1);
    let payload = gateway.last_payload("update").unwrap();
    assert!(!payload.contains_key("credit_card"));
    assert!(!payload.contains_key("id"));

    let id = customer.id().unwrap();
    let stored = gateway.stored(Resource::Customer, id).unwrap();
    assert_eq!(stored["first_name"], json!("Janet"));
}

#[tokio::test]
async fn local_failure_makes_no_gateway_call_and_is_repeatable() {
    let gateway = InMemoryGateway::new();
    let mut customer = Customer::new(attrs(json!({"first_name": "Jane"})));
    customer.set("id", "new");

    assert!(!customer.save(&gateway).await.unwrap());
    let first = customer.errors().clone();
    assert_eq!(first.on("id"), ["is reserved"]);

    assert!(!customer.save(&gateway).await.unwrap());
    assert_eq!(customer.errors(), &first);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn strict_create_raises_record_invalid() {
    let gateway = InMemoryGateway::new();
    let mut customer = Customer::new(attrs(json!({"email": "x".repeat(256)})));

    let err = customer.create_strict(&gateway).await.unwrap_err();
    match err {
        ModelError::RecordInvalid(errors) => {
            assert_eq!(errors.on("email"), ["is too long (maximum is 255 characters)"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!gateway.was_called("create"));
}

#[tokio::test]
async fn remote_card_errors_route_into_embedded_card() {
    let gateway = InMemoryGateway::new();
    let mut customer = Customer::new(attrs(json!({
        "first_name": "Jane",
        "credit_card": {"number": "4111111111111112", "cvv": "123", "expiration_date": "05/2030"}
    })));

    assert!(!customer.create(&gateway).await.unwrap());
    assert!(!customer.is_persisted());
    assert_eq!(
        customer.errors().on("credit_card"),
        ["number Credit card number is invalid."]
    );
    assert_eq!(customer.get("first_name"), Some(&json!("Jane")));

    let card = customer.credit_card().unwrap();
    assert_eq!(card.errors().on("number"), ["Credit card number is invalid."]);
    assert!(!card.has_sensitive_data());
}

#[tokio::test]
async fn standalone_card_without_customer_is_rejected_remotely() {
    let gateway = InMemoryGateway::new();
    let mut card = CreditCard::new(attrs(card_attrs()));

    assert!(card.valid());
    assert!(!card.create(&gateway).await.unwrap());
    assert_eq!(card.errors().on("customer_id"), ["Customer ID is required."]);
    assert!(!card.has_sensitive_data());
    assert!(card.get("number").is_none());
}

#[tokio::test]
async fn card_added_to_existing_customer() {
    let gateway = InMemoryGateway::new();
    let customer = stored_customer(&gateway).await;
    let customer_id = customer.id().unwrap();

    let mut card = CreditCard::new(attrs(json!({
        "customer_id": customer_id,
        "number": "5555555555554444",
        "expiration_month": "12",
        "expiration_year": "2031",
        "billing_address": {"street_address": "1 Main St", "postal_code": "60606"},
        "options": {"make_default": true}
    })));
    assert!(card.create(&gateway).await.unwrap());
    assert!(card.is_default());
    assert_eq!(card.card_type(), Some("MasterCard"));
    assert_eq!(card.expiration_date().as_deref(), Some("12/2031"));
    assert!(card.billing_address().is_some_and(Address::is_persisted));

    let reloaded = Customer::find(&gateway, customer_id).await.unwrap();
    assert_eq!(reloaded.credit_cards().len(), 2);
    assert_eq!(reloaded.addresses().len(), 1);
    assert_eq!(
        reloaded.default_credit_card().and_then(CreditCard::token),
        card.token()
    );
}

#[tokio::test]
async fn destroyed_customer_is_a_tombstone() {
    let gateway = InMemoryGateway::new();
    let mut customer = stored_customer(&gateway).await;
    let id = customer.id().unwrap().to_string();

    assert!(customer.destroy(&gateway).await.unwrap());
    assert!(customer.is_destroyed());

    let err = customer.save(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotSupported { .. }));

    let err = Customer::find(&gateway, &id).await.unwrap_err();
    assert!(matches!(err, ModelError::NotFound { .. }));
    assert!(CreditCard::all(&gateway).await.unwrap().is_empty());
}

// =============================================================================
// Addresses
// =============================================================================

#[tokio::test]
async fn address_country_is_normalized_before_submission() {
    let gateway = InMemoryGateway::new();
    let customer = stored_customer(&gateway).await;

    let mut address = Address::new(attrs(json!({
        "customer_id": customer.id().unwrap(),
        "street_address": "1 Main St",
        "postal_code": "60606",
        "country_name": "United States of America"
    })));
    assert_eq!(address.country_code_alpha2(), Some("US"));
    assert!(address.create(&gateway).await.unwrap());

    let payload = gateway.last_payload("create").unwrap();
    assert_eq!(payload["country_code_alpha2"], json!("US"));
    let stored = gateway
        .stored(Resource::Address, address.id().unwrap())
        .unwrap();
    assert_eq!(stored["customer_id"], json!(customer.id().unwrap()));
}

#[tokio::test]
async fn address_with_street_only_fails_on_postal_code() {
    let gateway = InMemoryGateway::new();
    let mut address = Address::new(attrs(json!({"street_address": "1 Main St"})));

    assert!(!address.create(&gateway).await.unwrap());
    let fields: Vec<&str> = address.errors().fields().collect();
    assert_eq!(fields, ["postal_code"]);
    assert!(gateway.calls().is_empty());
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn transaction_defaults_to_sale() {
    let gateway = InMemoryGateway::new();
    let txn = authorized_transaction(&gateway).await;

    assert_eq!(txn.transaction_type(), "sale");
    assert_eq!(txn.status(), Some("authorized"));
    let payload = gateway.last_payload("create").unwrap();
    assert_eq!(payload["type"], json!("sale"));

    let card = txn.credit_card().unwrap();
    assert_eq!(card.bin(), Some("411111"));
    assert!(!card.has_sensitive_data());
}

#[tokio::test]
async fn transaction_uses_default_card_of_persisted_customer() {
    let gateway = InMemoryGateway::new();
    let customer = stored_customer(&gateway).await;
    let token = customer
        .default_credit_card()
        .and_then(CreditCard::token)
        .unwrap()
        .to_string();

    let mut txn = Transaction::new(attrs(json!({"amount": "25.00"})));
    txn.set_customer(Some(customer.clone()));
    assert!(txn.create(&gateway).await.unwrap());

    let payload = gateway.last_payload("create").unwrap();
    assert_eq!(payload["payment_method_token"], json!(token));
    assert_eq!(payload["customer_id"], json!(customer.id().unwrap()));
    assert!(!payload.contains_key("customer"));
    assert_eq!(txn.credit_card().and_then(CreditCard::token), Some(token.as_str()));
}

#[tokio::test]
async fn transaction_without_payment_method_fails_locally() {
    let gateway = InMemoryGateway::new();
    let mut txn = Transaction::new(attrs(json!({"amount": "10.00"})));

    assert!(!txn.create(&gateway).await.unwrap());
    assert_eq!(txn.errors().on("base"), ["Cannot determine payment method"]);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn remote_errors_echo_submitted_values() {
    let gateway = InMemoryGateway::new();
    let mut txn = Transaction::new(attrs(json!({
        "amount": "10.00",
        "payment_method_token": "missing",
        "order_id": "order-1"
    })));

    assert!(!txn.create(&gateway).await.unwrap());
    assert_eq!(
        txn.errors().on("payment_method_token"),
        ["Payment method token is invalid."]
    );
    assert_eq!(txn.get("order_id"), Some(&json!("order-1")));
    assert!(!txn.is_persisted());
}

#[tokio::test]
async fn delete_on_transaction_is_not_supported() {
    let gateway = InMemoryGateway::new();

    let err = Transaction::delete(&gateway, "abc").await.unwrap_err();
    assert!(matches!(
        err,
        ModelError::NotSupported {
            resource: Resource::Transaction,
            operation: Operation::Delete
        }
    ));

    let mut txn = authorized_transaction(&gateway).await;
    gateway.clear_calls();
    let err = txn.destroy(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotSupported { .. }));
    let err = txn.update(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotSupported { .. }));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn settlement_refund_and_void() {
    let gateway = InMemoryGateway::new();
    let mut txn = authorized_transaction(&gateway).await;
    let id = txn.id().unwrap().to_string();

    assert!(txn.submit_for_settlement(&gateway, Some("7.50")).await.unwrap());
    assert_eq!(txn.status(), Some("submitted_for_settlement"));
    assert_eq!(txn.amount().as_deref(), Some("7.50"));

    assert!(!txn.refund(&gateway, None).await.unwrap());
    assert_eq!(
        txn.errors().on("base"),
        ["Cannot refund transaction unless it is settled."]
    );

    gateway.settle_transaction(&id).unwrap();
    assert!(txn.refund(&gateway, None).await.unwrap());
    assert!(txn.errors().is_empty());
    let refund_ids = txn.refund_ids();
    assert_eq!(refund_ids.len(), 1);

    let refund = Transaction::find(&gateway, &refund_ids[0]).await.unwrap();
    assert_eq!(refund.transaction_type(), "credit");
    assert_eq!(refund.refunded_transaction_id(), Some(id.as_str()));
    assert_eq!(refund.amount().as_deref(), Some("7.50"));

    let err = txn.void_strict(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::RecordInvalid(_)));
}

#[tokio::test]
async fn void_authorized_transaction() {
    let gateway = InMemoryGateway::new();
    let mut txn = authorized_transaction(&gateway).await;

    txn.void_strict(&gateway).await.unwrap();
    assert_eq!(txn.status(), Some("voided"));
}

#[tokio::test]
async fn actions_require_a_persisted_transaction() {
    let gateway = InMemoryGateway::new();
    let mut txn = Transaction::new(attrs(json!({"amount": "10.00"})));

    let err = txn.void(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotPersisted { .. }));
    let err = txn.refund(&gateway, Some("1.00")).await.unwrap_err();
    assert!(matches!(err, ModelError::NotPersisted { .. }));
    assert!(gateway.calls().is_empty());
}

// =============================================================================
// Subscriptions
// =============================================================================

async fn subscribed(gateway: &InMemoryGateway) -> Subscription {
    seed_plan(gateway);
    let customer = stored_customer(gateway).await;
    let token = customer
        .default_credit_card()
        .and_then(CreditCard::token)
        .unwrap()
        .to_string();

    let mut subscription = Subscription::new(attrs(json!({
        "plan_id": "basic",
        "payment_method_token": token,
        "price": ""
    })));
    assert!(subscription.create(gateway).await.unwrap());
    subscription
}

#[tokio::test]
async fn subscription_bills_plan_price() {
    let gateway = InMemoryGateway::new();
    let subscription = subscribed(&gateway).await;

    let payload = gateway.last_payload("create").unwrap();
    assert!(!payload.contains_key("price"));

    assert_eq!(subscription.status(), Some("Active"));
    assert_eq!(subscription.price().as_deref(), Some("10.00"));
    assert_eq!(subscription.add_ons().len(), 1);
    assert_eq!(subscription.add_ons()[0].name(), Some("Extra seat"));
    assert_eq!(subscription.transactions().len(), 1);
    assert_eq!(
        subscription.transactions()[0].subscription_id(),
        subscription.id()
    );
}

#[tokio::test]
async fn subscription_references_load_once() {
    let gateway = InMemoryGateway::new();
    let mut subscription = subscribed(&gateway).await;
    gateway.clear_calls();

    let plan: Option<&Plan> = subscription.plan(&gateway).await.unwrap();
    assert_eq!(plan.and_then(Plan::name), Some("Basic"));
    subscription.plan(&gateway).await.unwrap();
    assert_eq!(gateway.call_count("find"), 1);

    let card = subscription.credit_card(&gateway).await.unwrap().unwrap();
    assert_eq!(card.last_4(), Some("1111"));
    assert_eq!(gateway.call_count("find"), 2);
}

#[tokio::test]
async fn changed_plan_id_triggers_one_new_lookup() {
    let gateway = InMemoryGateway::new();
    let mut subscription = subscribed(&gateway).await;
    gateway.seed(
        Resource::Plan,
        attrs(json!({"id": "pro", "name": "Pro", "price": "25.00"})),
    );
    gateway.clear_calls();

    subscription.plan(&gateway).await.unwrap();
    assert_eq!(gateway.call_count("find"), 1);

    subscription.set("plan_id", "pro");
    let plan = subscription.plan(&gateway).await.unwrap();
    assert_eq!(plan.and_then(Plan::name), Some("Pro"));
    subscription.plan(&gateway).await.unwrap();
    assert_eq!(gateway.call_count("find"), 2);

    subscription.set("plan_id", "  ");
    assert!(subscription.plan(&gateway).await.unwrap().is_none());
    assert_eq!(gateway.call_count("find"), 2);
}

#[tokio::test]
async fn blank_id_cancel_makes_no_call() {
    let gateway = InMemoryGateway::new();

    let err = Subscription::cancel_by_id(&gateway, "  ").await.unwrap_err();
    assert!(matches!(err, ModelError::NotFound { .. }));
    assert!(!gateway.was_called("delete"));
}

#[tokio::test]
async fn cancel_matches_destroy() {
    let gateway = InMemoryGateway::new();
    let mut first = subscribed(&gateway).await;
    let first_id = first.id().unwrap().to_string();
    assert!(first.cancel(&gateway).await.unwrap());
    assert!(first.is_destroyed());

    let mut second = Subscription::new(attrs(json!({
        "plan_id": "basic",
        "payment_method_token": first.payment_method_token().unwrap()
    })));
    assert!(second.create(&gateway).await.unwrap());
    let second_id = second.id().unwrap().to_string();
    assert!(second.destroy(&gateway).await.unwrap());

    for id in [&first_id, &second_id] {
        let stored = gateway.stored(Resource::Subscription, id).unwrap();
        assert_eq!(stored["status"], json!("Canceled"));
    }

    let err = first.cancel(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotSupported { .. }));
}

#[tokio::test]
async fn canceled_subscription_rejects_updates() {
    let gateway = InMemoryGateway::new();
    let subscription = subscribed(&gateway).await;
    let id = subscription.id().unwrap().to_string();
    Subscription::cancel_by_id(&gateway, &id).await.unwrap();

    let mut reloaded = Subscription::find(&gateway, &id).await.unwrap();
    assert_eq!(reloaded.status(), Some("Canceled"));
    reloaded.set_price("12.00");
    assert!(!reloaded.update(&gateway).await.unwrap());
    assert_eq!(
        reloaded.errors().on("base"),
        ["Cannot edit a canceled subscription."]
    );

    let err = reloaded.update_strict(&gateway).await.unwrap_err();
    assert!(err.errors().is_some_and(|errors| !errors.is_empty()));
}

// =============================================================================
// Lookups and transport failures
// =============================================================================

#[tokio::test]
async fn find_with_blank_or_unknown_id_is_not_found() {
    let gateway = InMemoryGateway::new();

    let err = Customer::find(&gateway, "  ").await.unwrap_err();
    assert!(matches!(err, ModelError::NotFound { .. }));
    assert!(gateway.calls().is_empty());

    let err = Customer::find(&gateway, "nobody").await.unwrap_err();
    assert!(matches!(err, ModelError::NotFound { .. }));
}

#[tokio::test]
async fn plans_are_read_only() {
    let gateway = InMemoryGateway::new();
    seed_plan(&gateway);

    let plans = Plan::all(&gateway).await.unwrap();
    assert_eq!(plans.len(), 1);
    let mut plan = plans.into_iter().next().unwrap();
    assert_eq!(plan.price().as_deref(), Some("10.00"));
    assert!(plan.payload_for(Action::Create).is_empty());

    gateway.clear_calls();
    let err = plan.save(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotSupported { .. }));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn transport_failures_are_raised_not_swallowed() {
    let gateway = InMemoryGateway::new();
    gateway.set_method_error(
        "create",
        GatewayError::Authentication("invalid credentials".to_string()),
    );

    let mut customer = Customer::new(attrs(json!({"first_name": "Jane"})));
    let err = customer.create(&gateway).await.unwrap_err();
    assert!(matches!(
        err,
        ModelError::Gateway(GatewayError::Authentication(_))
    ));
    assert!(!customer.is_persisted());

    gateway.clear_errors();
    assert!(customer.create(&gateway).await.unwrap());
}

#[tokio::test]
async fn gateway_is_usable_as_trait_object() {
    let gateway = InMemoryGateway::new();
    let client: &dyn GatewayClient = &gateway;

    let mut customer = Customer::new(attrs(json!({"first_name": "Jane"})));
    assert!(customer.create(client).await.unwrap());
    assert_eq!(Customer::all(client).await.unwrap().len(), 1);
}

#[tokio::test]
async fn caller_chosen_id_counts_as_persisted() {
    let gateway = InMemoryGateway::new();
    let attributes = attrs(json!({"id": "cust_chosen", "first_name": "Jane"}));

    let mut saved = Customer::new(attributes.clone());
    assert!(saved.is_persisted());
    let err = saved.save(&gateway).await.unwrap_err();
    assert!(matches!(err, ModelError::NotFound { .. }));
    assert_eq!(gateway.call_count("update"), 1);
    assert!(!gateway.was_called("create"));

    let mut created = Customer::new(attributes);
    assert!(created.create(&gateway).await.unwrap());
    assert_eq!(created.id(), Some("cust_chosen"));
    assert_eq!(
        gateway.last_payload("create").unwrap()["id"],
        json!("cust_chosen")
    );
}
