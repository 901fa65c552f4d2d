//! Resource, action and operation vocabulary shared by models and the gateway port.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote resource kinds exposed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Address,
    CreditCard,
    Customer,
    Transaction,
    Subscription,
    Plan,
    AddOn,
    Discount,
}

impl Resource {
    /// Every resource kind, in declaration order.
    pub const ALL: [Resource; 8] = [
        Resource::Address,
        Resource::CreditCard,
        Resource::Customer,
        Resource::Transaction,
        Resource::Subscription,
        Resource::Plan,
        Resource::AddOn,
        Resource::Discount,
    ];

    /// Snake-case name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Address => "address",
            Resource::CreditCard => "credit_card",
            Resource::Customer => "customer",
            Resource::Transaction => "transaction",
            Resource::Subscription => "subscription",
            Resource::Plan => "plan",
            Resource::AddOn => "add_on",
            Resource::Discount => "discount",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Submission action selecting which attribute whitelist applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Initial submission. Also used when a new object is embedded in a parent.
    Create,

    /// Modification of a persisted object.
    Update,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
        }
    }
}

/// Lifecycle operations a model type may declare unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Destroy,
    /// Type-level delete by id.
    Delete,
    Find,
    All,
    SubmitForSettlement,
    Refund,
    Void,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Destroy => "destroy",
            Operation::Delete => "delete",
            Operation::Find => "find",
            Operation::All => "all",
            Operation::SubmitForSettlement => "submit_for_settlement",
            Operation::Refund => "refund",
            Operation::Void => "void",
        }
    }
}

impl From<Action> for Operation {
    fn from(action: Action) -> Self {
        match action {
            Action::Create => Operation::Create,
            Action::Update => Operation::Update,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
