//! Foundation module - the generic model framework.
//!
//! Contains the schema registries, the validation layer, the `Model` trait
//! and the lifecycle engine that every domain type builds on.

mod associations;
mod attributes;
mod errors;
mod model;
pub mod persistence;
mod resource;
mod validation;

pub use associations::{
    AssociationDef, AssociationKind, AssociationSlot, BelongsTo, HasMany, HasOne,
};
pub use attributes::{is_blank, value_as_string, AttributeSchema, Attributes, FieldRole, Record};
pub use errors::ModelError;
pub use model::{Model, ModelSchema};
pub use persistence::{Persistence, PersistScope};
pub use resource::{Action, Operation, Resource};
pub use validation::{run_rules, Check, Errors, Rule, BASE};
