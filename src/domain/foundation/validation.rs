//! Validation layer: declarative field rules and the accumulated error set.
//!
//! Rules run synchronously against a [`Record`] and collect every violation
//! rather than stopping at the first. Each model declares its rules as a
//! static slice; anything that does not fit a rule goes through
//! `Model::validate_extra`.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::attributes::{is_blank, value_as_string, Record};
use super::Action;

/// Key for errors that are not tied to a single field.
pub const BASE: &str = "base";

/// Field name to ordered list of human-readable messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Errors {
    entries: BTreeMap<String, Vec<String>>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.entries
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for `field`, empty when there are none.
    pub fn on(&self, field: &str) -> &[String] {
        self.entries.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| (field.as_str(), m.as_str())))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Folds an association's errors into this set under `association`.
    ///
    /// Only field-scoped errors propagate; the association's own `base`
    /// messages are dropped.
    pub fn merge_association(&mut self, association: &str, nested: &Errors) {
        for (field, message) in nested.iter() {
            if field == BASE {
                continue;
            }
            self.add(association, format!("{} {}", field, message));
        }
    }

    /// `"field message"` strings, `base` messages unprefixed.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .map(|(field, message)| {
                if field == BASE {
                    message.to_string()
                } else {
                    format!("{} {}", field, message)
                }
            })
            .collect()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

/// The check a [`Rule`] applies.
#[derive(Debug, Clone, Copy)]
pub enum Check {
    Presence,
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Format(&'static Lazy<Regex>),
    Inclusion(&'static [&'static str]),
    Exclusion(&'static [&'static str]),
    Numericality {
        only_integer: bool,
        greater_than: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
}

/// A single field-level rule, optionally limited to one action.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub field: &'static str,
    pub check: Check,
    pub on: Option<Action>,
}

impl Rule {
    pub const fn presence(field: &'static str) -> Self {
        Self::new(field, Check::Presence)
    }

    pub const fn max_length(field: &'static str, max: usize) -> Self {
        Self::new(
            field,
            Check::Length {
                min: None,
                max: Some(max),
            },
        )
    }

    pub const fn length(field: &'static str, min: usize, max: usize) -> Self {
        Self::new(
            field,
            Check::Length {
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub const fn format(field: &'static str, pattern: &'static Lazy<Regex>) -> Self {
        Self::new(field, Check::Format(pattern))
    }

    pub const fn inclusion(field: &'static str, values: &'static [&'static str]) -> Self {
        Self::new(field, Check::Inclusion(values))
    }

    pub const fn exclusion(field: &'static str, values: &'static [&'static str]) -> Self {
        Self::new(field, Check::Exclusion(values))
    }

    pub const fn numericality(field: &'static str) -> Self {
        Self::new(
            field,
            Check::Numericality {
                only_integer: false,
                greater_than: None,
                min: None,
                max: None,
            },
        )
    }

    pub const fn greater_than(field: &'static str, bound: f64) -> Self {
        Self::new(
            field,
            Check::Numericality {
                only_integer: false,
                greater_than: Some(bound),
                min: None,
                max: None,
            },
        )
    }

    pub const fn integer_within(field: &'static str, min: f64, max: f64) -> Self {
        Self::new(
            field,
            Check::Numericality {
                only_integer: true,
                greater_than: None,
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub const fn integer_at_least(field: &'static str, min: f64) -> Self {
        Self::new(
            field,
            Check::Numericality {
                only_integer: true,
                greater_than: None,
                min: Some(min),
                max: None,
            },
        )
    }

    /// Restricts the rule to one action.
    pub const fn on(self, action: Action) -> Self {
        Self {
            on: Some(action),
            ..self
        }
    }

    const fn new(field: &'static str, check: Check) -> Self {
        Self {
            field,
            check,
            on: None,
        }
    }

    fn applies_to(&self, action: Action) -> bool {
        self.on.map_or(true, |on| on == action)
    }

    /// Applies the rule, recording any violation.
    ///
    /// Non-presence checks skip blank values; blankness is the presence
    /// rule's concern.
    pub fn check(&self, record: &Record, action: Action, errors: &mut Errors) {
        if !self.applies_to(action) {
            return;
        }

        let value = record.get(self.field);
        if let Check::Presence = self.check {
            if is_blank(value) {
                errors.add(self.field, "can't be blank");
            }
            return;
        }

        if is_blank(value) {
            return;
        }
        let Some(text) = value.and_then(value_as_string) else {
            errors.add(self.field, "is invalid");
            return;
        };

        match self.check {
            Check::Presence => {}
            Check::Length { min, max } => {
                let len = text.chars().count();
                if let Some(max) = max.filter(|max| len > *max) {
                    errors.add(
                        self.field,
                        format!("is too long (maximum is {} characters)", max),
                    );
                }
                if let Some(min) = min.filter(|min| len < *min) {
                    errors.add(
                        self.field,
                        format!("is too short (minimum is {} characters)", min),
                    );
                }
            }
            Check::Format(pattern) => {
                if !pattern.is_match(&text) {
                    errors.add(self.field, "is invalid");
                }
            }
            Check::Inclusion(values) => {
                if !values.contains(&text.as_str()) {
                    errors.add(self.field, "is not included in the list");
                }
            }
            Check::Exclusion(values) => {
                if values.contains(&text.as_str()) {
                    errors.add(self.field, "is reserved");
                }
            }
            Check::Numericality {
                only_integer,
                greater_than,
                min,
                max,
            } => check_number(self.field, &text, only_integer, greater_than, min, max, errors),
        }
    }
}

fn check_number(
    field: &str,
    text: &str,
    only_integer: bool,
    greater_than: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    errors: &mut Errors,
) {
    let trimmed = text.trim();
    if only_integer && trimmed.parse::<i64>().is_err() {
        errors.add(field, "must be an integer");
        return;
    }
    let Ok(number) = trimmed.parse::<f64>() else {
        errors.add(field, "is not a number");
        return;
    };
    if !number.is_finite() {
        errors.add(field, "is not a number");
        return;
    }
    if let Some(bound) = greater_than.filter(|bound| number <= *bound) {
        errors.add(field, format!("must be greater than {}", bound));
    }
    if let Some(bound) = min.filter(|bound| number < *bound) {
        errors.add(field, format!("must be greater than or equal to {}", bound));
    }
    if let Some(bound) = max.filter(|bound| number > *bound) {
        errors.add(field, format!("must be less than or equal to {}", bound));
    }
}

/// Runs every rule and accumulates all violations into `errors`.
pub fn run_rules(rules: &[Rule], record: &Record, action: Action, errors: &mut Errors) {
    for rule in rules {
        rule.check(record, action, errors);
    }
}
