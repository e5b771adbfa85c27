//! Field-level task edits
//!
//! Edits arrive from the outside as `{field, value}` pairs and are mapped onto
//! the closed `TaskEdit` enum; anything unrecognised is dropped.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::domain::Store;

/// A single field change on an existing task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEdit {
    /// Raw product string, re-parsed on apply
    Product(String),
    Store(Option<Store>),
    Size(String),
    Profile(Option<String>),
    Schedule(Option<DateTime<Utc>>),
    Account(Option<String>),
    Category(Option<String>),
    Variation(Option<String>),
    CheckoutDelay(u64),
}

impl TaskEdit {
    /// Map a wire `{field, value}` pair to an edit
    ///
    /// Returns None for unknown fields or values of the wrong shape.
    pub fn parse(field: &str, value: &Value) -> Option<Self> {
        debug!(%field, %value, "TaskEdit::parse: called");
        let edit = match field {
            "product" => Self::Product(value.as_str()?.to_string()),
            "store" => Self::Store(opt_typed(value)?),
            "size" => Self::Size(value.as_str().unwrap_or_default().to_string()),
            "profile" => Self::Profile(opt_string(value)?),
            "schedule" => Self::Schedule(opt_typed(value)?),
            "account" => Self::Account(opt_string(value)?),
            "category" => Self::Category(opt_string(value)?),
            "variation" => Self::Variation(opt_string(value)?),
            "checkout-delay" => Self::CheckoutDelay(parse_delay(value)),
            _ => {
                debug!(%field, "TaskEdit::parse: unknown field");
                return None;
            }
        };
        Some(edit)
    }
}

/// Edit applied to many tasks at once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkEdit {
    /// Point every task at a new product link
    ProductUrl(String),
    /// Set the storefront password on every task's store
    StorePassword(String),
}

fn opt_string(value: &Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) if s.is_empty() => Some(None),
        Value::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

fn opt_typed<T: serde::de::DeserializeOwned>(value: &Value) -> Option<Option<T>> {
    if value.is_null() {
        return Some(None);
    }
    serde_json::from_value(value.clone()).ok().map(Some)
}

/// Integer-ish value; anything unparseable counts as 0
fn parse_delay(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) if s.trim().is_empty() => 0,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_fields() {
        assert_eq!(
            TaskEdit::parse("product", &json!("+red")),
            Some(TaskEdit::Product("+red".into()))
        );
        assert_eq!(
            TaskEdit::parse("profile", &json!(null)),
            Some(TaskEdit::Profile(None))
        );
        assert_eq!(
            TaskEdit::parse("store", &json!({"name": "Kith", "url": "https://kith.com"})),
            Some(TaskEdit::Store(Some(Store::new("Kith", "https://kith.com"))))
        );
    }

    #[test]
    fn test_parse_schedule() {
        let edit = TaskEdit::parse("schedule", &json!("2026-10-18T12:00:00Z")).unwrap();
        match edit {
            TaskEdit::Schedule(Some(at)) => assert_eq!(at.to_rfc3339(), "2026-10-18T12:00:00+00:00"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(TaskEdit::parse("schedule", &json!("tomorrow")), None);
    }

    #[test]
    fn test_parse_checkout_delay_falls_back_to_zero() {
        assert_eq!(
            TaskEdit::parse("checkout-delay", &json!("1500")),
            Some(TaskEdit::CheckoutDelay(1500))
        );
        assert_eq!(
            TaskEdit::parse("checkout-delay", &json!("abc")),
            Some(TaskEdit::CheckoutDelay(0))
        );
        assert_eq!(TaskEdit::parse("checkout-delay", &json!("")), Some(TaskEdit::CheckoutDelay(0)));
    }

    #[test]
    fn test_parse_unknown_field() {
        assert_eq!(TaskEdit::parse("color", &json!("red")), None);
        assert_eq!(TaskEdit::parse("product", &json!(42)), None);
    }
}
