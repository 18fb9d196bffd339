//! Field normalization: raw extractor output → canonical [`Entry`].
//!
//! Extractor output is untrusted, so nothing here fails. Unknown keys are
//! ignored, malformed values degrade to `None` (name, price), `false`
//! (income), [`Category::Others`] (category), or `0.0` (confidence).
//!
//! # Accepted keys
//!
//! Keys are matched case-insensitively after trimming. For each field the
//! aliases are tried in the order listed and the first non-null value wins:
//!
//! | field | aliases |
//! |---|---|
//! | name | `name`, `item`, `title` |
//! | category | `category`, `type` |
//! | price | `price`, `cost`, `amount`, `total` |
//! | income flag | `isIncome`, `is_income`, `income` |
//!
//! Confidences come from a nested object under `confidence`, `confidences`
//! or `confidence_scores` (keyed by the same aliases), falling back to flat
//! `<alias>_confidence` keys.

use serde_json::{Map, Value};
use tracing::debug;

use crate::entry::{Category, Confidences, Entry, Field};

pub const NAME_ALIASES: &[&str] = &["name", "item", "title"];
pub const CATEGORY_ALIASES: &[&str] = &["category", "type"];
pub const PRICE_ALIASES: &[&str] = &["price", "cost", "amount", "total"];
pub const INCOME_ALIASES: &[&str] = &["isincome", "is_income", "income"];
pub const CONFIDENCE_ALIASES: &[&str] = &["confidence", "confidences", "confidence_scores"];

/// Currency markers removed before parsing a price string. `rs.` precedes
/// `rs` so that "Rs.120" does not leave a stray decimal point.
const CURRENCY_MARKERS: &[&str] = &["rupees", "rupee", "rs.", "rs", "inr", "₹", "$", "/-"];

/// Normalize a JSON value. Anything other than an object yields [`Entry::unknown`].
pub fn normalize_value(raw: &Value) -> Entry {
    match raw {
        Value::Object(map) => normalize(map),
        _ => Entry::unknown(),
    }
}

/// Normalize a raw key-value map into an [`Entry`].
pub fn normalize(raw: &Map<String, Value>) -> Entry {
    let name = lookup(raw, NAME_ALIASES).and_then(coerce_name);
    let category = lookup(raw, CATEGORY_ALIASES)
        .and_then(value_as_text)
        .map(|s| coerce_category(&s))
        .unwrap_or(Category::Others);
    let price = lookup(raw, PRICE_ALIASES).and_then(coerce_price_value);
    let is_income = lookup(raw, INCOME_ALIASES)
        .map(coerce_bool)
        .unwrap_or(false);

    Entry {
        name,
        category,
        price,
        is_income,
        confidences: read_confidences(raw),
    }
}

/// Map free-text category onto the fixed enum.
///
/// Trimmed and capitalized ("food" → "Food"); anything outside the four
/// values becomes [`Category::Others`].
pub fn coerce_category(raw: &str) -> Category {
    parse_category(raw).unwrap_or_else(|| {
        debug!(raw, "unrecognised category, filing under Others");
        Category::Others
    })
}

/// Like [`coerce_category`] but `None` when the text names no known category.
pub fn parse_category(raw: &str) -> Option<Category> {
    Category::from_canonical(&capitalize(raw.trim()))
}

/// Parse a price string, stripping currency markers and thousands separators.
pub fn coerce_price(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_lowercase();
    for marker in CURRENCY_MARKERS {
        s = s.replace(marker, "");
    }
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn coerce_price_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => coerce_price(s),
        _ => None,
    }
}

fn coerce_name(v: &Value) -> Option<String> {
    value_as_text(v)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn coerce_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "income"
        ),
        _ => false,
    }
}

fn coerce_confidence(v: &Value) -> Option<f32> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    // "85" or "85%" means a percentage.
    let x = if x > 1.0 && x <= 100.0 { x / 100.0 } else { x };
    Some(x as f32)
}

fn read_confidences(raw: &Map<String, Value>) -> Confidences {
    let nested = lookup(raw, CONFIDENCE_ALIASES).and_then(Value::as_object);
    let mut out = Confidences::default();
    for field in Field::ORDER {
        let aliases = aliases_for(field);
        let from_nested = nested.and_then(|m| lookup(m, aliases)).and_then(coerce_confidence);
        let value = from_nested.or_else(|| {
            aliases.iter().find_map(|alias| {
                let flat = format!("{alias}_confidence");
                lookup(raw, &[flat.as_str()]).and_then(coerce_confidence)
            })
        });
        out.set(field, value.unwrap_or(0.0));
    }
    out
}

fn aliases_for(field: Field) -> &'static [&'static str] {
    match field {
        Field::Name => NAME_ALIASES,
        Field::Category => CATEGORY_ALIASES,
        Field::Price => PRICE_ALIASES,
    }
}

/// First non-null value whose key matches one of `aliases`, in alias order.
fn lookup<'a>(raw: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        raw.iter()
            .find(|(k, v)| !v.is_null() && k.trim().eq_ignore_ascii_case(alias))
            .map(|(_, v)| v)
    })
}

fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(v: Value) -> Entry {
        normalize_value(&v)
    }

    #[test]
    fn canonical_keys() {
        let e = norm(json!({
            "Name": "Lunch",
            "category": "Food",
            "price": 120,
            "confidence": {"name": 0.9, "category": 0.8, "price": 0.95}
        }));
        assert_eq!(e.name.as_deref(), Some("Lunch"));
        assert_eq!(e.category, Category::Food);
        assert_eq!(e.price, Some(120.0));
        assert!(!e.is_income);
        assert!((e.confidences.category - 0.8).abs() < 1e-6);
    }

    #[test]
    fn alias_keys_are_case_insensitive() {
        let e = norm(json!({"ITEM": "Uber ride", "Type": "travel", "Cost": "150rs"}));
        assert_eq!(e.name.as_deref(), Some("Uber ride"));
        assert_eq!(e.category, Category::Travel);
        assert_eq!(e.price, Some(150.0));
    }

    #[test]
    fn alias_priority_is_fixed() {
        // `name` outranks `title` regardless of map order.
        let e = norm(json!({"title": "second", "name": "first"}));
        assert_eq!(e.name.as_deref(), Some("first"));
    }

    #[test]
    fn null_alias_falls_through() {
        let e = norm(json!({"price": null, "amount": "42"}));
        assert_eq!(e.price, Some(42.0));
    }

    #[test]
    fn price_strips_currency_and_separators() {
        assert_eq!(coerce_price("₹1,200.50"), Some(1200.5));
        assert_eq!(coerce_price("$ 15"), Some(15.0));
        assert_eq!(coerce_price("Rs.120"), Some(120.0));
        assert_eq!(coerce_price("250 RS"), Some(250.0));
        assert_eq!(coerce_price("500/-"), Some(500.0));
        assert_eq!(coerce_price("fifty"), None);
        assert_eq!(coerce_price(""), None);
    }

    #[test]
    fn unparseable_price_is_null_not_error() {
        let e = norm(json!({"name": "Tea", "price": "a lot"}));
        assert_eq!(e.price, None);
        let e = norm(json!({"name": "Tea", "price": true}));
        assert_eq!(e.price, None);
    }

    #[test]
    fn unknown_category_becomes_others() {
        let e = norm(json!({"name": "Chips", "category": "snacks"}));
        assert_eq!(e.category, Category::Others);
    }

    #[test]
    fn missing_category_becomes_others() {
        let e = norm(json!({"name": "Chips"}));
        assert_eq!(e.category, Category::Others);
        let e = norm(json!({"name": "Chips", "category": null}));
        assert_eq!(e.category, Category::Others);
    }

    #[test]
    fn category_is_capitalized() {
        assert_eq!(coerce_category("  ENTERTAINMENT "), Category::Entertainment);
        assert_eq!(coerce_category("food"), Category::Food);
        assert_eq!(parse_category("groceries"), None);
    }

    #[test]
    fn income_flag_variants() {
        assert!(norm(json!({"isIncome": true})).is_income);
        assert!(norm(json!({"is_income": "yes"})).is_income);
        assert!(norm(json!({"income": 1})).is_income);
        assert!(!norm(json!({"isIncome": "no"})).is_income);
        assert!(!norm(json!({})).is_income);
    }

    #[test]
    fn flat_confidence_keys() {
        let e = norm(json!({
            "name": "Salary",
            "name_confidence": "0.8",
            "price_confidence": 0.9,
            "type_confidence": 0.4
        }));
        assert!((e.confidences.name - 0.8).abs() < 1e-6);
        assert!((e.confidences.category - 0.4).abs() < 1e-6);
        assert!((e.confidences.price - 0.9).abs() < 1e-6);
    }

    #[test]
    fn percentage_confidences_are_scaled() {
        let e = norm(json!({"confidence": {"name": 85, "category": "70%", "price": 1.0}}));
        assert!((e.confidences.name - 0.85).abs() < 1e-6);
        assert!((e.confidences.category - 0.70).abs() < 1e-6);
        assert!((e.confidences.price - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_confidence_is_zero() {
        let e = norm(json!({"name": "Tea", "price": 10}));
        assert_eq!(e.confidences, Confidences::default());
    }

    #[test]
    fn non_object_input_degrades() {
        assert_eq!(norm(json!([1, 2, 3])), Entry::unknown());
        assert_eq!(norm(json!("Lunch 120")), Entry::unknown());
    }

    #[test]
    fn empty_name_is_null() {
        let e = norm(json!({"name": "   "}));
        assert_eq!(e.name, None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = json!({
            "Title": "Movie ticket",
            "category": "entertainment",
            "amount": "₹200",
            "confidence": {"item": 0.6, "type": 0.7, "cost": 0.3}
        });
        assert_eq!(normalize_value(&raw), normalize_value(&raw));
    }
}
