//! Extraction of the categorization JSON from model replies
//!
//! Vision models wrap their JSON in prose no matter how firmly the prompt
//! asks them not to, so the extractor takes the span from the first `{` to
//! the last `}` and validates it against the expected schema:
//!
//! ```text
//! {"items": {"<Category>": [{"description": str, "amount": num}]},
//!  "totals": {"<Category>": num}}
//! ```
//!
//! Items are lenient: anything that does not coerce to a non-negative
//! decimal amount becomes zero, and a description that is not a string is
//! stringified or replaced. Everything else about the shape is strict.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ExtractionError;
use crate::models::{CategorizationResult, Category, LineItem};

/// Largest tolerated gap between a reported total and the item sum (0.005)
const TOTALS_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Amounts beyond this (1e12) are treated as garbage; keeps sums far from overflow
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Description used when the model leaves one out
const UNKNOWN_DESCRIPTION: &str = "Unknown item";

/// Item as the model wrote it; both fields are coerced separately
#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    description: Value,
    #[serde(default)]
    amount: Value,
}

type RawItems = BTreeMap<String, Vec<RawItem>>;
type RawTotals = BTreeMap<String, Value>;

/// Parse a model reply into a validated categorization
pub fn extract_categorization(
    raw: Option<&str>,
) -> Result<CategorizationResult, ExtractionError> {
    let raw = match raw.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => return Err(ExtractionError::EmptyResponse),
    };

    let json_str = locate_json(raw).ok_or(ExtractionError::NoJsonFound)?;
    let document: Value = serde_json::from_str(json_str)
        .map_err(|e| ExtractionError::SyntaxError(e.to_string()))?;

    let object = document
        .as_object()
        .ok_or_else(|| ExtractionError::InvalidShape("top level is not an object".into()))?;
    let raw_items = object
        .get("items")
        .ok_or(ExtractionError::MissingField("items"))?;
    let raw_totals = object
        .get("totals")
        .ok_or(ExtractionError::MissingField("totals"))?;

    let raw_items: RawItems = serde_json::from_value(raw_items.clone()).map_err(|e| {
        ExtractionError::InvalidShape(format!(
            "`items` must map categories to lists of items: {}",
            e
        ))
    })?;
    let raw_totals: RawTotals = serde_json::from_value(raw_totals.clone()).map_err(|e| {
        ExtractionError::InvalidShape(format!("`totals` must map categories to numbers: {}", e))
    })?;

    let items = normalize_items(raw_items);
    let reported = normalize_totals(raw_totals)?;
    let totals = check_totals(&items, &reported)?;

    Ok(CategorizationResult { items, totals })
}

/// Slice from the first `{` to the last `}`, inclusive
fn locate_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn normalize_items(raw: RawItems) -> BTreeMap<Category, Vec<LineItem>> {
    let mut items: BTreeMap<Category, Vec<LineItem>> = BTreeMap::new();
    for (label, entries) in raw {
        let category = Category::from_label(&label);
        let bucket = items.entry(category).or_default();
        for entry in entries {
            let description = coerce_description(&entry.description);
            let amount = match coerce_amount(&entry.amount) {
                Some(amount) => amount,
                None => {
                    warn!(
                        description = %description,
                        raw_amount = %entry.amount,
                        "Unusable item amount from model, defaulting to 0"
                    );
                    Decimal::ZERO
                }
            };
            bucket.push(LineItem {
                description,
                amount,
                category,
            });
        }
    }
    items
}

fn normalize_totals(raw: RawTotals) -> Result<BTreeMap<Category, Decimal>, ExtractionError> {
    let mut totals: BTreeMap<Category, Decimal> = BTreeMap::new();
    for (label, value) in raw {
        let amount = number_to_decimal(&value).ok_or_else(|| {
            ExtractionError::InvalidShape(format!("total for {:?} is not a number", label))
        })?;
        *totals.entry(Category::from_label(&label)).or_default() += amount;
    }
    Ok(totals)
}

/// Compare reported totals with item sums and return the computed sums
fn check_totals(
    items: &BTreeMap<Category, Vec<LineItem>>,
    reported: &BTreeMap<Category, Decimal>,
) -> Result<BTreeMap<Category, Decimal>, ExtractionError> {
    let computed: BTreeMap<Category, Decimal> = items
        .iter()
        .map(|(category, list)| (*category, list.iter().map(|i| i.amount).sum()))
        .collect();

    let categories = computed.keys().chain(reported.keys());
    for category in categories {
        let c = computed.get(category).copied().unwrap_or_default();
        let r = reported.get(category).copied().unwrap_or_default();
        if (c - r).abs() > TOTALS_TOLERANCE {
            return Err(ExtractionError::InconsistentTotals {
                category: category.display_name().to_string(),
                reported: r,
                computed: c,
            });
        }
    }

    Ok(computed)
}

/// Strings are trimmed, scalars are stringified, anything else is unknown
fn coerce_description(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    };
    if text.is_empty() {
        UNKNOWN_DESCRIPTION.to_string()
    } else {
        text
    }
}

/// Lenient amount coercion: numbers, or strings like "$1,234.50"
fn coerce_amount(value: &Value) -> Option<Decimal> {
    let amount = match value {
        Value::Number(_) => number_to_decimal(value)?,
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches(&['$', '€', '£'][..])
                .chars()
                .filter(|c| *c != ',')
                .collect();
            parse_decimal(cleaned.trim())?
        }
        _ => return None,
    };
    (amount >= Decimal::ZERO).then(|| amount.normalize())
}

/// Strict: only JSON numbers
fn number_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
        .filter(|d| d.abs() <= MAX_AMOUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_empty_and_absent_responses() {
        assert_eq!(
            extract_categorization(Some("")),
            Err(ExtractionError::EmptyResponse)
        );
        assert_eq!(
            extract_categorization(None),
            Err(ExtractionError::EmptyResponse)
        );
        assert_eq!(
            extract_categorization(Some("   \n\t")),
            Err(ExtractionError::EmptyResponse)
        );
    }

    #[test]
    fn test_ignores_surrounding_prose() {
        let raw = r#"Thanks! {"items":{"Produce":[{"description":"Banana","amount":1.5}]},"totals":{"Produce":1.5}} Have a nice day"#;
        let result = extract_categorization(Some(raw)).unwrap();
        assert_eq!(result.totals.len(), 1);
        assert_eq!(result.totals[&Category::Produce], dec("1.5"));
        assert_eq!(result.items[&Category::Produce][0].description, "Banana");
    }

    #[test]
    fn test_no_json_found() {
        assert_eq!(
            extract_categorization(Some("not json at all")),
            Err(ExtractionError::NoJsonFound)
        );
        assert_eq!(
            extract_categorization(Some("} backwards {")),
            Err(ExtractionError::NoJsonFound)
        );
    }

    #[test]
    fn test_syntax_error_carries_parser_message() {
        let err = extract_categorization(Some(r#"{"items": {"Dairy": [}"#)).unwrap_err();
        match err {
            ExtractionError::SyntaxError(msg) => assert!(!msg.is_empty()),
            other => panic!("expected SyntaxError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            extract_categorization(Some(r#"{"totals": {}}"#)),
            Err(ExtractionError::MissingField("items"))
        );
        assert_eq!(
            extract_categorization(Some(r#"{"items": {}}"#)),
            Err(ExtractionError::MissingField("totals"))
        );
    }

    #[test]
    fn test_wrong_shapes_are_rejected() {
        let err = extract_categorization(Some(r#"{"items": [1, 2], "totals": {}}"#)).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidShape(_)));

        let err = extract_categorization(Some(
            r#"{"items": {}, "totals": {"Dairy": "lots"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidShape(_)));
    }

    #[test]
    fn test_non_numeric_amount_defaults_to_zero() {
        let raw = r#"{
            "items": {
                "Snacks": [
                    {"description": "Chips", "amount": "N/A"},
                    {"description": "Pretzels", "amount": 2.25}
                ],
                "Dairy": [{"description": "Milk", "amount": 3.5}]
            },
            "totals": {"Snacks": 2.25, "Dairy": 3.5}
        }"#;
        let result = extract_categorization(Some(raw)).unwrap();
        let snacks = &result.items[&Category::Snacks];
        assert_eq!(snacks.len(), 2);
        assert_eq!(snacks[0].description, "Chips");
        assert_eq!(snacks[0].amount, Decimal::ZERO);
        assert_eq!(snacks[1].amount, dec("2.25"));
        assert_eq!(result.totals[&Category::Dairy], dec("3.5"));
    }

    #[test]
    fn test_negative_and_missing_amounts_default_to_zero() {
        let raw = r#"{
            "items": {"Other": [
                {"description": "Coupon", "amount": -1.00},
                {"description": "Bag"}
            ]},
            "totals": {"Other": 0}
        }"#;
        let result = extract_categorization(Some(raw)).unwrap();
        assert!(result.line_items().all(|i| i.amount == Decimal::ZERO));
    }

    #[test]
    fn test_string_amounts_with_currency_symbols() {
        let raw = r#"{
            "items": {"Household Supplies": [{"description": "Vacuum", "amount": "$1,049.99"}]},
            "totals": {"Household Supplies": 1049.99}
        }"#;
        let result = extract_categorization(Some(raw)).unwrap();
        assert_eq!(result.totals[&Category::HouseholdSupplies], dec("1049.99"));
    }

    #[test]
    fn test_unknown_categories_fold_into_other() {
        let raw = r#"{
            "items": {
                "Electronics": [{"description": "Cable", "amount": 5}],
                "Other": [{"description": "Dog food", "amount": 10}]
            },
            "totals": {"Electronics": 5, "Other": 10}
        }"#;
        let result = extract_categorization(Some(raw)).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[&Category::Other].len(), 2);
        assert!(result.line_items().all(|i| i.category == Category::Other));
        assert_eq!(result.totals[&Category::Other], dec("15"));
    }

    #[test]
    fn test_inconsistent_totals_rejected() {
        let raw = r#"{
            "items": {"Bakery": [{"description": "Bread", "amount": 3.00}]},
            "totals": {"Bakery": 4.00}
        }"#;
        let err = extract_categorization(Some(raw)).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::InconsistentTotals { ref category, .. } if category == "Bakery"
        ));
    }

    #[test]
    fn test_total_without_items_rejected() {
        let raw = r#"{"items": {}, "totals": {"Beverages": 2.5}}"#;
        let err = extract_categorization(Some(raw)).unwrap_err();
        assert_eq!(err.code(), "inconsistent_totals");
    }

    #[test]
    fn test_float_noise_in_totals_is_tolerated() {
        let raw = r#"{
            "items": {"Produce": [
                {"description": "Apple", "amount": 0.1},
                {"description": "Pear", "amount": 0.2}
            ]},
            "totals": {"Produce": 0.30000000000000004}
        }"#;
        let result = extract_categorization(Some(raw)).unwrap();
        assert_eq!(result.totals[&Category::Produce], dec("0.3"));
    }

    #[test]
    fn test_totals_equal_item_sums() {
        let raw = r#"```json
        {
            "items": {
                "Produce": [{"description": "Kale", "amount": 2.49}, {"description": "Lime", "amount": 0.33}],
                "Meat & Seafood": [{"description": "Salmon", "amount": 12.99}],
                "Beverages": [{"description": "Tea", "amount": "4.10"}]
            },
            "totals": {"Produce": 2.82, "Meat & Seafood": 12.99, "Beverages": 4.10}
        }
        ```"#;
        let result = extract_categorization(Some(raw)).unwrap();
        let item_sum: Decimal = result.line_items().map(|i| i.amount).sum();
        assert_eq!(item_sum, result.grand_total());
        assert_eq!(result.item_count(), 4);
    }

    #[test]
    fn test_blank_description_gets_placeholder() {
        let raw = r#"{"items": {"Dairy": [{"description": "  ", "amount": 1}]}, "totals": {"Dairy": 1}}"#;
        let result = extract_categorization(Some(raw)).unwrap();
        assert_eq!(result.items[&Category::Dairy][0].description, UNKNOWN_DESCRIPTION);
    }

    #[test]
    fn test_non_string_descriptions_are_coerced() {
        let raw = r#"{"items": {"Snacks": [
            {"description": 123, "amount": 1},
            {"description": null, "amount": 2},
            {"description": ["Chips"], "amount": 3}
        ]}, "totals": {"Snacks": 6}}"#;
        let result = extract_categorization(Some(raw)).unwrap();
        let snacks = &result.items[&Category::Snacks];
        assert_eq!(snacks[0].description, "123");
        assert_eq!(snacks[1].description, UNKNOWN_DESCRIPTION);
        assert_eq!(snacks[2].description, UNKNOWN_DESCRIPTION);
        assert_eq!(result.totals[&Category::Snacks], dec("6"));
    }

    #[test]
    fn test_amount_and_tolerance_limits() {
        assert_eq!(MAX_AMOUNT, dec("1000000000000"));
        assert_eq!(TOTALS_TOLERANCE, dec("0.005"));

        assert_eq!(coerce_amount(&serde_json::json!(1_000_000_000_000u64)), Some(MAX_AMOUNT));
        assert_eq!(coerce_amount(&serde_json::json!("1000000000000.01")), None);

        let within = r#"{"items": {"Dairy": [{"description": "Milk", "amount": 3.50}]}, "totals": {"Dairy": 3.504}}"#;
        assert!(extract_categorization(Some(within)).is_ok());
        let beyond = r#"{"items": {"Dairy": [{"description": "Milk", "amount": 3.50}]}, "totals": {"Dairy": 3.506}}"#;
        assert_eq!(
            extract_categorization(Some(beyond)).unwrap_err().code(),
            "inconsistent_totals"
        );
    }
}
