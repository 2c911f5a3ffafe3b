//! Condition evaluation for branching nodes.
//!
//! A condition is a single `{field, operator, value}` triple evaluated
//! against the run's variable map. The operator set is a closed enum with
//! explicit per-type coercion rules, and evaluation is fail-closed: an
//! unknown operator or a failed numeric coercion yields `false`, never an
//! error and never `true`.

use crate::context::VariableMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison operators supported by condition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Values compare equal.
    Equals,
    /// Values compare unequal.
    NotEquals,
    /// String rendering of the field contains the string rendering of the value.
    Contains,
    /// Numeric comparison, field > value.
    GreaterThan,
    /// Numeric comparison, field < value.
    LessThan,
    /// Any operator string the engine does not recognize. Always false.
    #[serde(other)]
    Unknown,
}

/// Evaluates a condition against the variable map.
///
/// A missing field behaves like a null value: numeric operators fail the
/// coercion and yield `false`; equality against null follows the usual
/// string-rendering rules.
#[must_use]
pub fn evaluate(
    field: &str,
    operator: ConditionOperator,
    value: &JsonValue,
    variables: &VariableMap,
) -> bool {
    let actual = variables.get_path(field).cloned().unwrap_or(JsonValue::Null);

    match operator {
        ConditionOperator::Equals => values_equal(&actual, value),
        ConditionOperator::NotEquals => !values_equal(&actual, value),
        ConditionOperator::Contains => render(&actual).contains(&render(value)),
        ConditionOperator::GreaterThan => match (as_number(&actual), as_number(value)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        ConditionOperator::LessThan => match (as_number(&actual), as_number(value)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        ConditionOperator::Unknown => false,
    }
}

/// Equality with numeric cross-coercion: `18` and `"18"` compare equal.
fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    if let (Some(a), Some(b)) = (as_number(a), as_number(b)) {
        return a == b;
    }
    render(a) == render(b)
}

/// Coerces a JSON value to f64. Numbers pass through; strings are parsed.
/// Everything else fails the coercion.
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Renders a JSON value for string comparison. Strings are unquoted,
/// everything else uses its JSON text form.
fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
