//! Filter parsing
//!
//! Parses a JSON filter expression and validates it: size, nesting depth,
//! condition count, attribute keys and operator/value compatibility.
//! Enum and timestamp values are normalized here so evaluation only
//! compares plain JSON scalars.

use serde_json::Value as JsonValue;

use super::types::{Condition, FilterError, FilterExpr, FilterField, FilterOp};
use crate::data::types::{CANONICAL_PREFIX, SpanKind, StatusCode};
use crate::utils::time::parse_wire_timestamp;

/// Maximum size of filter JSON in bytes (64KB)
pub const MAX_FILTER_JSON_SIZE: usize = 64 * 1024;

/// Maximum group nesting
pub const MAX_FILTER_DEPTH: usize = 8;

/// Maximum number of conditions across the whole expression
pub const MAX_CONDITIONS: usize = 50;

pub fn parse_filter_str(json_str: &str) -> Result<FilterExpr, FilterError> {
    if json_str.len() > MAX_FILTER_JSON_SIZE {
        return Err(too_large());
    }
    let value: JsonValue = serde_json::from_str(json_str)
        .map_err(|e| FilterError::new("INVALID_FILTER_JSON", e.to_string()))?;
    parse_filter(&value)
}

pub fn parse_filter(value: &JsonValue) -> Result<FilterExpr, FilterError> {
    if value.to_string().len() > MAX_FILTER_JSON_SIZE {
        return Err(too_large());
    }
    let mut expr: FilterExpr = serde_json::from_value(value.clone())
        .map_err(|e| FilterError::new("INVALID_FILTER_JSON", e.to_string()))?;

    let mut conditions = 0;
    validate(&mut expr, 0, &mut conditions)?;
    Ok(expr)
}

fn too_large() -> FilterError {
    FilterError::new(
        "FILTER_JSON_TOO_LARGE",
        format!(
            "Filter JSON exceeds maximum size of {} bytes",
            MAX_FILTER_JSON_SIZE
        ),
    )
}

fn validate(expr: &mut FilterExpr, depth: usize, conditions: &mut usize) -> Result<(), FilterError> {
    match expr {
        FilterExpr::Group {
            conditions: children,
            ..
        } => {
            if depth >= MAX_FILTER_DEPTH {
                return Err(FilterError::new(
                    "FILTER_TOO_DEEP",
                    format!("Maximum nesting depth is {}", MAX_FILTER_DEPTH),
                ));
            }
            for child in children {
                validate(child, depth + 1, conditions)?;
            }
            Ok(())
        }
        FilterExpr::Condition(condition) => {
            *conditions += 1;
            if *conditions > MAX_CONDITIONS {
                return Err(FilterError::new(
                    "TOO_MANY_CONDITIONS",
                    format!("Maximum {} conditions allowed", MAX_CONDITIONS),
                ));
            }
            validate_condition(condition)
        }
    }
}

fn validate_condition(condition: &mut Condition) -> Result<(), FilterError> {
    validate_key(condition)?;

    let op = condition.operator;
    let value = match condition.value.take() {
        None | Some(JsonValue::Null) if op.takes_value() => {
            return Err(invalid_value(op, "a value is required"));
        }
        Some(v) if !v.is_null() && !op.takes_value() => {
            return Err(invalid_value(op, "no value is accepted"));
        }
        None | Some(JsonValue::Null) => return Ok(()),
        Some(v) => v,
    };

    if op.is_membership() {
        let JsonValue::Array(items) = value else {
            return Err(invalid_value(op, "expected an array"));
        };
        let items = items
            .into_iter()
            .map(|item| normalize_scalar(condition.field, op, item))
            .collect::<Result<Vec<_>, _>>()?;
        condition.value = Some(JsonValue::Array(items));
        return Ok(());
    }

    if op.is_text() && !value.is_string() {
        return Err(invalid_value(op, "expected a string"));
    }
    if op.is_ordering() && !(value.is_number() || value.is_string()) {
        return Err(invalid_value(op, "expected a number or a string"));
    }
    condition.value = Some(normalize_scalar(condition.field, op, value)?);
    Ok(())
}

fn validate_key(condition: &Condition) -> Result<(), FilterError> {
    match (condition.field, condition.key.as_deref()) {
        (FilterField::Attributes, Some(key))
            if key.len() > CANONICAL_PREFIX.len() && key.starts_with(CANONICAL_PREFIX) =>
        {
            Ok(())
        }
        (FilterField::Attributes, Some(key)) => Err(FilterError::new(
            "INVALID_FILTER_KEY",
            format!("Attribute key must start with '{}': {}", CANONICAL_PREFIX, key),
        )),
        (FilterField::Attributes, None) => Err(FilterError::new(
            "INVALID_FILTER_KEY",
            "Attribute conditions require a key",
        )),
        (_, Some(_)) => Err(FilterError::new(
            "INVALID_FILTER_KEY",
            "Only attribute conditions take a key",
        )),
        (_, None) => Ok(()),
    }
}

/// Map enum aliases to their canonical names and timestamps to nanoseconds.
fn normalize_scalar(field: FilterField, op: FilterOp, value: JsonValue) -> Result<JsonValue, FilterError> {
    if value.is_array() || value.is_object() {
        return match field {
            FilterField::Attributes if !op.is_membership() => Ok(value),
            _ => Err(invalid_value(op, "expected a scalar")),
        };
    }
    match field {
        FilterField::StartTime | FilterField::EndTime => parse_wire_timestamp(&value)
            .and_then(|ts| ts.timestamp_nanos_opt())
            .map(JsonValue::from)
            .ok_or_else(|| invalid_value(op, "expected a timestamp")),
        FilterField::SpanKind => serde_json::from_value::<SpanKind>(value)
            .map(|kind| JsonValue::from(kind.as_str()))
            .map_err(|_| invalid_value(op, "unknown span kind")),
        FilterField::StatusCode => serde_json::from_value::<StatusCode>(value)
            .map(|status| JsonValue::from(status.as_str()))
            .map_err(|_| invalid_value(op, "unknown status code")),
        _ => Ok(value),
    }
}

fn invalid_value(op: FilterOp, reason: &str) -> FilterError {
    FilterError::new(
        "INVALID_FILTER_VALUE",
        format!("Operator '{}': {}", op.as_str(), reason),
    )
}
