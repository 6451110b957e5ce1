//! Coercion value types
//!
//! [`TypedValue`] is the semantic value a raw source string stands for once
//! interpreted under a destination field type. It sits between the raw text
//! and the JSON wire value in both directions.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Wire format for `date` fields
pub const DATE_WIRE_FORMAT: &str = "%Y-%m-%d";

/// A source value interpreted under a destination field type
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// No value; clears the field
    Null,
    /// Text of any text-like type, and single select options
    Text(String),
    /// Numeric value (number, currency, percent, rating, duration seconds)
    Number(f64),
    /// Checkbox state
    Bool(bool),
    /// Calendar date
    Date(NaiveDate),
    /// Instant in UTC
    DateTime(DateTime<Utc>),
    /// Multiple select options, in first-seen order
    Options(Vec<String>),
}

impl TypedValue {
    /// Render as the JSON value Airtable accepts
    pub fn to_wire(&self) -> Value {
        match self {
            TypedValue::Null => Value::Null,
            TypedValue::Text(s) => Value::String(s.clone()),
            TypedValue::Number(n) => number_to_wire(*n),
            TypedValue::Bool(b) => Value::Bool(*b),
            TypedValue::Date(d) => Value::String(d.format(DATE_WIRE_FORMAT).to_string()),
            TypedValue::DateTime(dt) => {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            TypedValue::Options(options) => {
                Value::Array(options.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Whether this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }
}

/// Integers go out without a fractional part
fn number_to_wire(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}
