//! Field coercion
//!
//! Converts raw source text into Airtable wire values, one closed match over
//! [`FieldType`] per direction.

use super::types::{TypedValue, DATE_WIRE_FORMAT};
use crate::config::CoercionOptions;
use crate::error::{Error, Result};
use crate::types::FieldType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;

static TRUTHY: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["true", "1", "yes", "y", "t"].into_iter().collect());

static FALSY: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["false", "0", "", "no", "n", "f"].into_iter().collect());

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Upper bound of Airtable's rating field
const MAX_RATING: f64 = 10.0;

/// Pure converter between raw source text and wire values
#[derive(Debug, Clone, Default)]
pub struct FieldCoercer {
    options: CoercionOptions,
}

impl FieldCoercer {
    /// Create a coercer with the given options
    pub fn new(options: CoercionOptions) -> Self {
        Self { options }
    }

    /// Coercion options in use
    pub fn options(&self) -> &CoercionOptions {
        &self.options
    }

    /// Coerce a raw value into its wire representation
    ///
    /// `column` only labels the error.
    pub fn coerce(&self, raw: &str, field_type: FieldType, column: &str) -> Result<Value> {
        self.parse(raw, field_type, column).map(|v| v.to_wire())
    }

    /// Interpret a raw value under a field type
    pub fn parse(&self, raw: &str, field_type: FieldType, column: &str) -> Result<TypedValue> {
        let trimmed = raw.trim();
        match field_type {
            FieldType::Checkbox => parse_checkbox(trimmed, column),
            FieldType::MultipleSelects => Ok(TypedValue::Options(
                self.split_options(raw),
            )),
            _ if trimmed.is_empty() => Ok(TypedValue::Null),
            FieldType::SingleLineText
            | FieldType::MultilineText
            | FieldType::RichText
            | FieldType::Url
            | FieldType::PhoneNumber => Ok(TypedValue::Text(raw.to_string())),
            // Matches the choice names recorded for new tables
            FieldType::SingleSelect => Ok(TypedValue::Text(trimmed.to_string())),
            FieldType::Email => parse_email(trimmed, column),
            FieldType::Number => parse_number(trimmed, column).map(TypedValue::Number),
            FieldType::Currency => {
                let unsigned = trimmed.trim_start_matches(['$', '€', '£']);
                parse_number(unsigned, column).map(TypedValue::Number)
            }
            FieldType::Percent => parse_percent(trimmed, column).map(TypedValue::Number),
            FieldType::Rating => parse_rating(trimmed, column).map(TypedValue::Number),
            FieldType::Duration => parse_duration(trimmed, column).map(TypedValue::Number),
            FieldType::Date => parse_date(trimmed, column).map(TypedValue::Date),
            FieldType::DateTime => parse_datetime(trimmed, column).map(TypedValue::DateTime),
        }
    }

    /// Decode a wire value back into its semantic value
    pub fn decode(&self, wire: &Value, field_type: FieldType, column: &str) -> Result<TypedValue> {
        let mismatch = || {
            Error::validation(
                column,
                format!("wire value {wire} is not a valid {field_type} value"),
            )
        };
        match (field_type, wire) {
            (FieldType::Checkbox, Value::Null) => Ok(TypedValue::Bool(false)),
            (FieldType::Checkbox, Value::Bool(b)) => Ok(TypedValue::Bool(*b)),
            (FieldType::MultipleSelects, Value::Null) => Ok(TypedValue::Options(Vec::new())),
            (FieldType::MultipleSelects, Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(mismatch))
                .collect::<Result<Vec<_>>>()
                .map(TypedValue::Options),
            (_, Value::Null) => Ok(TypedValue::Null),
            (t, Value::Number(n)) if t.is_numeric() => {
                n.as_f64().map(TypedValue::Number).ok_or_else(mismatch)
            }
            (FieldType::Date, Value::String(s)) => NaiveDate::parse_from_str(s, DATE_WIRE_FORMAT)
                .map(TypedValue::Date)
                .map_err(|_| mismatch()),
            (FieldType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| TypedValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| mismatch()),
            (
                FieldType::SingleLineText
                | FieldType::MultilineText
                | FieldType::RichText
                | FieldType::Email
                | FieldType::Url
                | FieldType::PhoneNumber
                | FieldType::SingleSelect,
                Value::String(s),
            ) => Ok(TypedValue::Text(s.clone())),
            _ => Err(mismatch()),
        }
    }

    /// Split a multiple select value into distinct options
    pub fn split_options(&self, raw: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        raw.split(self.options.multiselect_delimiter.as_str())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter(|part| seen.insert(*part))
            .map(str::to_string)
            .collect()
    }
}

/// Render a remote field value as key text comparable with raw source values
pub fn identity_text(value: &Value, delimiter: &str) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| identity_text(item, delimiter))
            .collect::<Vec<_>>()
            .join(delimiter),
        Value::Object(obj) => obj
            .get("name")
            .or_else(|| obj.get("email"))
            .or_else(|| obj.get("id"))
            .and_then(Value::as_str)
            .map_or_else(|| value.to_string(), str::to_string),
    }
}

fn parse_checkbox(trimmed: &str, column: &str) -> Result<TypedValue> {
    let lowered = trimmed.to_ascii_lowercase();
    if TRUTHY.contains(lowered.as_str()) {
        Ok(TypedValue::Bool(true))
    } else if FALSY.contains(lowered.as_str()) {
        Ok(TypedValue::Bool(false))
    } else {
        Err(Error::validation(
            column,
            format!("'{trimmed}' is not a recognized checkbox value"),
        ))
    }
}

fn parse_email(trimmed: &str, column: &str) -> Result<TypedValue> {
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(TypedValue::Text(trimmed.to_string()))
        }
        _ => Err(Error::validation(
            column,
            format!("'{trimmed}' is not an email address"),
        )),
    }
}

fn parse_number(trimmed: &str, column: &str) -> Result<f64> {
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| Error::validation(column, format!("'{trimmed}' is not a number")))
}

/// "50%" and "0.5" both mean one half
fn parse_percent(trimmed: &str, column: &str) -> Result<f64> {
    match trimmed.strip_suffix('%') {
        Some(number) => parse_number(number.trim_end(), column).map(|n| n / 100.0),
        None => parse_number(trimmed, column),
    }
}

fn parse_rating(trimmed: &str, column: &str) -> Result<f64> {
    let n = parse_number(trimmed, column)?;
    if n.fract() != 0.0 || !(1.0..=MAX_RATING).contains(&n) {
        return Err(Error::validation(
            column,
            format!("'{trimmed}' is not a rating between 1 and {MAX_RATING}"),
        ));
    }
    Ok(n)
}

/// Seconds, or `h:mm[:ss[.fff]]`
fn parse_duration(trimmed: &str, column: &str) -> Result<f64> {
    if !trimmed.contains(':') {
        return parse_number(trimmed, column);
    }
    let invalid = || Error::validation(column, format!("'{trimmed}' is not a duration"));
    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }
    let mut seconds = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let value: f64 = part.parse().map_err(|_| invalid())?;
        if value < 0.0 || (i > 0 && value >= 60.0) {
            return Err(invalid());
        }
        seconds = seconds * 60.0 + value;
    }
    if parts.len() == 2 {
        // h:mm
        seconds *= 60.0;
    }
    Ok(seconds)
}

fn parse_date(trimmed: &str, column: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_WIRE_FORMAT) {
        return Ok(date);
    }
    parse_datetime(trimmed, column)
        .map(|dt| dt.date_naive())
        .map_err(|_| Error::validation(column, format!("'{trimmed}' is not an ISO-8601 date")))
}

fn parse_datetime(trimmed: &str, column: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    let message = if NaiveDate::parse_from_str(trimmed, DATE_WIRE_FORMAT).is_ok() {
        format!("'{trimmed}' has no time component")
    } else {
        format!("'{trimmed}' is not an ISO-8601 date-time")
    };
    Err(Error::validation(column, message))
}
