//! Field option inference from source data
//!
//! Airtable wants type-specific options when a field is created. Number
//! precision and initial select choices are read off the rows about to be
//! written; the rest are fixed formats.

use crate::airtable::NewField;
use crate::coerce::FieldCoercer;
use crate::config::{CoercionOptions, ColumnMapping};
use crate::source::SourceRow;
use crate::types::FieldType;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Airtable's maximum number precision
pub const MAX_PRECISION: u32 = 8;

/// Currency precision used when the data has no decimals
pub const DEFAULT_CURRENCY_PRECISION: u32 = 2;

/// Smallest rating scale created
const MIN_RATING_SCALE: u32 = 5;

/// Largest rating scale Airtable allows
const MAX_RATING_SCALE: u32 = 10;

#[derive(Debug, Clone, Default)]
struct ColumnStats {
    precision: u32,
    max_integer: u32,
    choices: Vec<String>,
    seen: HashSet<String>,
}

/// Collects per-column statistics used to build field options
#[derive(Debug, Clone, Default)]
pub struct FieldOptionsInferrer {
    coercer: FieldCoercer,
    stats: HashMap<String, ColumnStats>,
}

impl FieldOptionsInferrer {
    /// Create an empty inferrer
    pub fn new(options: CoercionOptions) -> Self {
        Self {
            coercer: FieldCoercer::new(options),
            stats: HashMap::new(),
        }
    }

    /// Build an inferrer from the rows about to be written
    pub fn from_rows(
        options: CoercionOptions,
        mappings: &[ColumnMapping],
        rows: &[SourceRow],
    ) -> Self {
        let mut inferrer = Self::new(options);
        for row in rows {
            for mapping in mappings {
                if let Some(raw) = row.get(&mapping.source_name) {
                    inferrer.observe(mapping, raw);
                }
            }
        }
        inferrer
    }

    /// Record one raw value of a mapped column
    pub fn observe(&mut self, mapping: &ColumnMapping, raw: &str) {
        let field_type = mapping.destination_type;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        let stats = self.stats.entry(mapping.source_name.clone()).or_default();

        match field_type {
            FieldType::Number | FieldType::Currency | FieldType::Percent => {
                if let Some(places) = decimal_places(trimmed, field_type) {
                    stats.precision = stats.precision.max(places).min(MAX_PRECISION);
                }
            }
            FieldType::Rating => {
                if let Ok(value) = trimmed.parse::<u32>() {
                    stats.max_integer = stats.max_integer.max(value);
                }
            }
            FieldType::SingleSelect => {
                if stats.seen.insert(trimmed.to_string()) {
                    stats.choices.push(trimmed.to_string());
                }
            }
            FieldType::MultipleSelects => {
                for option in self.coercer.split_options(trimmed) {
                    if stats.seen.insert(option.clone()) {
                        stats.choices.push(option);
                    }
                }
            }
            _ => {}
        }
    }

    /// Distinct select choices seen for a source column, in first-seen order
    pub fn choices(&self, source_name: &str) -> &[String] {
        self.stats
            .get(source_name)
            .map(|s| s.choices.as_slice())
            .unwrap_or_default()
    }

    /// Decimal places observed for a source column
    pub fn precision(&self, source_name: &str) -> u32 {
        self.stats.get(source_name).map_or(0, |s| s.precision)
    }

    /// Creation body for a mapped field under the given type
    pub fn field_spec(&self, mapping: &ColumnMapping, field_type: FieldType) -> NewField {
        NewField {
            name: mapping.destination_name.clone(),
            field_type: field_type.as_str().to_string(),
            options: self.options_for(&mapping.source_name, field_type),
        }
    }

    fn options_for(&self, source_name: &str, field_type: FieldType) -> Option<Value> {
        let precision = self.precision(source_name);
        let options = match field_type {
            FieldType::Number | FieldType::Percent => json!({ "precision": precision }),
            FieldType::Currency => {
                let precision = if precision > 0 {
                    precision
                } else {
                    DEFAULT_CURRENCY_PRECISION
                };
                json!({ "precision": precision, "symbol": "$" })
            }
            FieldType::Rating => {
                let max = self
                    .stats
                    .get(source_name)
                    .map_or(0, |s| s.max_integer)
                    .clamp(MIN_RATING_SCALE, MAX_RATING_SCALE);
                json!({ "max": max, "icon": "star", "color": "yellowBright" })
            }
            FieldType::Checkbox => json!({ "icon": "check", "color": "greenBright" }),
            FieldType::Date => json!({ "dateFormat": iso_date_format() }),
            FieldType::DateTime => json!({
                "dateFormat": iso_date_format(),
                "timeFormat": { "name": "24hour", "format": "HH:mm" },
                "timeZone": "utc",
            }),
            FieldType::Duration => json!({ "durationFormat": "h:mm:ss" }),
            FieldType::SingleSelect | FieldType::MultipleSelects => {
                let choices: Vec<Value> = self
                    .choices(source_name)
                    .iter()
                    .map(|name| json!({ "name": name }))
                    .collect();
                json!({ "choices": choices })
            }
            FieldType::SingleLineText
            | FieldType::MultilineText
            | FieldType::RichText
            | FieldType::Email
            | FieldType::Url
            | FieldType::PhoneNumber => return None,
        };
        Some(options)
    }
}

fn iso_date_format() -> Value {
    json!({ "name": "iso", "format": "YYYY-MM-DD" })
}

/// Decimal places a raw numeric value needs, capped at [`MAX_PRECISION`]
///
/// Percent values written with a `%` sign are counted as displayed; plain
/// fractions lose two places to the scaling.
pub fn decimal_places(raw: &str, field_type: FieldType) -> Option<u32> {
    let trimmed = raw.trim();
    let (text, fraction_percent) = match field_type {
        FieldType::Currency => (trimmed.trim_start_matches(['$', '€', '£']), false),
        FieldType::Percent => match trimmed.strip_suffix('%') {
            Some(stripped) => (stripped.trim_end(), false),
            None => (trimmed, true),
        },
        _ => (trimmed, false),
    };
    let value: f64 = text.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let rendered = value.to_string();
    let places = rendered
        .split_once('.')
        .map_or(0, |(_, frac)| frac.trim_end_matches('0').len());
    let places = u32::try_from(places).unwrap_or(MAX_PRECISION);
    let places = if fraction_percent {
        places.saturating_sub(2)
    } else {
        places
    };
    Some(places.min(MAX_PRECISION))
}
