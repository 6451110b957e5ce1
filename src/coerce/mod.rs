//! Value coercion module
//!
//! Converts raw textual source values into the typed wire values each
//! Airtable field type accepts, and decodes wire values back.
//!
//! # Rules
//!
//! - Empty input clears the field, except `checkbox` (false) and
//!   `multipleSelects` (no options)
//! - `checkbox` accepts a fixed set of truthy/falsy tokens
//! - `multipleSelects` splits on the configured delimiter
//! - `date`/`dateTime` parse ISO-8601 and emit Airtable's canonical format
//! - Anything uninterpretable is a validation error for that row only

mod coercer;
mod types;

pub use coercer::{identity_text, FieldCoercer};
pub use types::{TypedValue, DATE_WIRE_FORMAT};
