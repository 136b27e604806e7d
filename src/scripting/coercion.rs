//! Conversion of script results into domain values.
//!
//! A raw Rhai result is first marshalled into a [`RawResult`], which only
//! knows the shapes that matter for conversion. [`coerce`] then applies the
//! conversion table against the target data type:
//!
//! | Raw result   | Target        | Value                               |
//! |--------------|---------------|-------------------------------------|
//! | absent `()`  | any           | the target's zero value             |
//! | point        | its own type  | the point's value                   |
//! | boolean      | Binary        | `Binary`                            |
//! | number       | Multistate    | `Multistate`, truncated, saturating |
//! | number       | Numeric       | `Numeric`                           |
//! | string       | Alphanumeric  | `Alphanumeric`                      |
//! | undefined    | any           | internal error                      |
//!
//! Every other combination is a [`MetaError::ResultType`].

use rhai::{Dynamic, Engine};

use crate::core::{DataType, DomainValue};
use crate::error::{AppResult, MetaError};
use crate::scripting::bindings::PointTable;

/// Shape of a script result, independent of the runtime that produced it.
#[derive(Clone, Debug, PartialEq)]
pub enum RawResult {
    /// No value (`()` in Rhai).
    Absent,
    /// A point variable returned unchanged.
    Point(DomainValue),
    /// A boolean.
    Boolean(bool),
    /// An integer.
    Integer(i64),
    /// A float.
    Float(f64),
    /// A string.
    Text(String),
    /// A runtime's "undefined" marker, distinct from absent.
    ///
    /// Rhai has no such value, so Rhai results never produce it.
    Undefined,
    /// Anything else, by type name.
    Other(String),
}

impl RawResult {
    /// Name of the result's kind, as used in error messages.
    pub fn kind(&self) -> String {
        match self {
            RawResult::Absent => "()".to_string(),
            RawResult::Point(value) => format!("{} point", value.data_type()),
            RawResult::Boolean(_) => "boolean".to_string(),
            RawResult::Integer(_) | RawResult::Float(_) => "number".to_string(),
            RawResult::Text(_) => "string".to_string(),
            RawResult::Undefined => "undefined".to_string(),
            RawResult::Other(name) => name.clone(),
        }
    }
}

/// Marshal a Rhai value into a [`RawResult`].
///
/// With the execution's `points`, a point variable returned unchanged is
/// recognised as that point. With an engine at hand, unknown types are
/// reported by their script-facing names instead of their Rust type names.
pub fn marshal(value: Dynamic, points: Option<&PointTable>, engine: Option<&Engine>) -> RawResult {
    let value = value.flatten();

    if value.is_unit() {
        return RawResult::Absent;
    }
    if let Some(point) = points.and_then(|points| points.identify(&value)) {
        return RawResult::Point(point);
    }
    if let Ok(b) = value.as_bool() {
        return RawResult::Boolean(b);
    }
    if let Ok(i) = value.as_int() {
        return RawResult::Integer(i);
    }
    if let Ok(f) = value.as_float() {
        return RawResult::Float(f);
    }
    if let Ok(c) = value.as_char() {
        return RawResult::Text(c.to_string());
    }
    if value.is_string() {
        if let Ok(s) = value.into_string() {
            return RawResult::Text(s);
        }
        return RawResult::Other("string".to_string());
    }

    let type_name = value.type_name();
    let name = engine.map_or(type_name, |engine| engine.map_type_name(type_name));
    RawResult::Other(name.to_string())
}

/// Convert `raw` to a value of type `target`.
///
/// # Errors
///
/// - [`MetaError::ResultType`] when the shape does not fit the target.
/// - [`MetaError::Internal`] for an undefined result.
pub fn coerce(raw: RawResult, target: DataType) -> AppResult<DomainValue> {
    match (raw, target) {
        (RawResult::Absent, target) => Ok(target.zero_value()),
        (RawResult::Point(value), target) if value.data_type() == target => Ok(value),
        (RawResult::Boolean(b), DataType::Binary) => Ok(DomainValue::Binary(b)),
        (RawResult::Integer(i), DataType::Multistate) => Ok(DomainValue::Multistate(
            i.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        )),
        (RawResult::Float(f), DataType::Multistate) => Ok(DomainValue::Multistate(f as i32)),
        (RawResult::Integer(i), DataType::Numeric) => Ok(DomainValue::Numeric(i as f64)),
        (RawResult::Float(f), DataType::Numeric) => Ok(DomainValue::Numeric(f)),
        (RawResult::Text(s), DataType::Alphanumeric) => Ok(DomainValue::Alphanumeric(s)),
        (RawResult::Undefined, _) => Err(MetaError::Internal("Undefined data type".to_string())),
        (raw, expected) => Err(MetaError::ResultType {
            actual: raw.kind(),
            expected,
        }),
    }
}
