//! Core data types for meta point evaluation.
//!
//! Every value that flows into or out of a script is one of four closed
//! variants, tagged by a [`DataType`]. The tag of a point or of an evaluation
//! target is fixed; values are never silently reinterpreted as another kind.
//!
//! # Types
//!
//! - [`DataType`]: The data type tag of a point or evaluation target
//! - [`DomainValue`]: Tagged value with one of the four payloads
//! - [`TimedValue`]: A value paired with its epoch-millisecond timestamp
//! - [`PointId`]: Registry identifier of a point

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry identifier of a data point.
pub type PointId = i32;

// =============================================================================
// Data Type Tags
// =============================================================================

/// Data type tag of a point or evaluation target.
///
/// The numeric ids match the ones used by the host automation system so that
/// tags can be read from stored point configuration with [`DataType::from_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// On/off state.
    Binary,
    /// Enumerated integer state.
    Multistate,
    /// Floating point measurement.
    Numeric,
    /// Free text.
    Alphanumeric,
}

impl DataType {
    /// All tags, in id order.
    pub const ALL: [DataType; 4] = [
        DataType::Binary,
        DataType::Multistate,
        DataType::Numeric,
        DataType::Alphanumeric,
    ];

    /// Host system id of this tag.
    pub fn id(self) -> i32 {
        match self {
            DataType::Binary => 1,
            DataType::Multistate => 2,
            DataType::Numeric => 3,
            DataType::Alphanumeric => 4,
        }
    }

    /// Look up a tag by its host system id.
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|dt| dt.id() == id)
    }

    /// Human-readable name, also used as the script-side `data_type` property.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Binary => "Binary",
            DataType::Multistate => "Multistate",
            DataType::Numeric => "Numeric",
            DataType::Alphanumeric => "Alphanumeric",
        }
    }

    /// The value a script produces for this type when it returns nothing.
    pub fn zero_value(self) -> DomainValue {
        match self {
            DataType::Binary => DomainValue::Binary(false),
            DataType::Multistate => DomainValue::Multistate(0),
            DataType::Numeric => DomainValue::Numeric(0.0),
            DataType::Alphanumeric => DomainValue::Alphanumeric(String::new()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    /// Accepts a tag name in any case, or a host system id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i32>() {
            return Self::from_id(id).ok_or_else(|| format!("Unknown data type id: {}", id));
        }
        Self::ALL
            .into_iter()
            .find(|dt| dt.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown data type: {}", s))
    }
}

// =============================================================================
// Values
// =============================================================================

/// A point value: exactly one of the four domain variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DomainValue {
    /// On/off state.
    Binary(bool),
    /// Enumerated integer state.
    Multistate(i32),
    /// Floating point measurement.
    Numeric(f64),
    /// Free text.
    Alphanumeric(String),
}

impl DomainValue {
    /// The tag of the active variant.
    pub fn data_type(&self) -> DataType {
        match self {
            DomainValue::Binary(_) => DataType::Binary,
            DomainValue::Multistate(_) => DataType::Multistate,
            DomainValue::Numeric(_) => DataType::Numeric,
            DomainValue::Alphanumeric(_) => DataType::Alphanumeric,
        }
    }

    /// Numeric view of the value, for variants that have one.
    ///
    /// Binary values read as 0/1 so that they can take part in statistics.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DomainValue::Binary(b) => Some(if *b { 1.0 } else { 0.0 }),
            DomainValue::Multistate(m) => Some(f64::from(*m)),
            DomainValue::Numeric(n) => Some(*n),
            DomainValue::Alphanumeric(_) => None,
        }
    }
}

impl fmt::Display for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainValue::Binary(b) => write!(f, "{}", b),
            DomainValue::Multistate(m) => write!(f, "{}", m),
            DomainValue::Numeric(n) => write!(f, "{}", n),
            DomainValue::Alphanumeric(s) => f.write_str(s),
        }
    }
}

/// A value together with the instant it applies to (epoch milliseconds).
///
/// Produced once per evaluation and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    /// The value.
    pub value: DomainValue,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl TimedValue {
    /// Pair a value with a timestamp.
    pub fn new(value: DomainValue, timestamp: i64) -> Self {
        Self { value, timestamp }
    }

    /// The timestamp as a UTC date-time, if it is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

impl fmt::Display for TimedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_ids_round_trip() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_id(dt.id()), Some(dt));
        }
        assert_eq!(DataType::from_id(5), None);
        assert_eq!(DataType::from_id(0), None);
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("numeric".parse::<DataType>(), Ok(DataType::Numeric));
        assert_eq!("Alphanumeric".parse::<DataType>(), Ok(DataType::Alphanumeric));
        assert_eq!("2".parse::<DataType>(), Ok(DataType::Multistate));
        assert!("9".parse::<DataType>().is_err());
        assert!("analog".parse::<DataType>().is_err());
    }

    #[test]
    fn test_zero_values_match_their_tag() {
        for dt in DataType::ALL {
            assert_eq!(dt.zero_value().data_type(), dt);
        }
        assert_eq!(DataType::Alphanumeric.zero_value(), DomainValue::Alphanumeric(String::new()));
    }

    #[test]
    fn test_timed_value_display_and_time() {
        let tv = TimedValue::new(DomainValue::Numeric(1.5), 1_000);
        assert_eq!(tv.to_string(), "1.5@1000");
        assert_eq!(tv.time().map(|t| t.timestamp_millis()), Some(1_000));
    }

    #[test]
    fn test_domain_value_serde_shape() {
        let json = serde_json::to_string(&DomainValue::Multistate(3)).unwrap();
        assert_eq!(json, r#"{"Multistate":3}"#);
        let back: DomainValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DomainValue::Multistate(3));
    }
}
