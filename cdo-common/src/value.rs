use std::fmt::{self, Display};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::types::ValueType;

/// A single non-null source or domain value.
///
/// Nulls are modeled as `Option<Value>::None` everywhere, so a `Value` is
/// always something an atom can be labeled with. Floats are wrapped in
/// `OrderedFloat` so values can be hashed and interned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Number(OrderedFloat<f64>),
    String(String),
    Date(DateTime<Utc>),
}

/// A cell of a source row
pub type Cell = Option<Value>;

impl Value {
    pub fn number(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn date(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Value::Date(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?)))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value is continuous at runtime (a number or a date)
    pub fn is_continuous(&self) -> bool {
        matches!(self, Value::Number(_) | Value::Date(_))
    }

    /// Stable textual identity of the value, used to compose datum and data keys
    pub fn key(&self) -> String {
        match self {
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => n.0.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.timestamp_millis().to_string(),
        }
    }

    /// Convert to the given value type.
    ///
    /// Returns `None` when the value has no representation in the target type,
    /// which callers treat as null.
    pub fn cast(&self, value_type: ValueType, date_format: Option<&str>) -> Option<Value> {
        match value_type {
            ValueType::Any => Some(self.clone()),
            ValueType::Number => match self {
                Value::Number(n) if n.0.is_finite() => Some(self.clone()),
                Value::Number(_) => None,
                Value::Boolean(b) => Some(Value::number(if *b { 1.0 } else { 0.0 })),
                Value::String(s) => parse_number(s).map(Value::number),
                Value::Date(d) => Some(Value::number(d.timestamp_millis() as f64)),
            },
            ValueType::String => match self {
                Value::String(_) => Some(self.clone()),
                other => Some(Value::String(other.to_string())),
            },
            ValueType::Boolean => match self {
                Value::Boolean(_) => Some(self.clone()),
                Value::Number(n) => Some(Value::Boolean(n.0 != 0.0 && !n.0.is_nan())),
                Value::String(s) => Some(Value::Boolean(!s.is_empty())),
                Value::Date(_) => Some(Value::Boolean(true)),
            },
            ValueType::Date => match self {
                Value::Date(_) => Some(self.clone()),
                Value::Number(n) if n.0.is_finite() => Utc
                    .timestamp_millis_opt(n.0 as i64)
                    .single()
                    .map(Value::Date),
                Value::Number(_) => None,
                Value::String(s) => parse_date(s, date_format).map(Value::Date),
                Value::Boolean(_) => None,
            },
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", n.0),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

/// Parse a trimmed numeric string, rejecting empty and non-finite input
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a date string with an explicit strftime format, falling back to
/// RFC 3339 and plain `%Y-%m-%d` when no format is given.
pub fn parse_date(text: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    match format {
        Some(format) => NaiveDateTime::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(|dt| Utc.from_utc_datetime(&dt)),
        None => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| Utc.from_utc_datetime(&dt))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_cells() {
        let cells: Vec<Cell> = serde_json::from_str(r#"["T", 12, 4.5, true, null]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Some(Value::string("T")),
                Some(Value::number(12.0)),
                Some(Value::number(4.5)),
                Some(Value::Boolean(true)),
                None,
            ]
        );
    }

    #[test]
    fn test_keys() {
        assert_eq!(Value::number(12.0).key(), "12");
        assert_eq!(Value::number(0.25).key(), "0.25");
        assert_eq!(Value::string("A").key(), "A");
        assert_eq!(Value::Boolean(false).key(), "false");
        assert_eq!(Value::date(1970, 1, 2).unwrap().key(), "86400000");
    }

    #[test]
    fn test_cast() {
        let v = Value::string(" 3.5 ");
        assert_eq!(v.cast(ValueType::Number, None), Some(Value::number(3.5)));
        assert_eq!(Value::string("abc").cast(ValueType::Number, None), None);
        assert_eq!(
            Value::number(1.0).cast(ValueType::String, None),
            Some(Value::string("1"))
        );
        assert_eq!(
            Value::string("2024-03-01").cast(ValueType::Date, None),
            Value::date(2024, 3, 1)
        );
        assert_eq!(
            Value::string("01/03/2024").cast(ValueType::Date, Some("%d/%m/%Y")),
            Value::date(2024, 3, 1)
        );
    }

    #[test]
    fn test_negative_zero_interns_as_zero() {
        use std::collections::HashSet;
        let set: HashSet<Value> = [Value::number(0.0), Value::number(-0.0)].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
