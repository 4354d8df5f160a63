use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

/// Declared type of the values of a dimension
#[derive(
    Debug, Default, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ValueType {
    #[default]
    Any,
    Number,
    String,
    Boolean,
    Date,
}

impl ValueType {
    /// Whether values of this type are naturally continuous
    pub fn is_continuous(&self) -> bool {
        matches!(self, ValueType::Number | ValueType::Date)
    }
}

/// Direction used when a grouping level asks for sorted children
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Classification of a source column: measures are read from continuous
/// columns, series and categories from discrete ones
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnType {
    Discrete,
    Continuous,
}

impl ColumnType {
    /// `1` for continuous, `0` for discrete
    pub fn flag(&self) -> u8 {
        match self {
            ColumnType::Discrete => 0,
            ColumnType::Continuous => 1,
        }
    }

    pub fn is_continuous(&self) -> bool {
        *self == ColumnType::Continuous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_value_type_from_str() {
        assert_eq!(ValueType::from_str("Number").unwrap(), ValueType::Number);
        assert_eq!(ValueType::from_str("date").unwrap(), ValueType::Date);
        assert!(ValueType::from_str("numeric").is_err());
        assert!(ValueType::Date.is_continuous());
        assert!(!ValueType::Any.is_continuous());
    }

    #[test]
    fn test_sort_direction_from_str() {
        assert_eq!(SortDirection::from_str("DESC").unwrap(), SortDirection::Desc);
        assert_eq!(SortDirection::default(), SortDirection::Asc);
    }
}
