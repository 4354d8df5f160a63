use cdo_common::{error::CdoError, types::ValueType};
use serde::{Deserialize, Serialize};

/// User-facing description of a dimension. Unset fields take defaults derived
/// from the dimension name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DimensionSpec {
    pub label: Option<String>,
    pub value_type: Option<ValueType>,
    pub is_discrete: Option<bool>,
    pub is_hidden: bool,
    /// strftime pattern used to label and parse date values
    pub format: Option<String>,
}

impl DimensionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..self
        }
    }

    pub fn value_type(self, value_type: ValueType) -> Self {
        Self {
            value_type: Some(value_type),
            ..self
        }
    }

    pub fn discrete(self, is_discrete: bool) -> Self {
        Self {
            is_discrete: Some(is_discrete),
            ..self
        }
    }

    pub fn hidden(self, is_hidden: bool) -> Self {
        Self { is_hidden, ..self }
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..self
        }
    }

    /// Fill unset fields of `self` from `defaults`
    pub fn or(self, defaults: &DimensionSpec) -> Self {
        Self {
            label: self.label.or_else(|| defaults.label.clone()),
            value_type: self.value_type.or(defaults.value_type),
            is_discrete: self.is_discrete.or(defaults.is_discrete),
            is_hidden: self.is_hidden || defaults.is_hidden,
            format: self.format.or_else(|| defaults.format.clone()),
        }
    }
}

/// Declared shape of a dimension within a [`crate::complex_type::ComplexType`]
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionType {
    name: String,
    label: String,
    group: Option<String>,
    group_level: usize,
    value_type: ValueType,
    is_discrete: bool,
    is_hidden: bool,
    format: Option<String>,
}

impl DimensionType {
    pub fn new(name: &str, spec: DimensionSpec) -> Result<Self, CdoError> {
        if name.trim().is_empty() {
            return Err(CdoError::argument_required("name"));
        }
        let (group, group_level) = split_indexed_id(name);
        let value_type = spec.value_type.unwrap_or_default();
        let is_discrete = spec.is_discrete.unwrap_or(!value_type.is_continuous());
        if !is_discrete && !value_type.is_continuous() {
            return Err(CdoError::argument_invalid(
                "isDiscrete",
                format!("Dimension '{name}' of value type '{value_type}' must be discrete"),
            ));
        }
        let label = spec
            .label
            .unwrap_or_else(|| default_label(name, group.as_deref(), group_level));

        Ok(Self {
            name: name.to_string(),
            label,
            group,
            group_level,
            value_type,
            is_discrete,
            is_hidden: spec.is_hidden,
            format: spec.format,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn group_level(&self) -> usize {
        self.group_level
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_discrete(&self) -> bool {
        self.is_discrete
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }
}

/// Split a dimension name into its group and level.
///
/// `"category"` is level 0 of group `"category"`, `"category2"` is level 1,
/// `"category3"` level 2. The suffixes `0` and `1` are read as level 0.
pub fn split_indexed_id(name: &str) -> (Option<String>, usize) {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[prefix.len()..];
    let level = digits
        .parse::<usize>()
        .map(|n| n.saturating_sub(1))
        .unwrap_or(0);
    let group = if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    };
    (group, level)
}

/// Inverse of [`split_indexed_id`]
pub fn build_indexed_id(prefix: &str, level: usize) -> String {
    if level == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}{}", level + 1)
    }
}

fn default_label(name: &str, group: Option<&str>, level: usize) -> String {
    let base = group.unwrap_or(name);
    let mut chars = base.chars();
    let mut label = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if group.is_some() && level > 0 {
        label.push_str(&format!(" {}", level + 1));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_indexed_id() {
        assert_eq!(split_indexed_id("category"), (Some("category".to_string()), 0));
        assert_eq!(split_indexed_id("category2"), (Some("category".to_string()), 1));
        assert_eq!(split_indexed_id("value10"), (Some("value".to_string()), 9));
        assert_eq!(split_indexed_id("series1"), (Some("series".to_string()), 0));
        assert_eq!(split_indexed_id("42"), (None, 41));
    }

    #[test]
    fn test_build_indexed_id_round_trips() {
        for level in 0..4 {
            let name = build_indexed_id("series", level);
            assert_eq!(split_indexed_id(&name), (Some("series".to_string()), level));
        }
    }

    #[test]
    fn test_defaults() -> Result<(), CdoError> {
        let dim = DimensionType::new("category2", DimensionSpec::new())?;
        assert_eq!(dim.label(), "Category 2");
        assert_eq!(dim.value_type(), ValueType::Any);
        assert!(dim.is_discrete());

        let dim = DimensionType::new("value", DimensionSpec::new().value_type(ValueType::Number))?;
        assert_eq!(dim.label(), "Value");
        assert!(!dim.is_discrete());
        Ok(())
    }

    #[test]
    fn test_continuous_any_is_rejected() {
        let result = DimensionType::new("series", DimensionSpec::new().discrete(false));
        assert!(matches!(result, Err(CdoError::ArgumentInvalid { .. })));
    }

    #[test]
    fn test_spec_or_fills_unset_fields() {
        let user = DimensionSpec::new().label("Region");
        let defaults = DimensionSpec::new().label("Category").value_type(ValueType::String);
        let merged = user.or(&defaults);
        assert_eq!(merged.label.as_deref(), Some("Region"));
        assert_eq!(merged.value_type, Some(ValueType::String));
    }
}
