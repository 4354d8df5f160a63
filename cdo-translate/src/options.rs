use std::rc::Rc;

use cdo_common::error::CdoError;
use cdo_data::dimension_type::DimensionSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use strum::{Display, EnumString};
use tracing::warn;

/// Name of the hidden dimension that routes series to the second plot
pub const DEFAULT_DATA_PART_DIM_NAME: &str = "dataPart";
pub const DEFAULT_PREVIEW_ROWS: usize = 15;
pub const DEFAULT_PREVIEW_COLUMNS: usize = 6;

/// How much the column classifier trusts actual values over metadata
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TypeCheckingMode {
    /// Metadata only
    None,
    /// Scan values; numeric strings stay discrete
    #[default]
    Minimum,
    /// Scan values; numeric strings count as continuous
    Extended,
}

/// A list of column or series indexes: a single number, an array, or a
/// comma-separated string. Entries are validated by
/// [`crate::index::parse_distinct_index_array`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexList {
    One(f64),
    Many(Vec<JsonValue>),
    Text(String),
}

impl From<i64> for IndexList {
    fn from(value: i64) -> Self {
        IndexList::One(value as f64)
    }
}

impl From<Vec<i64>> for IndexList {
    fn from(values: Vec<i64>) -> Self {
        IndexList::Many(values.into_iter().map(JsonValue::from).collect())
    }
}

impl From<&str> for IndexList {
    fn from(value: &str) -> Self {
        IndexList::Text(value.to_string())
    }
}

/// A user-defined binding of logical columns to dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderSpec {
    /// Dimension names, or group prefixes expanded to successive levels
    #[serde(deserialize_with = "one_or_many")]
    pub names: Vec<String>,
    #[serde(default)]
    pub indexes: Option<IndexList>,
}

impl ReaderSpec {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            indexes: None,
        }
    }

    pub fn indexes(self, indexes: impl Into<IndexList>) -> Self {
        Self {
            indexes: Some(indexes.into()),
            ..self
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(text) => text
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        OneOrMany::Many(names) => names,
    })
}

/// Options of a relational translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslationOptions {
    pub series_in_rows: bool,
    pub categories_count: Option<f64>,
    pub measures_indexes: Option<IndexList>,
    /// Only meaningful for crosstab layouts; accepted and ignored here
    pub is_multi_valued: bool,
    pub plot2_data_series_indexes: Option<IndexList>,
    pub data_part_dim_name: String,
    pub type_checking_mode: TypeCheckingMode,
    /// Drop datums whose measures are all null
    pub ignore_nulls: bool,
    /// Read categories as dates
    pub time_series: bool,
    pub time_series_format: Option<String>,
    pub readers: Vec<ReaderSpec>,
    /// Per-dimension overrides of the default dimension specs
    pub dimensions: IndexMap<String, DimensionSpec>,
    pub preview_rows: usize,
    pub preview_columns: usize,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            series_in_rows: false,
            categories_count: None,
            measures_indexes: None,
            is_multi_valued: false,
            plot2_data_series_indexes: None,
            data_part_dim_name: DEFAULT_DATA_PART_DIM_NAME.to_string(),
            type_checking_mode: TypeCheckingMode::default(),
            ignore_nulls: false,
            time_series: false,
            time_series_format: None,
            readers: Vec::new(),
            dimensions: IndexMap::new(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            preview_columns: DEFAULT_PREVIEW_COLUMNS,
        }
    }
}

const KNOWN_OPTIONS: &[&str] = &[
    "seriesInRows",
    "categoriesCount",
    "measuresIndexes",
    "isMultiValued",
    "plot2DataSeriesIndexes",
    "dataPartDimName",
    "typeCheckingMode",
    "ignoreNulls",
    "timeSeries",
    "timeSeriesFormat",
    "readers",
    "dimensions",
    "previewRows",
    "previewColumns",
];

impl TranslationOptions {
    /// Requested category count. Negative and non-finite requests count as
    /// unset.
    pub fn requested_categories_count(&self) -> Option<usize> {
        self.categories_count
            .filter(|c| c.is_finite() && *c >= 0.0)
            .map(|c| c.floor() as usize)
    }

    /// Resolve the options visible through a layer chain
    pub fn from_layer(layer: &OptionLayer) -> Result<Self, CdoError> {
        let merged = layer.flatten();
        for key in merged.keys() {
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                warn!("Ignoring unknown translation option '{key}'");
            }
        }
        Self::from_json(JsonValue::Object(merged))
    }

    pub fn from_json(value: JsonValue) -> Result<Self, CdoError> {
        serde_json::from_value(value)
            .map_err(|err| CdoError::argument_invalid("options", err.to_string()))
    }
}

/// One layer of option overrides on top of an optional shared base.
///
/// Lookups check the local overrides first and fall back to the base chain.
/// Layers never alias each other's storage: overriding a name locally leaves
/// the base untouched.
#[derive(Debug, Clone, Default)]
pub struct OptionLayer {
    base: Option<Rc<OptionLayer>>,
    local: Map<String, JsonValue>,
}

impl OptionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Rc<OptionLayer>) -> Self {
        Self {
            base: Some(base),
            local: Map::new(),
        }
    }

    /// Build a layer from a JSON object
    pub fn from_json(value: JsonValue) -> Result<Self, CdoError> {
        match value {
            JsonValue::Object(local) => Ok(Self { base: None, local }),
            JsonValue::Null => Ok(Self::new()),
            other => Err(CdoError::argument_invalid(
                "options",
                format!("Expected an object, found {other}"),
            )),
        }
    }

    pub fn with_option(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<JsonValue>) {
        self.local.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.local
            .get(name)
            .or_else(|| self.base.as_ref().and_then(|base| base.get(name)))
    }

    /// Whether `name` is overridden by this layer itself
    pub fn is_local(&self, name: &str) -> bool {
        self.local.contains_key(name)
    }

    pub fn base(&self) -> Option<&Rc<OptionLayer>> {
        self.base.as_ref()
    }

    /// All options visible through this layer, local values winning
    pub fn flatten(&self) -> Map<String, JsonValue> {
        let mut merged = self
            .base
            .as_ref()
            .map(|base| base.flatten())
            .unwrap_or_default();
        for (key, value) in &self.local {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = TranslationOptions::from_json(json!({})).unwrap();
        assert_eq!(options, TranslationOptions::default());
        assert_eq!(options.data_part_dim_name, "dataPart");
        assert_eq!(options.type_checking_mode, TypeCheckingMode::Minimum);
        assert_eq!(options.preview_rows, 15);
        assert_eq!(options.preview_columns, 6);
    }

    #[test]
    fn test_index_list_forms() -> Result<(), CdoError> {
        let options = TranslationOptions::from_json(json!({
            "measuresIndexes": 2,
            "plot2DataSeriesIndexes": "-1, 0",
            "readers": [{"names": "series, category", "indexes": [0, 1]}],
        }))?;
        assert_eq!(options.measures_indexes, Some(IndexList::One(2.0)));
        assert_eq!(
            options.plot2_data_series_indexes,
            Some(IndexList::Text("-1, 0".to_string()))
        );
        assert_eq!(options.readers[0].names, vec!["series", "category"]);
        assert_eq!(options.readers[0].indexes, Some(IndexList::from(vec![0, 1])));
        Ok(())
    }

    #[test]
    fn test_type_checking_mode_parse() {
        let options = TranslationOptions::from_json(json!({"typeCheckingMode": "extended"})).unwrap();
        assert_eq!(options.type_checking_mode, TypeCheckingMode::Extended);
        assert!(TranslationOptions::from_json(json!({"typeCheckingMode": "strict"})).is_err());
    }

    #[test]
    fn test_negative_categories_count_is_unset() {
        let options = TranslationOptions {
            categories_count: Some(-2.0),
            ..Default::default()
        };
        assert_eq!(options.requested_categories_count(), None);
        let options = TranslationOptions {
            categories_count: Some(f64::INFINITY),
            ..Default::default()
        };
        assert_eq!(options.requested_categories_count(), None);
        let options = TranslationOptions {
            categories_count: Some(2.0),
            ..Default::default()
        };
        assert_eq!(options.requested_categories_count(), Some(2));
    }

    #[test]
    fn test_layer_lookup_falls_back_to_base() -> Result<(), CdoError> {
        let base = Rc::new(
            OptionLayer::new()
                .with_option("seriesInRows", true)
                .with_option("categoriesCount", 2),
        );
        let layer = OptionLayer::with_base(base.clone()).with_option("categoriesCount", 3);

        assert_eq!(layer.get("seriesInRows"), Some(&json!(true)));
        assert_eq!(layer.get("categoriesCount"), Some(&json!(3)));
        assert!(!layer.is_local("seriesInRows"));
        assert_eq!(base.get("categoriesCount"), Some(&json!(2)));
        assert_eq!(layer.get("missing"), None);

        let options = TranslationOptions::from_layer(&layer)?;
        assert!(options.series_in_rows);
        assert_eq!(options.requested_categories_count(), Some(3));
        Ok(())
    }

    #[test]
    fn test_layer_from_json_requires_object() {
        assert!(OptionLayer::from_json(json!([1, 2])).is_err());
        assert!(OptionLayer::from_json(JsonValue::Null).is_ok());
    }
}
