use cdo_common::value::Cell;
use serde::{Deserialize, Serialize};

/// Description of one source column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub col_name: String,
    #[serde(default)]
    pub col_label: Option<String>,
    /// Declared type token such as `"numeric"` or `"string"`
    #[serde(default)]
    pub col_type: Option<String>,
}

impl ColumnMetadata {
    pub fn new(col_name: impl Into<String>) -> Self {
        Self {
            col_name: col_name.into(),
            ..Default::default()
        }
    }

    pub fn col_type(self, col_type: impl Into<String>) -> Self {
        Self {
            col_type: Some(col_type.into()),
            ..self
        }
    }

    pub fn col_label(self, col_label: impl Into<String>) -> Self {
        Self {
            col_label: Some(col_label.into()),
            ..self
        }
    }

    /// The label, falling back to the name
    pub fn label(&self) -> &str {
        self.col_label.as_deref().unwrap_or(&self.col_name)
    }
}

/// A relational source: column metadata plus row-major cells.
///
/// Rows shorter than the metadata read as null in the missing columns; extra
/// cells are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub metadata: Vec<ColumnMetadata>,
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

impl SourceTable {
    pub fn new(metadata: Vec<ColumnMetadata>, rows: Vec<Vec<Cell>>) -> Self {
        Self { metadata, rows }
    }

    pub fn column_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&cdo_common::value::Value> {
        self.rows.get(row)?.get(column)?.as_ref()
    }
}
