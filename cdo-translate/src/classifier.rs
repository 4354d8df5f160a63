use cdo_common::{
    types::ColumnType,
    value::{parse_number, Value},
};
use tracing::debug;

use crate::{
    options::TypeCheckingMode,
    source::{ColumnMetadata, SourceTable},
};

/// Declared type tokens trusted to mean a continuous column
const CONTINUOUS_TYPE_TOKENS: &[&str] = &["numeric", "number", "integer"];

fn declares_continuous(metadata: &ColumnMetadata) -> bool {
    metadata.col_type.as_deref().is_some_and(|token| {
        CONTINUOUS_TYPE_TOKENS
            .iter()
            .any(|t| t.eq_ignore_ascii_case(token.trim()))
    })
}

/// Classify every column of `source` as continuous or discrete.
///
/// Metadata is only trusted when it declares a continuous type. Other columns
/// are classified by their first non-null value, scanning rows top to bottom;
/// columns that never show a value stay continuous. In
/// [`TypeCheckingMode::None`] no values are scanned and undeclared columns are
/// discrete.
pub fn classify_columns(source: &SourceTable, mode: TypeCheckingMode) -> Vec<ColumnType> {
    let mut types = source
        .metadata
        .iter()
        .map(|m| {
            if declares_continuous(m) || mode != TypeCheckingMode::None {
                ColumnType::Continuous
            } else {
                ColumnType::Discrete
            }
        })
        .collect::<Vec<_>>();
    if mode == TypeCheckingMode::None {
        return types;
    }

    let mut pending = source
        .metadata
        .iter()
        .enumerate()
        .filter(|(_, m)| !declares_continuous(m))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    for (row_index, row) in source.rows.iter().enumerate() {
        if pending.is_empty() {
            debug!("Column types known after {row_index} rows");
            break;
        }
        pending.retain(|&column| match row.get(column).and_then(Option::as_ref) {
            None => true,
            Some(value) => {
                types[column] = classify_value(value, mode);
                false
            }
        });
    }
    types
}

fn classify_value(value: &Value, mode: TypeCheckingMode) -> ColumnType {
    match value {
        Value::Number(_) | Value::Date(_) => ColumnType::Continuous,
        Value::String(text)
            if mode == TypeCheckingMode::Extended && parse_number(text).is_some() =>
        {
            ColumnType::Continuous
        }
        _ => ColumnType::Discrete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdo_common::value::Cell;
    use cdo_common::types::ColumnType::{Continuous as C, Discrete as D};

    fn source(metadata: Vec<ColumnMetadata>, rows: Vec<Vec<Cell>>) -> SourceTable {
        SourceTable::new(metadata, rows)
    }

    fn s(text: &str) -> Cell {
        Some(Value::string(text))
    }

    fn n(value: f64) -> Cell {
        Some(Value::number(value))
    }

    #[test]
    fn test_all_null_column_is_continuous() {
        let src = source(
            vec![
                ColumnMetadata::new("a"),
                ColumnMetadata::new("b"),
                ColumnMetadata::new("c"),
            ],
            vec![vec![s("x"), n(1.0), None], vec![s("y"), n(2.0), None]],
        );
        assert_eq!(classify_columns(&src, TypeCheckingMode::Minimum), vec![D, C, C]);
    }

    #[test]
    fn test_first_non_null_value_decides() {
        let src = source(
            vec![ColumnMetadata::new("a"), ColumnMetadata::new("b")],
            vec![
                vec![None, s("1")],
                vec![n(3.0), n(4.0)],
                vec![s("late"), None],
            ],
        );
        assert_eq!(classify_columns(&src, TypeCheckingMode::Minimum), vec![C, D]);
        assert_eq!(classify_columns(&src, TypeCheckingMode::Extended), vec![C, C]);
    }

    #[test]
    fn test_metadata_only_trusted_for_continuous() {
        let src = source(
            vec![
                ColumnMetadata::new("a").col_type("NUMERIC"),
                ColumnMetadata::new("b").col_type("string"),
                ColumnMetadata::new("c").col_type("string"),
            ],
            vec![vec![s("x"), n(1.0), None]],
        );
        assert_eq!(classify_columns(&src, TypeCheckingMode::Minimum), vec![C, C, C]);
        assert_eq!(classify_columns(&src, TypeCheckingMode::None), vec![C, D, D]);
    }

    #[test]
    fn test_dates_and_booleans() {
        let src = source(
            vec![ColumnMetadata::new("d"), ColumnMetadata::new("b")],
            vec![vec![Value::date(2024, 1, 31), Some(Value::Boolean(true))]],
        );
        assert_eq!(classify_columns(&src, TypeCheckingMode::Minimum), vec![C, D]);
    }

    #[test]
    fn test_short_rows_read_as_null() {
        let src = source(
            vec![ColumnMetadata::new("a"), ColumnMetadata::new("b")],
            vec![vec![s("x")], vec![s("y"), s("z")]],
        );
        assert_eq!(classify_columns(&src, TypeCheckingMode::Minimum), vec![D, D]);
    }
}
