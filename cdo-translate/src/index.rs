use std::collections::HashSet;

use cdo_common::{error::CdoError, value::parse_number};
use serde_json::Value as JsonValue;

use crate::options::IndexList;

/// Parse an index list into distinct indexes within `[min, max]`.
///
/// Negative entries count from the end: `-1` is `max`, `-n` is `max + 1 - n`.
/// Entries that are not integers, or that fall outside the range after
/// wrapping, fail with an error naming `arg_name` and the offending value.
/// Duplicates are dropped, keeping first occurrences. An empty list yields
/// `None`.
pub fn parse_distinct_index_array(
    arg_name: &str,
    list: &IndexList,
    min: i64,
    max: i64,
) -> Result<Option<Vec<usize>>, CdoError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in raw_indexes(list) {
        let index = item.to_integer(arg_name)?;
        let resolved = if index < 0 { max + 1 + index } else { index };
        if resolved < min || resolved > max {
            return Err(CdoError::argument_invalid(
                arg_name,
                format!("Index value '{index}' is out of range"),
            ));
        }
        let resolved = resolved as usize;
        if seen.insert(resolved) {
            out.push(resolved);
        }
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}

/// Check that every entry of an index list is an integer, before the range
/// it will be resolved against is known
pub fn check_index_list(arg_name: &str, list: &IndexList) -> Result<(), CdoError> {
    raw_indexes(list)
        .iter()
        .try_for_each(|item| item.to_integer(arg_name).map(|_| ()))
}

fn raw_indexes(list: &IndexList) -> Vec<RawIndex> {
    match list {
        IndexList::One(n) => vec![RawIndex::Number(*n)],
        IndexList::Many(items) => items.iter().map(RawIndex::from_json).collect(),
        IndexList::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| RawIndex::Text(t.to_string()))
            .collect(),
    }
}

enum RawIndex {
    Number(f64),
    Text(String),
}

impl RawIndex {
    fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Number(n) => n
                .as_f64()
                .map_or_else(|| RawIndex::Text(n.to_string()), RawIndex::Number),
            JsonValue::String(s) => RawIndex::Text(s.clone()),
            other => RawIndex::Text(other.to_string()),
        }
    }

    fn to_integer(&self, arg_name: &str) -> Result<i64, CdoError> {
        let n = match self {
            RawIndex::Number(n) => Some(*n),
            RawIndex::Text(t) => parse_number(t),
        };
        n.filter(|n| n.is_finite() && n.fract() == 0.0)
            .map(|n| n as i64)
            .ok_or_else(|| {
                CdoError::argument_invalid(
                    arg_name,
                    format!("Index value '{self}' is not an integer"),
                )
            })
    }
}

impl std::fmt::Display for RawIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawIndex::Number(n) => write!(f, "{n}"),
            RawIndex::Text(t) => f.write_str(t),
        }
    }
}

/// Keys of the series placed at `indexes` among `series_keys`.
///
/// `series_keys` lists the distinct series keys in first-occurrence order.
pub fn resolve_plot2_series_key_set(
    series_keys: &[String],
    indexes: &IndexList,
) -> Result<HashSet<String>, CdoError> {
    let count = series_keys.len() as i64;
    let resolved =
        parse_distinct_index_array("plot2DataSeriesIndexes", indexes, 0, count - 1)?
            .unwrap_or_default();
    Ok(resolved
        .into_iter()
        .map(|i| series_keys[i].clone())
        .collect())
}
