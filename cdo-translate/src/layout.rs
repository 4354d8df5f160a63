use std::ops::Range;

use cdo_common::{error::CdoError, types::ColumnType};
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::{
    index::parse_distinct_index_array,
    options::TranslationOptions,
    source::ColumnMetadata,
};

/// Role of a logical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display)]
pub enum ColumnGroup {
    #[strum(serialize = "S")]
    Series,
    #[strum(serialize = "C")]
    Category,
    #[strum(serialize = "M")]
    Measure,
}

impl ColumnGroup {
    /// Dimension group auto-bound to columns of this role
    pub fn dimension_group(&self) -> &'static str {
        match self {
            ColumnGroup::Series => "series",
            ColumnGroup::Category => "category",
            ColumnGroup::Measure => "value",
        }
    }
}

/// Partition of source columns into series, category and measure groups,
/// and the permutation producing the logical row.
///
/// The logical row always lists series columns first, then categories, then
/// measures: `permutation[logical] = source column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationalLayout {
    series_count: usize,
    categories_count: usize,
    measures_count: usize,
    permutation: Vec<usize>,
}

impl RelationalLayout {
    /// Resolve the layout of `column_types.len()` columns.
    ///
    /// Rules, first match wins:
    /// 1. explicit `measuresIndexes` are the measures;
    /// 2. tables of 1 to 3 columns, with `categoriesCount` unset or 1, read
    ///    their last column as the only measure;
    /// 3. a `categoriesCount` covering every column makes all columns
    ///    categories;
    /// 4. otherwise continuous columns are measures, at most
    ///    `columns - categoriesCount` of them.
    ///
    /// The remaining discrete columns are split into categories and series.
    /// Without a requested category count at most one series column is
    /// created, and only when two or more discrete columns remain.
    pub fn resolve(
        column_types: &[ColumnType],
        options: &TranslationOptions,
    ) -> Result<Self, CdoError> {
        let j = column_types.len();
        let requested_c = options.requested_categories_count();

        let explicit = match &options.measures_indexes {
            Some(list) => {
                parse_distinct_index_array("measuresIndexes", list, 0, j as i64 - 1)?
            }
            None => None,
        };

        let measures = match explicit {
            Some(measures) => measures,
            None if (1..=3).contains(&j) && matches!(requested_c, None | Some(1)) => {
                vec![j - 1]
            }
            None => match requested_c {
                Some(c) if c >= j => Vec::new(),
                _ => {
                    let max = requested_c.map_or(j, |c| j - c);
                    column_types
                        .iter()
                        .enumerate()
                        .filter(|(_, t)| t.is_continuous())
                        .map(|(i, _)| i)
                        .take(max)
                        .collect()
                }
            },
        };

        let m = measures.len();
        let d = j - m;
        let (s, c) = match requested_c {
            Some(requested) => {
                let c = requested.min(d);
                (d - c, c)
            }
            None => {
                let s = usize::from(d > 1);
                (s, d - s)
            }
        };

        // reserved measure columns leave the pool regardless of their order
        let (series, categories) = {
            let mut available = (0..j).filter(|i| !measures.contains(i));
            let mut take = |n: usize| available.by_ref().take(n).collect::<Vec<_>>();
            if options.series_in_rows {
                let categories = take(c);
                (take(s), categories)
            } else {
                let series = take(s);
                (series, take(c))
            }
        };

        let permutation = series
            .into_iter()
            .chain(categories)
            .chain(measures)
            .collect::<Vec<_>>();
        debug!("Resolved layout S={s} C={c} M={m} permutation={permutation:?}");

        Ok(Self {
            series_count: s,
            categories_count: c,
            measures_count: m,
            permutation,
        })
    }

    pub fn series_count(&self) -> usize {
        self.series_count
    }

    pub fn categories_count(&self) -> usize {
        self.categories_count
    }

    pub fn measures_count(&self) -> usize {
        self.measures_count
    }

    pub fn column_count(&self) -> usize {
        self.permutation.len()
    }

    /// Source column of each logical position
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Logical positions occupied by a group
    pub fn segment(&self, group: ColumnGroup) -> Range<usize> {
        let s = self.series_count;
        let c = self.categories_count;
        match group {
            ColumnGroup::Series => 0..s,
            ColumnGroup::Category => s..s + c,
            ColumnGroup::Measure => s + c..s + c + self.measures_count,
        }
    }

    pub fn group_of(&self, logical: usize) -> Option<ColumnGroup> {
        [ColumnGroup::Series, ColumnGroup::Category, ColumnGroup::Measure]
            .into_iter()
            .find(|g| self.segment(*g).contains(&logical))
    }

    /// Describe each logical position using the source metadata
    pub fn logical_columns(
        &self,
        metadata: &[ColumnMetadata],
        column_types: &[ColumnType],
    ) -> Vec<LogicalColumn> {
        self.permutation
            .iter()
            .enumerate()
            .filter_map(|(logical, &source)| {
                let meta = metadata.get(source)?;
                Some(LogicalColumn {
                    index: logical,
                    source_index: source,
                    group: self.group_of(logical)?,
                    name: meta.col_name.clone(),
                    label: meta.label().to_string(),
                    column_type: *column_types.get(source)?,
                })
            })
            .collect()
    }
}

/// One position of the logical row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalColumn {
    pub index: usize,
    pub source_index: usize,
    pub group: ColumnGroup,
    pub name: String,
    pub label: String,
    pub column_type: ColumnType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::IndexList;
    use cdo_common::types::ColumnType::{Continuous as C, Discrete as D};

    #[test]
    fn test_segments() -> Result<(), CdoError> {
        let layout = RelationalLayout::resolve(&[D, D, D, C, C], &TranslationOptions::default())?;
        assert_eq!(layout.segment(ColumnGroup::Series), 0..1);
        assert_eq!(layout.segment(ColumnGroup::Category), 1..3);
        assert_eq!(layout.segment(ColumnGroup::Measure), 3..5);
        assert_eq!(layout.group_of(2), Some(ColumnGroup::Category));
        assert_eq!(layout.group_of(5), None);
        Ok(())
    }

    #[test]
    fn test_explicit_measures_keep_given_order() -> Result<(), CdoError> {
        let options = TranslationOptions {
            measures_indexes: Some(IndexList::from(vec![3, 0])),
            ..Default::default()
        };
        let layout = RelationalLayout::resolve(&[C, D, D, C, D], &options)?;
        assert_eq!(layout.measures_count(), 2);
        assert_eq!(layout.permutation(), &[1, 2, 4, 3, 0]);
        Ok(())
    }

    #[test]
    fn test_out_of_range_measure_index() {
        let options = TranslationOptions {
            measures_indexes: Some(IndexList::from(7)),
            ..Default::default()
        };
        let err = RelationalLayout::resolve(&[D, D, C], &options).unwrap_err();
        assert_eq!(err.argument_name(), Some("measuresIndexes"));
    }

    #[test]
    fn test_logical_columns() -> Result<(), CdoError> {
        let metadata = vec![
            ColumnMetadata::new("value").col_type("numeric"),
            ColumnMetadata::new("region").col_label("Region"),
            ColumnMetadata::new("year"),
        ];
        let types = [C, D, D];
        let options = TranslationOptions {
            categories_count: Some(1.0),
            measures_indexes: Some(IndexList::from(0)),
            ..Default::default()
        };
        let layout = RelationalLayout::resolve(&types, &options)?;
        let columns = layout.logical_columns(&metadata, &types);
        let summary = columns
            .iter()
            .map(|c| (c.group, c.source_index, c.label.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                (ColumnGroup::Series, 1, "Region"),
                (ColumnGroup::Category, 2, "year"),
                (ColumnGroup::Measure, 0, "value"),
            ]
        );
        Ok(())
    }
}
