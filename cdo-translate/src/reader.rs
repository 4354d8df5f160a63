use std::collections::HashSet;

use cdo_common::error::CdoError;
use cdo_data::dimension_type::{build_indexed_id, split_indexed_id};
use tracing::debug;

use crate::{
    index::parse_distinct_index_array,
    layout::{ColumnGroup, RelationalLayout},
    options::ReaderSpec,
};

/// Binding of one dimension to one logical column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionReader {
    pub name: String,
    pub logical_index: usize,
}

/// The set of dimension readers of a translation
#[derive(Debug, Clone, Default)]
pub struct ReaderPlan {
    column_count: usize,
    readers: Vec<DimensionReader>,
    names: HashSet<String>,
    occupied: HashSet<usize>,
}

impl ReaderPlan {
    pub fn new(column_count: usize) -> Self {
        Self {
            column_count,
            ..Default::default()
        }
    }

    /// Readers in definition order
    pub fn readers(&self) -> &[DimensionReader] {
        &self.readers
    }

    pub fn is_read(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_occupied(&self, logical_index: usize) -> bool {
        self.occupied.contains(&logical_index)
    }

    /// Names of the dimensions read from a logical column
    pub fn names_at(&self, logical_index: usize) -> impl Iterator<Item = &str> {
        self.readers
            .iter()
            .filter(move |r| r.logical_index == logical_index)
            .map(|r| r.name.as_str())
    }

    /// Bind `names` to logical columns.
    ///
    /// Names without an index take the next free columns. When there are more
    /// indexes than names, the last name is taken as the first level of a
    /// group and the extra indexes bind its following levels.
    pub fn def_reader(&mut self, names: &[String], indexes: &[usize]) -> Result<(), CdoError> {
        let Some(last) = names.last() else {
            return Err(CdoError::argument_required("names"));
        };
        let mut names = names.to_vec();
        if indexes.len() > names.len() {
            let (group, level) = split_indexed_id(last);
            let group = group.ok_or_else(|| {
                CdoError::argument_invalid(
                    "names",
                    format!("Reader name '{last}' cannot be expanded to a dimension group"),
                )
            })?;
            let extra = indexes.len() - names.len();
            names.extend((1..=extra).map(|k| build_indexed_id(&group, level + k)));
        }

        let mut next_free = 0;
        for (i, name) in names.iter().enumerate() {
            let index = match indexes.get(i) {
                Some(&index) => index,
                None => {
                    while self.occupied.contains(&next_free) {
                        next_free += 1;
                    }
                    next_free
                }
            };
            self.bind(name, index)?;
        }
        Ok(())
    }

    /// Bind user readers given as options
    pub fn def_user_reader(&mut self, spec: &ReaderSpec) -> Result<(), CdoError> {
        let indexes = match &spec.indexes {
            Some(list) => parse_distinct_index_array(
                "readers",
                list,
                0,
                self.column_count as i64 - 1,
            )?
            .unwrap_or_default(),
            None => Vec::new(),
        };
        self.def_reader(&spec.names, &indexes)
    }

    fn bind(&mut self, name: &str, logical_index: usize) -> Result<(), CdoError> {
        if logical_index >= self.column_count {
            return Err(CdoError::argument_invalid(
                "readers",
                format!("Logical column {logical_index} of dimension '{name}' is out of range"),
            ));
        }
        if !self.names.insert(name.to_string()) {
            return Err(CdoError::argument_invalid(
                "readers",
                format!("Dimension '{name}' is already being read"),
            ));
        }
        self.occupied.insert(logical_index);
        self.readers.push(DimensionReader {
            name: name.to_string(),
            logical_index,
        });
        Ok(())
    }

    /// Bind the free columns of a layout group to successive levels of its
    /// dimension group, skipping levels already read and names in `reserved`.
    ///
    /// The cursor starts at the segment start and only moves forward, so
    /// successive levels read successive free columns.
    pub fn bind_group(
        &mut self,
        layout: &RelationalLayout,
        group: ColumnGroup,
        reserved: &HashSet<String>,
    ) -> Result<(), CdoError> {
        let segment = layout.segment(group);
        let prefix = group.dimension_group();
        let mut cursor = segment.start;
        let mut level = 0;
        loop {
            let name = build_indexed_id(prefix, level);
            level += 1;
            if self.is_read(&name) || reserved.contains(&name) {
                continue;
            }
            while cursor < segment.end && self.is_occupied(cursor) {
                cursor += 1;
            }
            if cursor >= segment.end {
                break;
            }
            debug!("Binding dimension '{name}' to logical column {cursor}");
            self.bind(&name, cursor)?;
            cursor += 1;
        }
        Ok(())
    }
}
