use std::{cmp::Ordering, collections::HashSet, fmt, rc::Rc, str::FromStr};

use cdo_common::{error::CdoError, types::SortDirection};
use indexmap::IndexMap;
use itertools::Itertools;
use tracing::debug;

use super::{ChildSpec, DataId, DataTree};
use crate::{atom::Atom, complex::Datum, complex_type::ComplexType};

/// One dimension of a grouping level, with an optional sort direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingDimension {
    pub name: String,
    pub direction: Option<SortDirection>,
}

impl GroupingDimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: None,
        }
    }

    pub fn sorted(self, direction: SortDirection) -> Self {
        Self {
            direction: Some(direction),
            ..self
        }
    }
}

/// Dimensions whose atom combinations form the children of one tree level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingLevel {
    pub dimensions: Vec<GroupingDimension>,
}

impl GroupingLevel {
    pub fn new(dimensions: Vec<GroupingDimension>) -> Self {
        Self { dimensions }
    }

    pub fn is_sorted(&self) -> bool {
        self.dimensions.iter().any(|d| d.direction.is_some())
    }

    fn compare(&self, a: &[Rc<Atom>], b: &[Rc<Atom>]) -> Ordering {
        self.dimensions
            .iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(dim, (a, b))| match dim.direction {
                None => Ordering::Equal,
                Some(SortDirection::Asc) => Atom::compare(a, b),
                Some(SortDirection::Desc) => Atom::compare(b, a),
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// A multi-level grouping.
///
/// Textual form: levels separated by `,`, dimensions within a level by `|`,
/// each dimension optionally followed by `asc` or `desc`. For example
/// `"series, category|category2 desc"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingSpec {
    levels: Vec<GroupingLevel>,
}

impl GroupingSpec {
    pub fn new(levels: Vec<GroupingLevel>) -> Result<Self, CdoError> {
        if levels.is_empty() || levels.iter().any(|l| l.dimensions.is_empty()) {
            return Err(CdoError::argument_required("groupingSpec"));
        }
        Ok(Self { levels })
    }

    /// One level per dimension name, unsorted
    pub fn by<S: AsRef<str>>(names: &[S]) -> Result<Self, CdoError> {
        Self::new(
            names
                .iter()
                .map(|n| GroupingLevel::new(vec![GroupingDimension::new(n.as_ref())]))
                .collect(),
        )
    }

    pub fn levels(&self) -> &[GroupingLevel] {
        &self.levels
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.levels
            .iter()
            .flat_map(|l| l.dimensions.iter().map(|d| d.name.as_str()))
    }

    /// Check that every dimension is defined and used only once
    pub fn validate(&self, complex_type: &ComplexType) -> Result<(), CdoError> {
        let mut seen = HashSet::new();
        for name in self.dimension_names() {
            complex_type.dimension(name)?;
            if !seen.insert(name) {
                return Err(CdoError::argument_invalid(
                    "groupingSpec",
                    format!("Dimension '{name}' is used more than once"),
                ));
            }
        }
        Ok(())
    }
}

impl FromStr for GroupingSpec {
    type Err = CdoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let levels = s
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|level| {
                level
                    .split('|')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(parse_grouping_dimension)
                    .collect::<Result<Vec<_>, _>>()
                    .map(GroupingLevel::new)
            })
            .collect::<Result<Vec<_>, CdoError>>()?;
        Self::new(levels)
    }
}

fn parse_grouping_dimension(text: &str) -> Result<GroupingDimension, CdoError> {
    let mut parts = text.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| CdoError::argument_required("groupingSpec"))?;
    let direction = parts
        .next()
        .map(|d| {
            SortDirection::from_str(d).map_err(|_| {
                CdoError::argument_invalid(
                    "groupingSpec",
                    format!("Invalid sort direction '{d}' for dimension '{name}'"),
                )
            })
        })
        .transpose()?;
    if let Some(extra) = parts.next() {
        return Err(CdoError::argument_invalid(
            "groupingSpec",
            format!("Unexpected '{extra}' after dimension '{name}'"),
        ));
    }
    Ok(GroupingDimension {
        name: name.to_string(),
        direction,
    })
}

impl fmt::Display for GroupingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .levels
            .iter()
            .map(|level| {
                level
                    .dimensions
                    .iter()
                    .map(|d| match d.direction {
                        None => d.name.clone(),
                        Some(direction) => format!("{} {direction}", d.name),
                    })
                    .join("|")
            })
            .join(", ");
        f.write_str(&text)
    }
}

/// Datum filters applied before grouping. `None` accepts any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingOptions {
    pub visible: Option<bool>,
    pub is_null: Option<bool>,
}

impl GroupingOptions {
    pub fn visible(self, visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..self
        }
    }

    pub fn is_null(self, is_null: bool) -> Self {
        Self {
            is_null: Some(is_null),
            ..self
        }
    }

    fn accepts(&self, datum: &Datum) -> bool {
        self.visible.map_or(true, |v| datum.is_visible() == v)
            && self.is_null.map_or(true, |n| datum.is_null() == n)
    }

    fn cache_key(&self) -> String {
        format!("visible={:?};isNull={:?}", self.visible, self.is_null)
    }
}

impl DataTree {
    /// Group the datums of a node into a new tree, one level per grouping
    /// level.
    ///
    /// The result is a link-parented root holding the filtered datums. Children
    /// follow first-occurrence order unless a level requests sorting. Results
    /// are cached per node until its datums change or its children are
    /// disposed.
    #[tracing::instrument(skip_all, fields(spec = %spec))]
    pub fn group_by(
        &mut self,
        id: DataId,
        spec: &GroupingSpec,
        options: &GroupingOptions,
    ) -> Result<DataId, CdoError> {
        spec.validate(&self.complex_type)?;
        let cache_key = format!("{spec}#{}", options.cache_key());
        let node = self.live_node(id)?;
        if let Some(&cached) = node
            .group_by_cache
            .as_ref()
            .and_then(|cache| cache.get(&cache_key))
        {
            if self.node(cached).is_ok_and(|n| !n.is_disposed()) {
                debug!("Reusing cached grouping");
                return Ok(cached);
            }
        }

        let datums = node
            .datums
            .values()
            .filter(|d| options.accepts(d))
            .cloned()
            .collect::<Vec<_>>();
        debug!("Grouping {} datums", datums.len());
        let root = self.add_link_root(id, datums.clone())?;
        self.group_level(root, spec.levels(), datums)?;

        if let Some(cache) = self.live_node_mut(id)?.group_by_cache.as_mut() {
            cache.insert(cache_key, root);
        }
        Ok(root)
    }

    fn group_level(
        &mut self,
        parent: DataId,
        levels: &[GroupingLevel],
        datums: Vec<Rc<Datum>>,
    ) -> Result<(), CdoError> {
        let Some((level, rest)) = levels.split_first() else {
            return Ok(());
        };

        let mut partitions: IndexMap<Vec<usize>, (Vec<Rc<Atom>>, Vec<Rc<Datum>>)> =
            IndexMap::new();
        for datum in datums {
            let atoms = level
                .dimensions
                .iter()
                .map(|d| {
                    datum.atom(&d.name).cloned().ok_or_else(|| {
                        CdoError::argument_invalid(
                            "groupingSpec",
                            format!("Undefined dimension '{}'", d.name),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let key = atoms.iter().map(|a| a.id()).collect::<Vec<_>>();
            partitions
                .entry(key)
                .or_insert_with(|| (atoms, Vec::new()))
                .1
                .push(datum);
        }

        let mut partitions = partitions.into_values().collect::<Vec<_>>();
        if level.is_sorted() {
            partitions.sort_by(|a, b| level.compare(&a.0, &b.0));
        }
        for (atoms, datums) in partitions {
            let child = self.add_child(
                parent,
                ChildSpec::new().atoms(atoms).datums(datums.clone()),
            )?;
            self.group_level(child, rest, datums)?;
        }
        Ok(())
    }
}
