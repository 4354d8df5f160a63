use std::rc::Rc;

use cdo_common::{error::CdoError, value::Value};
use indexmap::IndexMap;

use super::{DataId, DataTree};
use crate::{atom::Atom, complex::Datum};

/// Conditions a datum must satisfy to be returned by [`DataTree::datums`].
///
/// Atom conditions match any of the listed values of a dimension and are
/// combined across dimensions with "and". Values that were never interned
/// match nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatumFilter {
    atoms: IndexMap<String, Vec<Option<Value>>>,
    visible: Option<bool>,
    selected: Option<bool>,
    is_null: Option<bool>,
}

impl DatumFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_in(
        mut self,
        dimension: impl Into<String>,
        values: impl IntoIterator<Item = Option<Value>>,
    ) -> Self {
        self.atoms
            .entry(dimension.into())
            .or_default()
            .extend(values);
        self
    }

    pub fn where_eq(self, dimension: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_in(dimension, [Some(value.into())])
    }

    pub fn visible(self, visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..self
        }
    }

    pub fn selected(self, selected: bool) -> Self {
        Self {
            selected: Some(selected),
            ..self
        }
    }

    pub fn is_null(self, is_null: bool) -> Self {
        Self {
            is_null: Some(is_null),
            ..self
        }
    }
}

struct ResolvedFilter<'a> {
    atoms: Vec<(usize, Vec<Rc<Atom>>)>,
    filter: &'a DatumFilter,
}

impl ResolvedFilter<'_> {
    fn accepts(&self, datum: &Datum) -> bool {
        let filter = self.filter;
        filter.visible.map_or(true, |v| datum.is_visible() == v)
            && filter.selected.map_or(true, |s| datum.is_selected() == s)
            && filter.is_null.map_or(true, |n| datum.is_null() == n)
            && self.atoms.iter().all(|(index, atoms)| {
                datum
                    .atoms()
                    .nth(*index)
                    .is_some_and(|(_, own)| atoms.iter().any(|a| Rc::ptr_eq(a, own)))
            })
    }
}

impl DataTree {
    fn resolve_filter<'a>(&self, filter: &'a DatumFilter) -> Result<ResolvedFilter<'a>, CdoError> {
        let atoms = filter
            .atoms
            .iter()
            .map(|(name, values)| {
                let dimension = self.dimension(name)?;
                let index = self
                    .complex_type
                    .dimension_index(name)
                    .ok_or_else(|| CdoError::argument_invalid("name", format!("Undefined dimension '{name}'")))?;
                let atoms = values
                    .iter()
                    .filter_map(|v| dimension.find(v.as_ref()))
                    .collect();
                Ok((index, atoms))
            })
            .collect::<Result<Vec<_>, CdoError>>()?;
        Ok(ResolvedFilter { atoms, filter })
    }

    /// Datums of a node that satisfy `filter`, in the node's order
    pub fn datums(&self, id: DataId, filter: &DatumFilter) -> Result<Vec<Rc<Datum>>, CdoError> {
        let resolved = self.resolve_filter(filter)?;
        Ok(self
            .live_node(id)?
            .datums
            .values()
            .filter(|d| resolved.accepts(d))
            .cloned()
            .collect())
    }

    /// Filtered view of a node: a new link-parented root holding the datums
    /// that satisfy `filter`
    pub fn filter_view(&mut self, id: DataId, filter: &DatumFilter) -> Result<DataId, CdoError> {
        let datums = self.datums(id, filter)?;
        self.add_link_root(id, datums)
    }

    /// Distinct atoms of a dimension among the datums of a node, in
    /// first-occurrence order
    pub fn atoms_of(&self, id: DataId, name: &str) -> Result<Vec<Rc<Atom>>, CdoError> {
        let index = self
            .complex_type
            .dimension(name)
            .map(|_| self.complex_type.dimension_index(name))?
            .unwrap_or_default();
        let mut seen = IndexMap::new();
        for datum in self.live_node(id)?.datums.values() {
            if let Some((_, atom)) = datum.atoms().nth(index) {
                seen.entry(atom.id()).or_insert_with(|| atom.clone());
            }
        }
        Ok(seen.into_values().collect())
    }

    /// Sum of the numeric values of a dimension over a node's datums.
    ///
    /// Returns `None` when no datum has a numeric value. Results are memoized
    /// per node against the tree version.
    pub fn dimension_sum(
        &self,
        id: DataId,
        name: &str,
        visible_only: bool,
    ) -> Result<Option<f64>, CdoError> {
        let node = self.live_node(id)?;
        self.complex_type.dimension(name)?;
        let cache_key = (name.to_string(), visible_only);
        if let Some(&(version, sum)) = node.sums.borrow().get(&cache_key) {
            if version == self.version {
                return Ok(sum);
            }
        }

        let sum = node
            .datums
            .values()
            .filter(|d| !visible_only || d.is_visible())
            .filter_map(|d| d.value(name).and_then(Value::as_f64))
            .fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v));
        node.sums
            .borrow_mut()
            .insert(cache_key, (self.version, sum));
        Ok(sum)
    }
}
