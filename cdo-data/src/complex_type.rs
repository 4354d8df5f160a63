use std::{collections::HashMap, fmt, rc::Rc};

use cdo_common::{error::CdoError, value::Value};
use indexmap::IndexMap;

use crate::{
    atom::Atom,
    dimension::Dimension,
    dimension_type::{DimensionSpec, DimensionType},
};

/// Signature of a calculation.
///
/// A calculation reads the atoms gathered so far for the complex being built
/// and writes values for the dimensions it claims.
pub type CalculateFn =
    dyn Fn(&CalculationScope<'_>, &mut CalculatedValues<'_>) -> Result<(), CdoError>;

/// A registered calculation and the dimensions it produces
#[derive(Clone)]
pub struct Calculation {
    names: Vec<String>,
    calculate: Rc<CalculateFn>,
}

impl Calculation {
    pub fn new<F>(names: impl IntoIterator<Item = impl Into<String>>, calculate: F) -> Self
    where
        F: Fn(&CalculationScope<'_>, &mut CalculatedValues<'_>) -> Result<(), CdoError> + 'static,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            calculate: Rc::new(calculate),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn calculate(
        &self,
        scope: &CalculationScope<'_>,
        out: &mut CalculatedValues<'_>,
    ) -> Result<(), CdoError> {
        (self.calculate)(scope, out)
    }
}

impl fmt::Debug for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calculation")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// Read-only view handed to calculations
pub struct CalculationScope<'a> {
    atoms: &'a IndexMap<String, Rc<Atom>>,
    dimensions: &'a IndexMap<String, Dimension>,
}

impl<'a> CalculationScope<'a> {
    pub fn new(
        atoms: &'a IndexMap<String, Rc<Atom>>,
        dimensions: &'a IndexMap<String, Dimension>,
    ) -> Self {
        Self { atoms, dimensions }
    }

    /// Atom read or calculated earlier in the current pass
    pub fn atom(&self, name: &str) -> Option<&Rc<Atom>> {
        self.atoms.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.atom(name).and_then(|atom| atom.value())
    }

    /// Atom space of a dimension of the owning data
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }
}

/// Output of a single calculation, restricted to the names it claimed
#[derive(Debug)]
pub struct CalculatedValues<'a> {
    names: &'a [String],
    values: IndexMap<String, Option<Value>>,
}

impl<'a> CalculatedValues<'a> {
    pub fn new(names: &'a [String]) -> Self {
        Self {
            names,
            values: IndexMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: Option<Value>) -> Result<(), CdoError> {
        if !self.names.iter().any(|n| n == name) {
            return Err(CdoError::operation_invalid(format!(
                "Cannot set dimension '{name}' from a calculation that does not claim it"
            )));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn into_values(self) -> IndexMap<String, Option<Value>> {
        self.values
    }
}

/// Catalog of the dimensions of a chart's data, in definition order, plus the
/// calculations that derive some of them.
#[derive(Debug, Default)]
pub struct ComplexType {
    dimensions: Vec<Rc<DimensionType>>,
    index_by_name: HashMap<String, usize>,
    calculations: Vec<Calculation>,
    calculated_by: HashMap<String, usize>,
}

impl ComplexType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension.
    ///
    /// Grouped dimensions are kept together in ascending level order: the new
    /// dimension goes before the first same-group member of a higher level, else
    /// right after the last same-group member, else at the end.
    pub fn add_dimension(
        &mut self,
        name: &str,
        spec: DimensionSpec,
    ) -> Result<Rc<DimensionType>, CdoError> {
        if self.index_by_name.contains_key(name) {
            return Err(CdoError::argument_invalid(
                "name",
                format!("A dimension with name '{name}' is already defined"),
            ));
        }
        let dim_type = Rc::new(DimensionType::new(name, spec)?);

        let position = match dim_type.group() {
            None => self.dimensions.len(),
            Some(group) => {
                let level = dim_type.group_level();
                let mut after_last = None;
                let mut before_higher = None;
                for (i, existing) in self.dimensions.iter().enumerate() {
                    if existing.group() != Some(group) {
                        continue;
                    }
                    if existing.group_level() > level {
                        before_higher = Some(i);
                        break;
                    }
                    after_last = Some(i + 1);
                }
                before_higher
                    .or(after_last)
                    .unwrap_or(self.dimensions.len())
            }
        };

        self.dimensions.insert(position, dim_type.clone());
        self.reindex();
        Ok(dim_type)
    }

    fn reindex(&mut self) {
        self.index_by_name = self
            .dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name().to_string(), i))
            .collect();
    }

    pub fn dimension(&self, name: &str) -> Result<&Rc<DimensionType>, CdoError> {
        self.dimension_opt(name).ok_or_else(|| {
            CdoError::argument_invalid("name", format!("Undefined dimension '{name}'"))
        })
    }

    pub fn dimension_opt(&self, name: &str) -> Option<&Rc<DimensionType>> {
        self.index_by_name.get(name).map(|&i| &self.dimensions[i])
    }

    /// All dimension types in definition order
    pub fn dimensions(&self) -> &[Rc<DimensionType>] {
        &self.dimensions
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name())
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Dimensions of a group, in ascending level order
    pub fn group_dimensions(&self, group: &str) -> Result<Vec<Rc<DimensionType>>, CdoError> {
        let dims = self
            .dimensions
            .iter()
            .filter(|d| d.group() == Some(group))
            .cloned()
            .collect::<Vec<_>>();
        if dims.is_empty() {
            return Err(CdoError::operation_invalid(format!(
                "There is no dimension group with name '{group}'"
            )));
        }
        Ok(dims)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.dimensions.iter().any(|d| d.group() == Some(group))
    }

    /// Register a calculation producing the dimensions in `calculation.names()`.
    ///
    /// Each named dimension must be defined and may be claimed by only one
    /// calculation.
    pub fn add_calculation(&mut self, calculation: Calculation) -> Result<(), CdoError> {
        if calculation.names().is_empty() {
            return Err(CdoError::argument_required("names"));
        }
        for name in calculation.names() {
            if !self.index_by_name.contains_key(name) {
                return Err(CdoError::argument_invalid(
                    "names",
                    format!("Undefined dimension '{name}'"),
                ));
            }
            if self.calculated_by.contains_key(name) {
                return Err(CdoError::argument_invalid(
                    "names",
                    format!("Dimension '{name}' is already being calculated"),
                ));
            }
        }
        let index = self.calculations.len();
        for name in calculation.names() {
            self.calculated_by.insert(name.clone(), index);
        }
        self.calculations.push(calculation);
        Ok(())
    }

    pub fn is_calculated(&self, name: &str) -> bool {
        self.calculated_by.contains_key(name)
    }

    /// Calculations in registration order
    pub fn calculations(&self) -> &[Calculation] {
        &self.calculations
    }

    /// Stable sort of items by the definition order of the dimension each one
    /// names. Unknown names go last, keeping their relative order.
    pub fn sort_dimension_names_by<T>(&self, items: &mut [T], name_key: impl Fn(&T) -> &str) {
        items.sort_by_key(|item| {
            self.index_by_name
                .get(name_key(item))
                .copied()
                .unwrap_or(usize::MAX)
        });
    }

    pub fn sort_dimension_names(&self, names: &mut [String]) {
        self.sort_dimension_names_by(names, |n| n.as_str());
    }
}
