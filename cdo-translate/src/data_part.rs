use std::{cell::RefCell, collections::HashSet, rc::Rc};

use cdo_common::{error::CdoError, value::Value};
use cdo_data::{complex_type::Calculation, dimension::Dimension};
use tracing::debug;

use crate::{index::resolve_plot2_series_key_set, options::IndexList};

/// Data part of series drawn on the main plot
pub const MAIN_PART: &str = "0";
/// Data part of series drawn on the second plot
pub const SECOND_PART: &str = "1";

/// Routes series to the main or second plot through a calculated data part
/// dimension.
///
/// The set of second-plot series keys can only be computed once every series
/// value is known, so it is resolved on [`DataPart::prime_with_keys`] or,
/// failing that, on the first calculation.
#[derive(Debug, Clone)]
pub struct DataPart {
    dim_name: String,
    series_dim_name: String,
    indexes: IndexList,
    second_keys: Rc<RefCell<Option<Rc<HashSet<String>>>>>,
}

impl DataPart {
    pub fn new(
        dim_name: impl Into<String>,
        series_dim_name: impl Into<String>,
        indexes: IndexList,
    ) -> Self {
        Self {
            dim_name: dim_name.into(),
            series_dim_name: series_dim_name.into(),
            indexes,
            second_keys: Rc::new(RefCell::new(None)),
        }
    }

    pub fn dim_name(&self) -> &str {
        &self.dim_name
    }

    /// Resolve the second-plot key set from the interned series atoms
    pub fn prime(&self, series: Option<&Dimension>) -> Result<Rc<HashSet<String>>, CdoError> {
        prime_keys(&self.second_keys, &self.indexes, || atom_keys(series))
    }

    /// Resolve the second-plot key set from distinct series keys listed in
    /// interning order
    pub fn prime_with_keys(&self, series_keys: &[String]) -> Result<Rc<HashSet<String>>, CdoError> {
        prime_keys(&self.second_keys, &self.indexes, || series_keys.to_vec())
    }

    /// Keys of the series routed to the second plot, once primed
    pub fn second_keys(&self) -> Option<Rc<HashSet<String>>> {
        self.second_keys.borrow().clone()
    }

    /// Standing calculation assigning [`MAIN_PART`] or [`SECOND_PART`] to
    /// every datum, including datums created after the translation
    pub fn calculation(&self) -> Calculation {
        let dim_name = self.dim_name.clone();
        let series_dim_name = self.series_dim_name.clone();
        let indexes = self.indexes.clone();
        let second_keys = self.second_keys.clone();
        Calculation::new([self.dim_name.clone()], move |scope, out| {
            let series = scope.dimension(&series_dim_name);
            let keys = prime_keys(&second_keys, &indexes, || atom_keys(series))?;
            let is_second = scope
                .atom(&series_dim_name)
                .is_some_and(|atom| keys.contains(atom.key()));
            let part = if is_second { SECOND_PART } else { MAIN_PART };
            out.set(&dim_name, Some(Value::string(part)))
        })
    }
}

fn atom_keys(series: Option<&Dimension>) -> Vec<String> {
    series
        .map(|dim| dim.atoms().map(|a| a.key().to_string()).collect())
        .unwrap_or_default()
}

fn prime_keys(
    cell: &RefCell<Option<Rc<HashSet<String>>>>,
    indexes: &IndexList,
    series_keys: impl FnOnce() -> Vec<String>,
) -> Result<Rc<HashSet<String>>, CdoError> {
    if let Some(keys) = cell.borrow().as_ref() {
        return Ok(keys.clone());
    }
    let keys = Rc::new(resolve_plot2_series_key_set(&series_keys(), indexes)?);
    debug!("Second plot series: {:?}", keys);
    *cell.borrow_mut() = Some(keys.clone());
    Ok(keys)
}
