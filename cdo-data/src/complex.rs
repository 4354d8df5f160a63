use std::{cell::Cell, fmt, rc::Rc};

use cdo_common::value::Value;
use itertools::Itertools;

use crate::{atom::Atom, complex_type::ComplexType, dimension_type::DimensionType};

/// Separator between the atom keys of a complex key
pub const KEY_SEPARATOR: &str = ",";

/// A source row interpreted against a [`ComplexType`], plus visibility,
/// selection and interpolation state.
///
/// Atoms are stored in the complex type's definition order.
pub struct Datum {
    id: usize,
    complex_type: Rc<ComplexType>,
    atoms: Vec<Rc<Atom>>,
    key: String,
    is_null: bool,
    interpolation: Option<String>,
    visible: Cell<bool>,
    selected: Cell<bool>,
}

impl Datum {
    pub(crate) fn new(
        id: usize,
        complex_type: Rc<ComplexType>,
        atoms: Vec<Rc<Atom>>,
        interpolation: Option<String>,
    ) -> Self {
        let key = atoms.iter().map(|a| a.key()).join(KEY_SEPARATOR);
        let is_null = complex_type
            .dimensions()
            .iter()
            .zip(atoms.iter())
            .filter(|(dim, _)| !complex_type.is_calculated(dim.name()))
            .all(|(_, atom)| atom.is_null());
        Self {
            id,
            complex_type,
            atoms,
            key,
            is_null,
            interpolation,
            visible: Cell::new(true),
            selected: Cell::new(false),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn complex_type(&self) -> &Rc<ComplexType> {
        &self.complex_type
    }

    /// Concatenation of the keys of all atoms
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn atom(&self, name: &str) -> Option<&Rc<Atom>> {
        self.complex_type
            .dimension_index(name)
            .map(|i| &self.atoms[i])
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.atom(name).and_then(|a| a.value())
    }

    /// Atoms paired with their dimension types, in definition order
    pub fn atoms(&self) -> impl Iterator<Item = (&Rc<DimensionType>, &Rc<Atom>)> {
        self.complex_type.dimensions().iter().zip(self.atoms.iter())
    }

    /// Whether every read (non-calculated) atom is null
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn is_interpolated(&self) -> bool {
        self.interpolation.is_some()
    }

    pub fn interpolation(&self) -> Option<&str> {
        self.interpolation.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn is_selected(&self) -> bool {
        self.selected.get()
    }

    pub(crate) fn set_visible(&self, visible: bool) -> bool {
        self.visible.replace(visible) != visible
    }

    pub(crate) fn set_selected(&self, selected: bool) -> bool {
        self.selected.replace(selected) != selected
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datum")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("visible", &self.visible.get())
            .field("selected", &self.selected.get())
            .field("interpolation", &self.interpolation)
            .finish()
    }
}
