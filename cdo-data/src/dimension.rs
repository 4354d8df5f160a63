use std::rc::Rc;

use cdo_common::{types::ValueType, value::Value};
use chrono::format::{Item, StrftimeItems};
use indexmap::IndexMap;

use crate::{atom::Atom, dimension_type::DimensionType};

/// Label used when a value cannot be formatted
pub const UNFORMATTABLE_LABEL: &str = "—";

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The atom space of one dimension.
///
/// Holds exactly one null atom, created up front, and grows monotonically as
/// new values are interned. Atoms are never removed individually; they are
/// dropped together with the dimension.
#[derive(Debug)]
pub struct Dimension {
    dim_type: Rc<DimensionType>,
    name: Rc<str>,
    null_atom: Rc<Atom>,
    // keyed by `Value::key`, so values sharing a key share an atom
    atoms: IndexMap<String, Rc<Atom>>,
}

impl Dimension {
    pub fn new(dim_type: Rc<DimensionType>) -> Self {
        let name: Rc<str> = Rc::from(dim_type.name());
        let null_atom = Rc::new(Atom::new(0, name.clone(), None, String::new()));
        Self {
            dim_type,
            name,
            null_atom,
            atoms: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim_type(&self) -> &Rc<DimensionType> {
        &self.dim_type
    }

    pub fn null_atom(&self) -> &Rc<Atom> {
        &self.null_atom
    }

    /// Return the atom for `value`, creating it on first use.
    ///
    /// Values are first cast to the dimension's value type; nulls and values
    /// that fail the cast resolve to the null atom. Atoms are identified by
    /// key: the first value interned under a key is the one the atom keeps.
    pub fn intern(&mut self, value: Option<&Value>) -> Rc<Atom> {
        let Some(value) = self.cast(value) else {
            return self.null_atom.clone();
        };
        let key = value.key();
        if let Some(atom) = self.atoms.get(&key) {
            return atom.clone();
        }
        let label = self.format(&value);
        let atom = Rc::new(Atom::new(
            self.atoms.len() + 1,
            self.name.clone(),
            Some(value.clone()),
            label,
        ));
        self.atoms.insert(key, atom.clone());
        atom
    }

    /// The key `value` would be interned under; `None` for the null atom
    pub fn key_of(&self, value: Option<&Value>) -> Option<String> {
        self.cast(value).map(|value| value.key())
    }

    /// Look up the atom of a value without interning it
    pub fn find(&self, value: Option<&Value>) -> Option<Rc<Atom>> {
        match self.cast(value) {
            None => Some(self.null_atom.clone()),
            Some(value) => self.atoms.get(&value.key()).cloned(),
        }
    }

    /// Non-null atoms in interning order
    pub fn atoms(&self) -> impl Iterator<Item = &Rc<Atom>> {
        self.atoms.values()
    }

    /// Number of non-null atoms
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Whether `atom` was interned by this dimension
    pub fn owns(&self, atom: &Rc<Atom>) -> bool {
        match atom.value() {
            None => Rc::ptr_eq(atom, &self.null_atom),
            Some(_) => self
                .atoms
                .get(atom.key())
                .is_some_and(|own| Rc::ptr_eq(own, atom)),
        }
    }

    fn cast(&self, value: Option<&Value>) -> Option<Value> {
        value?.cast(self.dim_type.value_type(), self.dim_type.format())
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::Date(date) => {
                let format = self.dim_type.format().unwrap_or(DEFAULT_DATE_FORMAT);
                let items = StrftimeItems::new(format).collect::<Vec<_>>();
                if items.iter().any(|item| matches!(item, Item::Error)) {
                    UNFORMATTABLE_LABEL.to_string()
                } else {
                    date.format_with_items(items.into_iter()).to_string()
                }
            }
            Value::Number(n) if self.dim_type.value_type() == ValueType::Number => {
                format_number(n.0)
            }
            other => other.to_string(),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        UNFORMATTABLE_LABEL.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension_type::DimensionSpec;

    fn dimension(name: &str, spec: DimensionSpec) -> Dimension {
        Dimension::new(Rc::new(DimensionType::new(name, spec).unwrap()))
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut dim = dimension("series", DimensionSpec::new());
        let a1 = dim.intern(Some(&Value::string("A")));
        let a2 = dim.intern(Some(&Value::string("A")));
        let b = dim.intern(Some(&Value::string("B")));
        assert!(Rc::ptr_eq(&a1, &a2));
        assert!(!Rc::ptr_eq(&a1, &b));
        assert_eq!(dim.atom_count(), 2);
        assert_eq!(a1.label(), "A");
        assert_eq!(b.id(), 2);
    }

    #[test]
    fn test_null_resolves_to_single_null_atom() {
        let mut dim = dimension("value", DimensionSpec::new().value_type(ValueType::Number));
        let n1 = dim.intern(None);
        let n2 = dim.intern(Some(&Value::string("not a number")));
        assert!(Rc::ptr_eq(&n1, &n2));
        assert!(Rc::ptr_eq(&n1, dim.null_atom()));
        assert!(n1.is_null());
        assert_eq!(n1.key(), "");
        assert_eq!(dim.atom_count(), 0);
    }

    #[test]
    fn test_number_cast_unifies_text_and_numbers() {
        let mut dim = dimension("value", DimensionSpec::new().value_type(ValueType::Number));
        let a = dim.intern(Some(&Value::number(12.0)));
        let b = dim.intern(Some(&Value::string("12")));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.label(), "12");
    }

    #[test]
    fn test_untyped_values_share_atoms_by_key() {
        let mut dim = dimension("category", DimensionSpec::new());
        let number = dim.intern(Some(&Value::number(12.0)));
        let text = dim.intern(Some(&Value::string("12")));
        assert!(Rc::ptr_eq(&number, &text));
        assert_eq!(number.value(), Some(&Value::number(12.0)));
        assert_eq!(dim.key_of(Some(&Value::string("12"))).as_deref(), Some("12"));

        let flag = dim.intern(Some(&Value::Boolean(true)));
        let flag_text = dim.intern(Some(&Value::string("true")));
        assert!(Rc::ptr_eq(&flag, &flag_text));
        assert_eq!(dim.atom_count(), 2);
        assert!(dim.owns(&flag_text));
    }

    #[test]
    fn test_date_labels() {
        let mut dim = dimension(
            "category",
            DimensionSpec::new().value_type(ValueType::Date).format("%d/%m/%Y"),
        );
        let atom = dim.intern(Some(&Value::string("02/03/2024")));
        assert_eq!(atom.label(), "02/03/2024");

        let mut bad = dimension(
            "category",
            DimensionSpec::new().value_type(ValueType::Date).format("%Q"),
        );
        let atom = bad.intern(Value::date(2024, 3, 2).as_ref());
        assert_eq!(atom.label(), UNFORMATTABLE_LABEL);
    }

    #[test]
    fn test_find_does_not_intern() {
        let mut dim = dimension("series", DimensionSpec::new());
        assert!(dim.find(Some(&Value::string("A"))).is_none());
        let a = dim.intern(Some(&Value::string("A")));
        let found = dim.find(Some(&Value::string("A"))).unwrap();
        assert!(Rc::ptr_eq(&a, &found));
        assert!(dim.owns(&a));
        assert_eq!(dim.atom_count(), 1);
    }
}
