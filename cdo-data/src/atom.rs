use std::{cmp::Ordering, rc::Rc};

use cdo_common::value::Value;

/// An interned `(value, label)` pair, unique per dimension and value.
///
/// Atoms are only created by [`crate::dimension::Dimension::intern`], so two atoms of
/// the same dimension are equal exactly when they are the same allocation.
#[derive(Debug, PartialEq)]
pub struct Atom {
    id: usize,
    dimension: Rc<str>,
    value: Option<Value>,
    label: String,
    key: String,
}

impl Atom {
    pub(crate) fn new(id: usize, dimension: Rc<str>, value: Option<Value>, label: String) -> Self {
        let key = value.as_ref().map(Value::key).unwrap_or_default();
        Self {
            id,
            dimension,
            value,
            label,
            key,
        }
    }

    /// Creation order within the owning dimension. The null atom is always `0`.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Natural order of atom values with the null atom first
    pub fn compare(a: &Atom, b: &Atom) -> Ordering {
        a.value.cmp(&b.value)
    }
}
