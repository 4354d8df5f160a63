//! Typed, interned, hierarchical chart data.
//!
//! Rows are read as [`complex::Datum`]s against a [`complex_type::ComplexType`]
//! catalog of dimensions. Each dimension interns its values as shared
//! [`atom::Atom`]s, and a [`data::DataTree`] groups datums into an owner tree plus
//! any number of link-parented views.
pub mod atom;
pub mod complex;
pub mod complex_type;
pub mod data;
pub mod dimension;
pub mod dimension_type;
