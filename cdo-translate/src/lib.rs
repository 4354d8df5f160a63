//! Relational translation of tabular sources into chart data.
//!
//! A [`translation::Translation`] classifies the source columns, partitions
//! them into series, category and measure groups, binds dimension readers to
//! the resulting logical row and reads every row into a
//! [`cdo_data::data::DataTree`].
pub mod classifier;
pub mod data_part;
pub mod describe;
pub mod index;
pub mod layout;
pub mod options;
pub mod reader;
pub mod source;
pub mod translation;

pub use options::TranslationOptions;
pub use source::{ColumnMetadata, SourceTable};
pub use translation::{translate, Translation};
