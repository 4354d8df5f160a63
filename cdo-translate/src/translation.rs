use std::{collections::HashSet, rc::Rc};

use cdo_common::{
    error::CdoError,
    types::{ColumnType, ValueType},
    value::{Cell, Value},
};
use cdo_data::{
    complex::Datum,
    complex_type::ComplexType,
    data::DataTree,
    dimension_type::{split_indexed_id, DimensionSpec},
};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn, Level};

use crate::{
    classifier::classify_columns,
    data_part::DataPart,
    describe,
    index::check_index_list,
    layout::{ColumnGroup, LogicalColumn, RelationalLayout},
    options::TranslationOptions,
    reader::{DimensionReader, ReaderPlan},
    source::SourceTable,
};

/// Dimension whose atoms decide the data part of each datum
const SERIES_DIM_NAME: &str = "series";
const MEASURE_GROUP: &str = "value";

/// A resolved relational translation.
///
/// Construction classifies the columns, resolves the layout, binds readers
/// and declares the dimensions; nothing is read yet. [`Translation::load`]
/// then reads every row into a new owner [`DataTree`]. Both steps either
/// succeed completely or fail before any tree is handed out.
#[derive(Debug)]
pub struct Translation {
    source: SourceTable,
    options: TranslationOptions,
    column_types: Vec<ColumnType>,
    layout: RelationalLayout,
    logical_columns: Vec<LogicalColumn>,
    plan: ReaderPlan,
    complex_type: Rc<ComplexType>,
    data_part: Option<DataPart>,
}

impl Translation {
    pub fn new(source: SourceTable, options: TranslationOptions) -> Result<Self, CdoError> {
        if options.is_multi_valued {
            warn!("isMultiValued only applies to crosstab sources and is ignored");
        }
        if let Some(indexes) = &options.plot2_data_series_indexes {
            check_index_list("plot2DataSeriesIndexes", indexes)?;
        }

        let column_types = classify_columns(&source, options.type_checking_mode);
        let layout = RelationalLayout::resolve(&column_types, &options)?;
        let logical_columns = layout.logical_columns(&source.metadata, &column_types);

        let mut plan = ReaderPlan::new(layout.column_count());
        for reader in &options.readers {
            plan.def_user_reader(reader)?;
        }

        let data_part = match &options.plot2_data_series_indexes {
            Some(indexes) if !plan.is_read(&options.data_part_dim_name) => Some(DataPart::new(
                options.data_part_dim_name.clone(),
                SERIES_DIM_NAME,
                indexes.clone(),
            )),
            Some(_) => {
                debug!(
                    "Dimension '{}' is read from the source; not calculating it",
                    options.data_part_dim_name
                );
                None
            }
            None => None,
        };

        let reserved = data_part
            .iter()
            .map(|p| p.dim_name().to_string())
            .collect::<HashSet<_>>();
        for group in [ColumnGroup::Series, ColumnGroup::Category, ColumnGroup::Measure] {
            plan.bind_group(&layout, group, &reserved)?;
        }

        let complex_type = Rc::new(build_complex_type(&plan, &options, data_part.as_ref())?);
        Ok(Self {
            source,
            options,
            column_types,
            layout,
            logical_columns,
            plan,
            complex_type,
            data_part,
        })
    }

    pub fn source(&self) -> &SourceTable {
        &self.source
    }

    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn layout(&self) -> &RelationalLayout {
        &self.layout
    }

    pub fn logical_columns(&self) -> &[LogicalColumn] {
        &self.logical_columns
    }

    pub fn readers(&self) -> &[DimensionReader] {
        self.plan.readers()
    }

    pub fn complex_type(&self) -> &Rc<ComplexType> {
        &self.complex_type
    }

    pub fn data_part(&self) -> Option<&DataPart> {
        self.data_part.as_ref()
    }

    /// Read every source row into datums of `tree`.
    ///
    /// The second-plot series set is resolved, and validated, from the series
    /// keys the rows will produce before anything is interned, so a failed
    /// execution leaves the tree's atom spaces untouched.
    pub fn execute(&self, tree: &mut DataTree) -> Result<Vec<Rc<Datum>>, CdoError> {
        if !Rc::ptr_eq(tree.complex_type(), &self.complex_type) {
            return Err(CdoError::argument_invalid(
                "tree",
                "Data tree was built for a different complex type",
            ));
        }

        if let Some(part) = &self.data_part {
            part.prime_with_keys(&self.series_keys(tree))?;
        }

        let mut rows = Vec::with_capacity(self.source.row_count());
        for row in &self.source.rows {
            let mut atoms = IndexMap::new();
            for reader in self.plan.readers() {
                let value = self.read_cell(row, reader);
                atoms.insert(reader.name.clone(), tree.intern(&reader.name, value)?);
            }
            rows.push(atoms);
        }

        let has_measures = self.complex_type.has_group(MEASURE_GROUP);
        let mut datums = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for atoms in rows {
            let datum = tree.create_datum_from_atoms(atoms, None)?;
            if self.options.ignore_nulls && has_measures && measures_are_null(&datum) {
                skipped += 1;
                continue;
            }
            datums.push(datum);
        }
        if skipped > 0 {
            debug!("Ignored {skipped} datums with null measures");
        }
        Ok(datums)
    }

    fn read_cell<'a>(&self, row: &'a [Cell], reader: &DimensionReader) -> Option<&'a Value> {
        self.layout
            .permutation()
            .get(reader.logical_index)
            .and_then(|&source| row.get(source))
            .and_then(Option::as_ref)
    }

    /// Series keys in the order interning the source would produce them,
    /// starting from the atoms `tree` already holds
    fn series_keys(&self, tree: &DataTree) -> Vec<String> {
        let Ok(series) = tree.dimension(SERIES_DIM_NAME) else {
            return Vec::new();
        };
        let mut keys = series
            .atoms()
            .map(|atom| atom.key().to_string())
            .collect::<IndexSet<_>>();
        if let Some(reader) = self.plan.readers().iter().find(|r| r.name == SERIES_DIM_NAME) {
            for row in &self.source.rows {
                if let Some(key) = series.key_of(self.read_cell(row, reader)) {
                    keys.insert(key);
                }
            }
        }
        keys.into_iter().collect()
    }

    /// Translate the source into a new owner data tree
    #[tracing::instrument(skip_all)]
    pub fn load(&self) -> Result<DataTree, CdoError> {
        if tracing::enabled!(Level::DEBUG) {
            debug!("\n{}", self.describe_source());
            debug!("\n{}", self.describe_logical_row());
        }
        let mut tree = DataTree::new(self.complex_type.clone());
        let datums = self.execute(&mut tree)?;
        let loaded = tree.load(DataTree::OWNER, datums)?;
        info!(
            "Translated {} rows into {loaded} datums over {} dimensions",
            self.source.row_count(),
            self.complex_type.len()
        );
        Ok(tree)
    }

    /// Fixed-width preview of the source rows and column types
    pub fn describe_source(&self) -> String {
        describe::source_table(
            &self.source,
            &self.column_types,
            self.options.preview_rows,
            self.options.preview_columns,
        )
    }

    /// Fixed-width description of the logical row and its dimension bindings
    pub fn describe_logical_row(&self) -> String {
        describe::logical_row(&self.layout, &self.logical_columns, &self.plan)
    }
}

/// Translate `source` in one step
pub fn translate(source: SourceTable, options: TranslationOptions) -> Result<DataTree, CdoError> {
    Translation::new(source, options)?.load()
}

fn build_complex_type(
    plan: &ReaderPlan,
    options: &TranslationOptions,
    data_part: Option<&DataPart>,
) -> Result<ComplexType, CdoError> {
    let mut names = plan
        .readers()
        .iter()
        .map(|r| r.name.clone())
        .collect::<Vec<_>>();
    for name in options.dimensions.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    if let Some(part) = data_part {
        if !names.iter().any(|n| n == part.dim_name()) {
            names.push(part.dim_name().to_string());
        }
    }

    let mut complex_type = ComplexType::new();
    for name in &names {
        let spec = options
            .dimensions
            .get(name)
            .cloned()
            .unwrap_or_default()
            .or(&default_dimension_spec(name, options));
        complex_type.add_dimension(name, spec)?;
    }
    if let Some(part) = data_part {
        complex_type.add_calculation(part.calculation())?;
    }
    debug!(
        "Declared dimensions: {}",
        complex_type.dimension_names().collect::<Vec<_>>().join(", ")
    );
    Ok(complex_type)
}

/// Spec of a dimension the user did not fully describe, derived from its group
pub fn default_dimension_spec(name: &str, options: &TranslationOptions) -> DimensionSpec {
    if name == options.data_part_dim_name {
        return DimensionSpec::new()
            .value_type(ValueType::String)
            .hidden(true);
    }
    match split_indexed_id(name).0.as_deref() {
        Some(MEASURE_GROUP) => DimensionSpec::new().value_type(ValueType::Number),
        Some("category") if options.time_series => {
            let spec = DimensionSpec::new().value_type(ValueType::Date);
            match &options.time_series_format {
                Some(format) => spec.format(format.clone()),
                None => spec,
            }
        }
        _ => DimensionSpec::new(),
    }
}

fn measures_are_null(datum: &Datum) -> bool {
    datum
        .atoms()
        .filter(|(dim, _)| dim.group() == Some(MEASURE_GROUP))
        .all(|(_, atom)| atom.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::IndexList, source::ColumnMetadata};
    use cdo_common::value::{Cell, Value};
    use cdo_data::data::DatumFilter;

    fn s(text: &str) -> Cell {
        Some(Value::string(text))
    }

    fn n(value: f64) -> Cell {
        Some(Value::number(value))
    }

    fn sample_source() -> SourceTable {
        SourceTable::new(
            vec![
                ColumnMetadata::new("s"),
                ColumnMetadata::new("c"),
                ColumnMetadata::new("v"),
            ],
            vec![
                vec![s("T"), s("A"), n(12.0)],
                vec![s("T"), s("B"), n(45.0)],
                vec![s("Q"), s("A"), n(11.0)],
                vec![s("Q"), s("B"), n(99.0)],
                vec![s("Z"), s("B"), n(3.0)],
            ],
        )
    }

    #[test]
    fn test_default_dimensions() -> Result<(), CdoError> {
        let translation = Translation::new(sample_source(), TranslationOptions::default())?;
        let ct = translation.complex_type();
        assert_eq!(
            ct.dimension_names().collect::<Vec<_>>(),
            vec!["series", "category", "value"]
        );
        assert!(!ct.dimension("value")?.is_discrete());
        assert!(ct.dimension("category")?.is_discrete());
        Ok(())
    }

    #[test]
    fn test_time_series_categories() -> Result<(), CdoError> {
        let options = TranslationOptions {
            time_series: true,
            time_series_format: Some("%d/%m/%Y".to_string()),
            ..Default::default()
        };
        let source = SourceTable::new(
            vec![ColumnMetadata::new("date"), ColumnMetadata::new("v")],
            vec![vec![s("02/03/2024"), n(1.0)], vec![s("bad"), n(2.0)]],
        );
        let tree = Translation::new(source, options)?.load()?;
        let category = tree.dimension("category")?;
        assert_eq!(category.dim_type().value_type(), ValueType::Date);
        assert_eq!(category.atom_count(), 1);
        assert_eq!(
            category.atoms().next().map(|a| a.label().to_string()),
            Some("02/03/2024".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_ignore_nulls() -> Result<(), CdoError> {
        let source = SourceTable::new(
            vec![ColumnMetadata::new("c"), ColumnMetadata::new("v")],
            vec![vec![s("A"), n(1.0)], vec![s("B"), None], vec![s("C"), s("x")]],
        );
        let tree = translate(source.clone(), TranslationOptions::default())?;
        assert_eq!(tree.node(DataTree::OWNER)?.datum_count(), 3);

        let options = TranslationOptions {
            ignore_nulls: true,
            ..Default::default()
        };
        let tree = translate(source, options)?;
        assert_eq!(tree.node(DataTree::OWNER)?.datum_count(), 1);
        Ok(())
    }

    #[test]
    fn test_data_part_routes_series() -> Result<(), CdoError> {
        let options = TranslationOptions {
            plot2_data_series_indexes: Some(IndexList::from(vec![-1])),
            ..Default::default()
        };
        let translation = Translation::new(sample_source(), options)?;
        let tree = translation.load()?;
        let second = tree.datums(
            DataTree::OWNER,
            &DatumFilter::new().where_eq("dataPart", "1"),
        )?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].value("series"), Some(&Value::string("Z")));
        assert!(tree.complex_type().dimension("dataPart")?.is_hidden());
        assert!(translation
            .data_part()
            .and_then(|p| p.second_keys())
            .is_some_and(|keys| keys.contains("Z")));
        Ok(())
    }

    #[test]
    fn test_out_of_range_plot2_index_fails_before_datums() {
        let options = TranslationOptions {
            plot2_data_series_indexes: Some(IndexList::from(vec![5])),
            ..Default::default()
        };
        let translation = Translation::new(sample_source(), options).unwrap();
        let mut tree = DataTree::new(translation.complex_type().clone());
        let err = translation.execute(&mut tree).unwrap_err();
        assert_eq!(err.argument_name(), Some("plot2DataSeriesIndexes"));
        assert_eq!(tree.node(DataTree::OWNER).unwrap().datum_count(), 0);
    }

    #[test]
    fn test_malformed_plot2_index_fails_on_construction() {
        let options = TranslationOptions {
            plot2_data_series_indexes: Some(IndexList::from("1, x")),
            ..Default::default()
        };
        let err = Translation::new(sample_source(), options).unwrap_err();
        assert!(matches!(err, CdoError::ArgumentInvalid { .. }));
    }

    #[test]
    fn test_user_dimension_overrides() -> Result<(), CdoError> {
        let options: TranslationOptions = serde_json::from_value(serde_json::json!({
            "dimensions": {"category": {"label": "Region"}, "extra": {}}
        }))
        .map_err(|e| CdoError::argument_invalid("options", e.to_string()))?;
        let translation = Translation::new(sample_source(), options)?;
        let ct = translation.complex_type();
        assert_eq!(ct.dimension("category")?.label(), "Region");
        assert!(ct.dimension("extra").is_ok());
        Ok(())
    }
}
