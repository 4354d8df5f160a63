use cdo_common::{error::CdoError, value::Value};
use cdo_data::data::{DataId, DataTree, DatumFilter, GroupingOptions, GroupingSpec};
use cdo_translate::{
    options::{IndexList, OptionLayer, ReaderSpec},
    translate, ColumnMetadata, SourceTable, Translation, TranslationOptions,
};
use float_cmp::assert_approx_eq;
use rstest::rstest;
use serde_json::json;

fn matrix_source() -> SourceTable {
    serde_json::from_value(json!({
        "metadata": [{"colName": "s"}, {"colName": "c"}, {"colName": "v"}],
        "rows": [
            ["T", "A", 12],
            ["T", "B", 45],
            ["Q", "A", 11],
            ["Q", "B", 99],
            ["Z", "B", 3]
        ]
    }))
    .unwrap()
}

fn child_keys(tree: &DataTree, id: DataId) -> Vec<String> {
    tree.children(id)
        .unwrap()
        .iter()
        .map(|c| tree.node(*c).unwrap().key().to_string())
        .collect()
}

#[test]
fn test_matrix_round_trip() -> Result<(), CdoError> {
    let translation = Translation::new(matrix_source(), TranslationOptions::default())?;
    let layout = translation.layout();
    assert_eq!(
        (layout.series_count(), layout.categories_count(), layout.measures_count()),
        (1, 1, 1)
    );

    let mut tree = translation.load()?;
    let spec: GroupingSpec = "category, series".parse()?;
    let root = tree.group_by(DataTree::OWNER, &spec, &GroupingOptions::default())?;
    assert_eq!(child_keys(&tree, root), vec!["A", "B"]);

    let expected = [
        ("A", vec![("T", 12.0), ("Q", 11.0)]),
        ("B", vec![("T", 45.0), ("Q", 99.0), ("Z", 3.0)]),
    ];
    for (category, series) in expected {
        let cat = tree.require_child(root, category)?;
        assert_eq!(
            child_keys(&tree, cat),
            series.iter().map(|(s, _)| s.to_string()).collect::<Vec<_>>()
        );
        for (s, value) in series {
            let leaf = tree.require_child(cat, s)?;
            assert_approx_eq!(f64, tree.dimension_sum(leaf, "value", false)?.unwrap(), value);
        }
    }
    Ok(())
}

#[rstest]
#[case(IndexList::from(vec![-1]), vec!["Z"])]
#[case(IndexList::from(vec![0, 2]), vec!["T", "Z"])]
#[case(IndexList::from("1"), vec!["Q"])]
fn test_second_plot_series(
    #[case] indexes: IndexList,
    #[case] expected: Vec<&str>,
) -> Result<(), CdoError> {
    let options = TranslationOptions {
        plot2_data_series_indexes: Some(indexes),
        ..Default::default()
    };
    let tree = translate(matrix_source(), options)?;
    let mut series = tree
        .datums(DataTree::OWNER, &DatumFilter::new().where_eq("dataPart", "1"))?
        .iter()
        .filter_map(|d| d.value("series").and_then(Value::as_str).map(String::from))
        .collect::<Vec<_>>();
    series.dedup();
    assert_eq!(series, expected);
    Ok(())
}

#[rstest]
#[case(IndexList::from(vec![5]))]
#[case(IndexList::from(vec![-4]))]
fn test_second_plot_index_out_of_range(#[case] indexes: IndexList) {
    let options = TranslationOptions {
        plot2_data_series_indexes: Some(indexes),
        ..Default::default()
    };
    let err = translate(matrix_source(), options).unwrap_err();
    assert_eq!(err.argument_name(), Some("plot2DataSeriesIndexes"));
}

#[test]
fn test_failed_second_plot_leaves_atoms_untouched() -> Result<(), CdoError> {
    let options = TranslationOptions {
        plot2_data_series_indexes: Some(IndexList::from(vec![5])),
        ..Default::default()
    };
    let translation = Translation::new(matrix_source(), options)?;
    let mut tree = DataTree::new(translation.complex_type().clone());
    let err = translation.execute(&mut tree).unwrap_err();
    assert_eq!(err.argument_name(), Some("plot2DataSeriesIndexes"));
    assert_eq!(tree.dimension("series")?.atom_count(), 0);
    assert_eq!(tree.dimension("category")?.atom_count(), 0);
    Ok(())
}

#[test]
fn test_mixed_cells_with_equal_keys_share_atoms() -> Result<(), CdoError> {
    let source: SourceTable = serde_json::from_value(json!({
        "metadata": [{"colName": "s"}, {"colName": "c"}, {"colName": "v"}],
        "rows": [
            ["Q", "A", 3],
            ["T", 12, 1],
            ["T", "12", 2]
        ]
    }))
    .unwrap();
    let mut tree = translate(source, TranslationOptions::default())?;
    assert_eq!(tree.node(DataTree::OWNER)?.datum_count(), 3);

    let spec: GroupingSpec = "category".parse()?;
    let root = tree.group_by(DataTree::OWNER, &spec, &GroupingOptions::default())?;
    assert_eq!(child_keys(&tree, root), vec!["A", "12"]);
    let twelve = tree.require_child(root, "12")?;
    assert_eq!(tree.node(twelve)?.datum_count(), 2);
    Ok(())
}

#[test]
fn test_user_readers_take_precedence() -> Result<(), CdoError> {
    let options = TranslationOptions {
        readers: vec![ReaderSpec::new(["category"]).indexes(0)],
        ..Default::default()
    };
    let translation = Translation::new(matrix_source(), options)?;
    let bound = translation
        .readers()
        .iter()
        .map(|r| (r.name.as_str(), r.logical_index))
        .collect::<Vec<_>>();
    // the series column is taken, so the second column becomes a category
    assert_eq!(bound, vec![("category", 0), ("category2", 1), ("value", 2)]);
    assert!(translation.complex_type().dimension_opt("series").is_none());

    let tree = translation.load()?;
    let labels = tree
        .atoms_of(DataTree::OWNER, "category")?
        .iter()
        .map(|a| a.label().to_string())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["T", "Q", "Z"]);
    Ok(())
}

#[test]
fn test_layered_options() -> Result<(), CdoError> {
    let base = std::rc::Rc::new(OptionLayer::new().with_option("seriesInRows", true));
    let layer = OptionLayer::with_base(base).with_option("categoriesCount", 1);
    let options = TranslationOptions::from_layer(&layer)?;

    let source = SourceTable::new(
        vec![
            ColumnMetadata::new("a"),
            ColumnMetadata::new("b"),
            ColumnMetadata::new("v").col_type("numeric"),
            ColumnMetadata::new("w").col_type("numeric"),
        ],
        vec![vec![Some("x".into()), Some("y".into()), Some(1.0.into()), Some(2.0.into())]],
    );
    let translation = Translation::new(source, options)?;
    let layout = translation.layout();
    assert_eq!(
        (layout.series_count(), layout.categories_count(), layout.measures_count()),
        (1, 1, 2)
    );
    assert_eq!(layout.permutation(), &[1, 0, 2, 3]);
    Ok(())
}

#[test]
fn test_describe_dumps() -> Result<(), CdoError> {
    let translation = Translation::new(matrix_source(), TranslationOptions::default())?;
    let source = translation.describe_source();
    assert!(source.starts_with("ROWS (5/5)\nCOLS (3/3)\n"));
    let logical = translation.describe_logical_row();
    assert!(logical.starts_with("LOGICAL ROW (S=1 C=1 M=1)"));
    assert!(logical.contains("series"));
    assert!(logical.contains("value"));
    Ok(())
}

#[test]
fn test_multi_valued_is_accepted() -> Result<(), CdoError> {
    let options = TranslationOptions::from_json(json!({"isMultiValued": true}))?;
    let tree = translate(matrix_source(), options)?;
    assert_eq!(tree.node(DataTree::OWNER)?.datum_count(), 5);
    Ok(())
}
