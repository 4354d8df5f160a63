use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use cdo_common::value::Cell;
use cdo_data::data::{DataId, DataTree, GroupingOptions, GroupingSpec};
use cdo_translate::{
    options::OptionLayer, ColumnMetadata, SourceTable, Translation, TranslationOptions,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Translate tabular JSON sources into grouped chart data
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Translation option override as NAME=VALUE, where VALUE is JSON or plain text
    #[arg(short = 'o', long = "option", global = true, value_parser = parse_option)]
    options: Vec<(String, JsonValue)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the source preview and the resolved logical row
    Describe {
        /// Path to the source document (.json)
        file_path: PathBuf,
    },

    /// Group the translated data and print the resulting tree
    Group {
        /// Path to the source document (.json)
        file_path: PathBuf,

        /// Grouping levels, e.g. "category, series" or "series|category desc"
        #[arg(short, long, default_value = "category, series")]
        by: String,

        /// Dimension summed at every node
        #[arg(short, long, default_value = "value")]
        measure: String,

        /// Only group visible datums
        #[arg(long)]
        visible_only: bool,
    },
}

/// A source table together with the options it should be translated with
#[derive(Deserialize)]
struct SourceDocument {
    metadata: Vec<ColumnMetadata>,
    rows: Vec<Vec<Cell>>,
    #[serde(default)]
    options: Map<String, JsonValue>,
}

fn parse_option(text: &str) -> Result<(String, JsonValue), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{text}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::from(value));
    Ok((name.trim().to_string(), value))
}

fn load_document(
    path: &Path,
    overrides: &[(String, JsonValue)],
) -> Result<(SourceTable, TranslationOptions)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document: SourceDocument = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let base = Rc::new(OptionLayer::from_json(JsonValue::Object(document.options))?);
    let mut layer = OptionLayer::with_base(base);
    for (name, value) in overrides {
        layer.set(name, value.clone());
    }
    let options = TranslationOptions::from_layer(&layer)?;
    Ok((SourceTable::new(document.metadata, document.rows), options))
}

fn print_tree(tree: &DataTree, root: DataId, measure: &str, visible_only: bool) -> Result<()> {
    let root_depth = tree.node(root)?.depth();
    for id in tree.pre_order(root)? {
        let node = tree.node(id)?;
        let indent = "  ".repeat(node.depth() - root_depth);
        let sum = tree
            .dimension_sum(id, measure, visible_only)?
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        if id == root {
            println!("(root) datums={} {measure}={sum}", node.datum_count());
        } else {
            println!(
                "{indent}{} [{}] datums={} {measure}={sum}",
                node.key(),
                node.label(),
                node.datum_count()
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Describe { file_path } => {
            let (source, options) = load_document(&file_path, &cli.options)?;
            let translation = Translation::new(source, options)?;
            println!("{}", translation.describe_source());
            println!("{}", translation.describe_logical_row());
        }
        Commands::Group {
            file_path,
            by,
            measure,
            visible_only,
        } => {
            let (source, options) = load_document(&file_path, &cli.options)?;
            let spec: GroupingSpec = by.parse()?;
            let mut tree = Translation::new(source, options)?.load()?;
            let grouping = GroupingOptions::default();
            let grouping = if visible_only {
                grouping.visible(true)
            } else {
                grouping
            };
            let root = tree.group_by(DataTree::OWNER, &spec, &grouping)?;
            info!("Grouped by '{spec}'");
            print_tree(&tree, root, &measure, visible_only)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option() {
        assert_eq!(
            parse_option("categoriesCount=2").unwrap(),
            ("categoriesCount".to_string(), JsonValue::from(2))
        );
        assert_eq!(
            parse_option("measuresIndexes=1, 2").unwrap(),
            ("measuresIndexes".to_string(), JsonValue::from("1, 2"))
        );
        assert!(parse_option("seriesInRows").is_err());
    }

    #[test]
    fn test_demo_document_groups() -> Result<()> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/sales.json");
        let overrides = [("ignoreNulls".to_string(), JsonValue::from(true))];
        let (source, options) = load_document(&path, &overrides)?;
        assert!(options.ignore_nulls);
        assert!(options.plot2_data_series_indexes.is_some());

        let mut tree = Translation::new(source, options)?.load()?;
        assert_eq!(tree.node(DataTree::OWNER)?.datum_count(), 4);
        let spec: GroupingSpec = "series".parse()?;
        let root = tree.group_by(DataTree::OWNER, &spec, &GroupingOptions::default())?;
        let keys = tree
            .children(root)?
            .iter()
            .map(|id| Ok(tree.node(*id)?.key().to_string()))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec!["North", "South", "West"]);
        Ok(())
    }
}
