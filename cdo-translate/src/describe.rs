//! Fixed-width text dumps of a translation, for debugging.
use cdo_common::{types::ColumnType, value::Value};
use itertools::Itertools;

use crate::{
    layout::{LogicalColumn, RelationalLayout},
    reader::ReaderPlan,
    source::SourceTable,
};

const ELLIPSIS: &str = "...";

/// Preview of at most `max_rows` rows and `max_columns` columns of the
/// source, headed by the shown and total counts
pub fn source_table(
    source: &SourceTable,
    column_types: &[ColumnType],
    max_rows: usize,
    max_columns: usize,
) -> String {
    let row_count = source.row_count();
    let col_count = source.column_count();
    let shown_rows = row_count.min(max_rows);
    let shown_cols = col_count.min(max_columns);

    let mut header = vec!["#".to_string()];
    header.extend((0..shown_cols).map(|c| {
        let kind = match column_types.get(c) {
            Some(ColumnType::Continuous) => "C",
            Some(ColumnType::Discrete) => "D",
            None => "?",
        };
        format!("{}:{kind}", source.metadata[c].col_name)
    }));

    let mut body = (0..shown_rows)
        .map(|r| {
            let mut line = vec![r.to_string()];
            line.extend((0..shown_cols).map(|c| format_cell(source.cell(r, c))));
            if shown_cols < col_count {
                line.push(ELLIPSIS.to_string());
            }
            line
        })
        .collect::<Vec<_>>();
    if shown_rows < row_count {
        body.push(vec![ELLIPSIS.to_string()]);
    }
    if shown_cols < col_count {
        header.push(ELLIPSIS.to_string());
    }

    let mut out = format!(
        "ROWS ({shown_rows}/{row_count})\nCOLS ({shown_cols}/{col_count})\n"
    );
    out.push_str(&render_table(&header, &body));
    out
}

/// One line per logical column: its group, source column, metadata, type and
/// the dimensions read from it
pub fn logical_row(
    layout: &RelationalLayout,
    columns: &[LogicalColumn],
    plan: &ReaderPlan,
) -> String {
    let header = ["#", "Group", "Source", "Name", "Label", "Type", "Dimensions"]
        .map(String::from)
        .to_vec();
    let body = columns
        .iter()
        .map(|column| {
            let dimensions = plan.names_at(column.index).join(", ");
            vec![
                column.index.to_string(),
                column.group.to_string(),
                column.source_index.to_string(),
                column.name.clone(),
                column.label.clone(),
                column.column_type.to_string(),
                if dimensions.is_empty() { "-".to_string() } else { dimensions },
            ]
        })
        .collect::<Vec<_>>();

    let mut out = format!(
        "LOGICAL ROW (S={} C={} M={})\n",
        layout.series_count(),
        layout.categories_count(),
        layout.measures_count()
    );
    out.push_str(&render_table(&header, &body));
    out
}

fn format_cell(value: Option<&Value>) -> String {
    match value {
        None => "null".to_string(),
        Some(Value::String(s)) => format!("\"{s}\""),
        Some(other) => other.to_string(),
    }
}

fn render_table(header: &[String], body: &[Vec<String>]) -> String {
    let columns = header.len().max(body.iter().map(Vec::len).max().unwrap_or(0));
    let widths = (0..columns)
        .map(|c| {
            std::iter::once(header)
                .chain(body.iter().map(Vec::as_slice))
                .filter_map(|line| line.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();

    let render_line = |line: &[String]| {
        line.iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .join(" | ")
            .trim_end()
            .to_string()
    };
    let rule = "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1));

    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&render_line(header));
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');
    for line in body {
        out.push_str(&render_line(line.as_slice()));
        out.push('\n');
    }
    out.push_str(&rule);
    out.push('\n');
    out
}
