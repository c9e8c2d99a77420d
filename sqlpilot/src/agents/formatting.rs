//! Result rendering and execution ratings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How query results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    /// Pipe-separated preview table.
    #[default]
    Table,
    /// Array of row objects.
    Json,
    /// Comma-separated values with a header line.
    Csv,
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Renders a result set.
///
/// The table format shows at most `preview_rows` rows followed by a
/// `... N more rows` line; json and csv include every row.
#[must_use]
pub fn format_rows(
    columns: &[String],
    rows: &[Vec<Value>],
    format: ResultFormat,
    preview_rows: usize,
) -> String {
    match format {
        ResultFormat::Table => {
            if columns.is_empty() || rows.is_empty() {
                return "Query returned no rows".to_string();
            }
            let header = columns.join(" | ");
            let mut lines = vec![header.clone(), "-".repeat(header.chars().count())];
            lines.extend(rows.iter().take(preview_rows).map(|row| {
                row.iter().map(render_cell).collect::<Vec<_>>().join(" | ")
            }));
            if rows.len() > preview_rows {
                lines.push(format!("... {} more rows", rows.len() - preview_rows));
            }
            lines.join("\n")
        }
        ResultFormat::Json => {
            let objects: Vec<Value> = rows
                .iter()
                .map(|row| {
                    Value::Object(
                        columns
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned())
                            .collect(),
                    )
                })
                .collect();
            Value::Array(objects).to_string()
        }
        ResultFormat::Csv => {
            if columns.is_empty() {
                return String::new();
            }
            let mut lines = vec![columns.iter().map(|c| csv_escape(c)).collect::<Vec<_>>().join(",")];
            lines.extend(rows.iter().map(|row| {
                row.iter()
                    .map(|cell| csv_escape(&render_cell(cell)))
                    .collect::<Vec<_>>()
                    .join(",")
            }));
            lines.join("\n")
        }
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn csv_escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Rates an execution time.
#[must_use]
pub fn performance_rating(execution_time_ms: f64) -> &'static str {
    if execution_time_ms > 5000.0 {
        "poor"
    } else if execution_time_ms > 2000.0 {
        "fair"
    } else if execution_time_ms > 1000.0 {
        "good"
    } else {
        "excellent"
    }
}

/// Follow-up hints for slow or large results.
#[must_use]
pub fn execution_suggestions(execution_time_ms: f64, row_count: usize) -> Vec<String> {
    let mut suggestions = Vec::new();
    if execution_time_ms > 2000.0 {
        suggestions.push("Query took a long time; consider adding indexes or narrowing it".to_string());
    }
    if row_count > 10_000 {
        suggestions.push("Large result; consider pagination or stricter filters".to_string());
    }
    suggestions
}
