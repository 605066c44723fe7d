//! Response packaging: human-friendly tables, chart persistence, summary.

use crate::error::Result;
use crate::executor::{any_value_to_json, ExecOutcome, ExecValue};
use crate::llm::LlmClient;
use crate::summarizer::explain_result;
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Maximum number of rows shipped for a table-shaped result.
const TABLE_ROW_CAP: usize = 20;

/// Unit-like tokens rendered fully upper-case in display names.
const UNIT_TOKENS: [&str; 6] = ["co2", "pm2.5", "pm10", "o2", "no2", "rh"];

lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[_\-]+").unwrap();
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z])([A-Z])").unwrap();
}

/// The externally visible result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub summary: String,
    pub table: Option<Vec<Map<String, Value>>>,
    pub chart_path: Option<String>,
}

/// Make a column name presentable: separators become spaces, words are
/// title-cased, and unit-like tokens (CO2, RH, ...) go fully upper-case.
pub fn format_column_name(column: &str) -> String {
    let column = column.trim();
    if UNIT_TOKENS.contains(&column.to_lowercase().as_str()) {
        return column.to_uppercase();
    }

    let spaced = SEPARATORS.replace_all(column, " ");
    let spaced = CAMEL_BOUNDARY.replace_all(&spaced, "$1 $2");
    spaced
        .split_whitespace()
        .map(format_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if UNIT_TOKENS.contains(&lower.as_str()) {
        return word.to_uppercase();
    }
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Combine explanation, table formatting, and chart saving into the final
/// response package.
pub async fn create_response_package(
    llm: &LlmClient,
    user_question: &str,
    outcome: &ExecOutcome,
    charts_dir: &Path,
) -> Result<PipelineResponse> {
    let summary = explain_result(llm, user_question, outcome).await?;

    let (primary, companion) = match outcome {
        ExecOutcome::Success { primary, table } => (Some(primary), table.as_ref()),
        ExecOutcome::Failure { .. } => (None, None),
    };

    // Prefer the companion aggregated table for display when present.
    let display_frame = companion.or(match primary {
        Some(ExecValue::Table(df)) => Some(df),
        _ => None,
    });

    let table = match display_frame {
        Some(df) if df.width() == 1 => Some(series_rows(df)?),
        Some(df) => {
            let legend = chart_legend(primary);
            Some(table_rows(df, legend)?)
        }
        None => None,
    };

    let chart_path = match primary {
        Some(ExecValue::Chart(chart)) => Some(save_chart(chart, charts_dir)?),
        _ => None,
    };

    Ok(PipelineResponse {
        summary,
        table,
        chart_path,
    })
}

fn chart_legend(primary: Option<&ExecValue>) -> Option<Vec<String>> {
    match primary {
        Some(ExecValue::Chart(chart)) => {
            let labels = chart.legend_labels();
            if labels.is_empty() {
                None
            } else {
                Some(labels)
            }
        }
        _ => None,
    }
}

/// Format a two-dimensional result: legend labels rename the numeric
/// columns positionally when the counts line up, otherwise every column
/// name is beautified. Numerics are rounded and rows capped.
fn table_rows(df: &DataFrame, legend: Option<Vec<String>>) -> Result<Vec<Map<String, Value>>> {
    let mut df = df.clone();

    let numeric_columns: Vec<String> = df
        .get_column_names()
        .iter()
        .filter(|name| {
            df.column(name)
                .map(|s| s.dtype().is_numeric())
                .unwrap_or(false)
        })
        .map(|s| s.to_string())
        .collect();

    match legend {
        Some(labels)
            if labels.len() == numeric_columns.len()
                && renames_stay_unique(&df, &numeric_columns, &labels) =>
        {
            for (old, new) in numeric_columns.iter().zip(&labels) {
                df.rename(old, new)?;
            }
        }
        _ => {
            let renames: Vec<(String, String)> = df
                .get_column_names()
                .iter()
                .map(|name| (name.to_string(), format_column_name(name)))
                .collect();
            for (old, new) in renames {
                if old != new {
                    df.rename(&old, &new)?;
                }
            }
        }
    }

    rows_from_frame(&df, Some(TABLE_ROW_CAP))
}

/// Would renaming the numeric columns to the legend labels leave every
/// column name unique? A label that collides with another column (or with
/// a sibling label) would make `rename` fail, so fall back to beautified
/// names instead.
fn renames_stay_unique(df: &DataFrame, numeric_columns: &[String], labels: &[String]) -> bool {
    let mut names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    for (old, new) in numeric_columns.iter().zip(labels) {
        if let Some(slot) = names.iter_mut().find(|n| n.as_str() == old.as_str()) {
            *slot = new.clone();
        }
    }
    let mut seen = std::collections::HashSet::new();
    names.iter().all(|n| seen.insert(n))
}

/// Format a series-shaped (single column) result as an (index, value)
/// table. No row cap.
fn series_rows(df: &DataFrame) -> Result<Vec<Map<String, Value>>> {
    let value_name = df
        .get_column_names()
        .first()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "value".to_string());
    let values = df.column(&value_name)?.clone();

    let index: Vec<i64> = (0..df.height() as i64).collect();
    let mut out = DataFrame::new(vec![Series::new("index", index), values])?;
    out.rename("index", &format_column_name("index"))?;
    out.rename(&value_name, &format_column_name(&value_name))?;

    rows_from_frame(&out, None)
}

fn rows_from_frame(df: &DataFrame, cap: Option<usize>) -> Result<Vec<Map<String, Value>>> {
    let height = match cap {
        Some(cap) => df.height().min(cap),
        None => df.height(),
    };
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::with_capacity(height);
    for row_idx in 0..height {
        let mut row = Map::new();
        for name in &columns {
            let series = df.column(name)?;
            let value = cell_to_json(series, row_idx)?;
            row.insert(name.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn cell_to_json(series: &Series, row_idx: usize) -> Result<Value> {
    let any_val = series.get(row_idx)?;
    let value = match any_val {
        AnyValue::Float32(v) => round2(v as f64),
        AnyValue::Float64(v) => round2(v),
        other => any_value_to_json(&other),
    };
    Ok(value)
}

fn round2(v: f64) -> Value {
    serde_json::Number::from_f64((v * 100.0).round() / 100.0)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Persist the chart PNG under a random 8-hex-character basename and
/// return the relative path the serving layer exposes it under.
fn save_chart(chart: &crate::chart::Chart, charts_dir: &Path) -> Result<String> {
    std::fs::create_dir_all(charts_dir)?;
    let filename = format!(
        "{}.png",
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    );
    let full_path = charts_dir.join(&filename);
    chart.save_png(&full_path)?;
    info!("Chart written to {}", full_path.display());
    Ok(format!("charts/{}", filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{extract_chart_spec, Chart};

    #[test]
    fn test_format_column_name_unit_tokens() {
        assert_eq!(format_column_name("co2"), "CO2");
        assert_eq!(format_column_name("rh"), "RH");
        assert_eq!(format_column_name("pm2.5"), "PM2.5");
        assert_eq!(format_column_name("co2_level"), "CO2 Level");
    }

    #[test]
    fn test_format_column_name_separators_and_camel_case() {
        assert_eq!(format_column_name("avg_temperature"), "Avg Temperature");
        assert_eq!(format_column_name("room-name"), "Room Name");
        assert_eq!(format_column_name("avgHumidity"), "Avg Humidity");
    }

    #[test]
    fn test_legend_labels_rename_numeric_columns_positionally() {
        let df = df![
            "hour" => ["0", "1"],
            "a" => [1.0, 2.0],
            "b" => [3.0, 4.0]
        ]
        .unwrap();
        let rows = table_rows(&df, Some(vec!["X".to_string(), "Y".to_string()])).unwrap();
        assert!(rows[0].contains_key("X"));
        assert!(rows[0].contains_key("Y"));
        assert!(!rows[0].contains_key("a"));
        // the non-numeric column keeps its raw name in the legend path
        assert!(rows[0].contains_key("hour"));
    }

    #[test]
    fn test_mismatched_legend_count_beautifies_instead() {
        let df = df![
            "room_name" => ["Room 1"],
            "avg_co2" => [412.345],
            "avg_rh" => [40.1]
        ]
        .unwrap();
        // one label for two numeric columns: fall back to beautified names
        let rows = table_rows(&df, Some(vec!["Lonely".to_string()])).unwrap();
        assert!(rows[0].contains_key("Room Name"));
        assert!(rows[0].contains_key("Avg CO2"));
        assert!(rows[0].contains_key("Avg RH"));
    }

    #[test]
    fn test_colliding_legend_label_falls_back_to_beautified_names() {
        let df = df![
            "room" => ["Room 1"],
            "avg_co2" => [412.0]
        ]
        .unwrap();
        // label collides with the existing "room" column
        let rows = table_rows(&df, Some(vec!["room".to_string()])).unwrap();
        assert!(rows[0].contains_key("Room"));
        assert!(rows[0].contains_key("Avg CO2"));
    }

    #[test]
    fn test_duplicate_legend_labels_fall_back_to_beautified_names() {
        let df = df![
            "a" => [1.0],
            "b" => [2.0]
        ]
        .unwrap();
        let rows = table_rows(&df, Some(vec!["X".to_string(), "X".to_string()])).unwrap();
        assert!(rows[0].contains_key("A"));
        assert!(rows[0].contains_key("B"));
    }

    #[test]
    fn test_numeric_rounding_to_two_decimals() {
        let df = df!["avg_co2" => [412.34567], "room" => ["Room 1"]].unwrap();
        let rows = table_rows(&df, None).unwrap();
        let value = rows[0].get("Avg CO2").unwrap().as_f64().unwrap();
        assert!((value - 412.35).abs() < 1e-9);
    }

    #[test]
    fn test_table_rows_capped_at_twenty() {
        let values: Vec<f64> = (0..50).map(|v| v as f64).collect();
        let rooms: Vec<String> = (0..50).map(|v| format!("Room {}", v)).collect();
        let df = df!["room" => rooms, "co2" => values].unwrap();
        let rows = table_rows(&df, None).unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[test]
    fn test_series_rows_uncapped_with_index() {
        let values: Vec<f64> = (0..30).map(|v| v as f64).collect();
        let df = df!["avg_co2" => values].unwrap();
        let rows = series_rows(&df).unwrap();
        assert_eq!(rows.len(), 30);
        assert!(rows[0].contains_key("Index"));
        assert!(rows[0].contains_key("Avg CO2"));
    }

    #[test]
    fn test_save_chart_uses_eight_hex_basename() {
        let dir = tempfile::tempdir().unwrap();
        let df = df!["room" => ["Room 1", "Room 2"], "avg_co2" => [410.0, 520.0]].unwrap();
        let (spec, _) = extract_chart_spec(
            "-- chart: bar\n-- title: CO2\n-- x: room\n-- y: avg_co2\nSELECT 1",
        );
        let chart = Chart::new(spec.unwrap(), df);

        let rel = save_chart(&chart, dir.path()).unwrap();
        let basename = rel.strip_prefix("charts/").unwrap();
        let stem = basename.strip_suffix(".png").unwrap();
        assert_eq!(stem.len(), 8);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(dir.path().join(basename).exists());
    }
}
