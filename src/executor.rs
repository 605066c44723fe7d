//! Execution of model-authored analysis snippets.
//!
//! A snippet is one SQL statement, optionally preceded by chart directives.
//! It runs in a fresh SQL context where exactly one handle (`readings`) is
//! registered against an isolated copy of the table, so generated code can
//! reach nothing else and can never corrupt the shared dataset.

use crate::chart::{extract_chart_spec, Chart};
use crate::error::Result;
use polars::prelude::*;
use polars::sql::SQLContext;
use tracing::debug;

/// Table handle name the prompts tell the model to query.
pub const TABLE_HANDLE: &str = "readings";

/// Prefix carried by every execution-failure message.
pub const EXEC_ERROR_PREFIX: &str = "Error executing code";

/// The primary value a snippet produced.
#[derive(Debug, Clone)]
pub enum ExecValue {
    /// A chart bound to its plotted data (plot-intent queries).
    Chart(Chart),
    /// A tabular result.
    Table(DataFrame),
    /// A single value (1x1 query output).
    Scalar(serde_json::Value),
}

/// Outcome of running one snippet. Downstream code branches on the
/// discriminant; the failure message keeps the fixed prefix so it can be
/// passed to the summarizer verbatim.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Success {
        primary: ExecValue,
        /// Companion aggregated table, present only for chart results.
        table: Option<DataFrame>,
    },
    Failure {
        message: String,
    },
}

/// Run a generated snippet against the sensor table.
///
/// Never fails: every error becomes a `Failure` outcome.
pub fn execute(code: &str, table: &DataFrame, needs_plot: bool) -> ExecOutcome {
    match run(code, table, needs_plot) {
        Ok(outcome) => outcome,
        Err(e) => ExecOutcome::Failure {
            message: format!("{}: {}", EXEC_ERROR_PREFIX, e),
        },
    }
}

fn run(code: &str, table: &DataFrame, needs_plot: bool) -> Result<ExecOutcome> {
    let (chart_spec, sql) = extract_chart_spec(code);
    if sql.is_empty() {
        return Err(crate::error::AgentError::Execution(
            "Snippet contains no SQL statement".to_string(),
        ));
    }
    debug!("Executing snippet: {}", sql);

    let mut ctx = SQLContext::new();
    ctx.register(TABLE_HANDLE, table.clone().lazy());
    let result = ctx.execute(&sql)?.collect()?;

    if needs_plot {
        if let Some(spec) = chart_spec {
            let chart = Chart::new(spec, result.clone());
            return Ok(ExecOutcome::Success {
                primary: ExecValue::Chart(chart),
                table: Some(result),
            });
        }
    }

    let primary = if result.height() == 1 && result.width() == 1 {
        let value = result
            .get_columns()
            .first()
            .and_then(|s| s.get(0).ok())
            .map(|v| any_value_to_json(&v))
            .unwrap_or(serde_json::Value::Null);
        ExecValue::Scalar(value)
    } else {
        ExecValue::Table(result)
    };

    Ok(ExecOutcome::Success {
        primary,
        table: None,
    })
}

/// Convert one cell to JSON.
pub fn any_value_to_json(value: &AnyValue) -> serde_json::Value {
    match value {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(b) => serde_json::Value::Bool(*b),
        AnyValue::String(s) => serde_json::Value::String(s.to_string()),
        AnyValue::Int8(v) => serde_json::Value::Number((*v).into()),
        AnyValue::Int16(v) => serde_json::Value::Number((*v).into()),
        AnyValue::Int32(v) => serde_json::Value::Number((*v).into()),
        AnyValue::Int64(v) => serde_json::Value::Number((*v).into()),
        AnyValue::UInt8(v) => serde_json::Value::Number((*v).into()),
        AnyValue::UInt16(v) => serde_json::Value::Number((*v).into()),
        AnyValue::UInt32(v) => serde_json::Value::Number((*v).into()),
        AnyValue::UInt64(v) => serde_json::Value::Number((*v).into()),
        AnyValue::Float32(v) => serde_json::Number::from_f64(*v as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        AnyValue::Float64(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        other => serde_json::Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> DataFrame {
        df![
            "room" => ["Room 1", "Room 1", "Room 2", "Room 2"],
            "co2" => [400.0, 420.0, 500.0, 520.0],
            "temperature" => [21.0, 21.5, 23.0, 23.5]
        ]
        .unwrap()
    }

    #[test]
    fn test_failing_snippet_yields_prefixed_failure() {
        let outcome = execute("SELECT no_such_col FROM readings", &sample_table(), false);
        match outcome {
            ExecOutcome::Failure { message } => {
                assert!(message.starts_with(EXEC_ERROR_PREFIX));
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_analysis_query_has_no_secondary_result() {
        let outcome = execute(
            "SELECT room, AVG(co2) AS avg_co2 FROM readings GROUP BY room ORDER BY room",
            &sample_table(),
            false,
        );
        match outcome {
            ExecOutcome::Success { primary, table } => {
                assert!(table.is_none());
                match primary {
                    ExecValue::Table(df) => {
                        assert_eq!(df.height(), 2);
                        assert_eq!(df.width(), 2);
                    }
                    _ => panic!("expected table"),
                }
            }
            ExecOutcome::Failure { message } => panic!("unexpected failure: {}", message),
        }
    }

    #[test]
    fn test_single_cell_result_is_scalar() {
        let outcome = execute("SELECT AVG(co2) FROM readings", &sample_table(), false);
        match outcome {
            ExecOutcome::Success { primary, .. } => match primary {
                ExecValue::Scalar(v) => assert_eq!(v.as_f64(), Some(460.0)),
                _ => panic!("expected scalar"),
            },
            ExecOutcome::Failure { message } => panic!("unexpected failure: {}", message),
        }
    }

    #[test]
    fn test_plot_intent_yields_chart_and_table() {
        let code = "-- chart: bar\n-- title: Average CO2 per room\n-- x: room\n-- y: avg_co2\n\
                    SELECT room, AVG(co2) AS avg_co2 FROM readings GROUP BY room ORDER BY room";
        let outcome = execute(code, &sample_table(), true);
        match outcome {
            ExecOutcome::Success { primary, table } => {
                let table = table.expect("chart results carry the aggregated table");
                assert_eq!(table.height(), 2);
                match primary {
                    ExecValue::Chart(chart) => {
                        assert_eq!(chart.title(), Some("Average CO2 per room"));
                        assert_eq!(chart.legend_labels(), vec!["avg_co2"]);
                    }
                    _ => panic!("expected chart"),
                }
            }
            ExecOutcome::Failure { message } => panic!("unexpected failure: {}", message),
        }
    }

    #[test]
    fn test_empty_snippet_is_failure() {
        let outcome = execute("", &sample_table(), false);
        assert!(matches!(outcome, ExecOutcome::Failure { .. }));
    }

    #[test]
    fn test_shared_table_untouched_after_execution() {
        let table = sample_table();
        let _ = execute("SELECT co2 * 1000 AS x FROM readings", &table, false);
        assert_eq!(table.height(), 4);
        let avg: f64 = table.column("co2").unwrap().mean().unwrap();
        assert!((avg - 460.0).abs() < 1e-9);
    }
}
