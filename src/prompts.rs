//! Prompt templates for snippet generation.
//!
//! Both variants embed the table schema, a 10-row preview, the question,
//! and a fixed rule set. The plot variant additionally explains the chart
//! directive lines the executor understands.

use crate::executor::TABLE_HANDLE;
use polars::prelude::*;

/// System persona for the generation call: code-only output.
pub const GENERATOR_SYSTEM_PROMPT: &str = "You are a data-analysis expert who writes clean, \
efficient SQL. Solve the given problem with one optimal query. Be concise and focused. \
Your response must contain ONLY a properly-closed ```sql code block with no explanations \
before or after. Ensure your query is correct and handles edge cases.";

fn schema_preview(table: &DataFrame) -> (String, String) {
    let columns = table
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let preview = format!("{}", table.head(Some(10)));
    (columns, preview)
}

/// Prompt for tabular/scalar analysis.
pub fn analysis_prompt(table: &DataFrame, user_question: &str) -> String {
    let (columns, preview) = schema_preview(table);
    format!(
        r#"You are given a table named `{handle}`.

Schema:
Columns: {columns}

Preview:
{preview}

Write one SQL query (Polars SQL dialect) against `{handle}` to answer:
"{user_question}"

Rules
-----
- Query the `{handle}` table only, with a single SELECT statement.
- The `timestamp` column is already a clean datetime. To analyze by date, hour, or weekday,
  derive the part in the query: CAST(timestamp AS DATE), EXTRACT(HOUR FROM timestamp),
  EXTRACT(DOW FROM timestamp). Never try to resample.
- When filtering a specific date, bound the timestamp as
  timestamp >= 'YYYY-MM-DD' AND timestamp < the next day.
- Give every aggregated column a clear alias (for example AVG(co2) AS avg_co2).
- The query's result set is the final answer.
- Return the query inside a single fenced code block that starts with ```sql and ends
  with ```. Never include prose or explanation outside this code block.
"#,
        handle = TABLE_HANDLE,
        columns = columns,
        preview = preview,
        user_question = user_question,
    )
}

/// Prompt for chart-producing queries.
pub fn plot_prompt(table: &DataFrame, user_question: &str) -> String {
    let (columns, preview) = schema_preview(table);
    format!(
        r#"You are given a table named `{handle}`.

Schema:
Columns: {columns}

Preview:
{preview}

Write one SQL query (Polars SQL dialect) against `{handle}`, plus chart directives,
to answer with a plot:
"{user_question}"

Rules
-----
- Query the `{handle}` table only, with a single SELECT statement.
- The `timestamp` column is already a clean datetime. For time-based trends, derive readable
  parts in the query: CAST(timestamp AS DATE), EXTRACT(HOUR FROM timestamp),
  EXTRACT(DOW FROM timestamp). Never put raw timestamps on the x axis.
- The SELECT must produce the aggregated data the chart is drawn from, with a clear alias
  for every value column.
- Describe exactly ONE chart with comment directives at the top of the block:
    -- chart: line | bar | scatter
    -- title: <descriptive title summarizing the chart>
    -- x: <column holding the x-axis categories>
    -- y: <comma-separated value columns, one plotted series each>
    -- labels: <optional comma-separated legend labels, one per y column>
- Sort the x-axis values in logical order with ORDER BY.
- Return directives and query inside a single fenced code block that starts with ```sql
  and ends with ```. Never include prose or explanation outside this code block.

Plotting Guidelines
-------------------
- Use a clear, descriptive title.
- Prefer category names over numeric codes on the x axis.
- Keep one series per room or per measurement when comparing them.
"#,
        handle = TABLE_HANDLE,
        columns = columns,
        preview = preview,
        user_question = user_question,
    )
}
