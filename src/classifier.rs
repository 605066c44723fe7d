//! Visual-intent classification.

use crate::error::Result;
use crate::llm::LlmClient;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are an assistant that determines if a query is \
requesting a data visualization. Respond with only 'true' if the query is asking for a plot, \
chart, graph, or any visual representation of data. Otherwise, respond with 'false'.";

/// Ask the model whether the question calls for a chart.
///
/// A trimmed, case-insensitive `true` means visual intent; any other body
/// (including a malformed one) means a tabular or scalar answer. No retry.
pub async fn is_visual_query(llm: &LlmClient, question: &str) -> Result<bool> {
    let answer = llm
        .chat(CLASSIFIER_SYSTEM_PROMPT, question, 0.1, Some(5))
        .await?;
    Ok(answer.trim().eq_ignore_ascii_case("true"))
}
