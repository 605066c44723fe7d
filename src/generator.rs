//! Snippet generation: classify intent, prompt the model, extract the code.

use crate::classifier::is_visual_query;
use crate::error::{AgentError, Result};
use crate::llm::LlmClient;
use crate::prompts::{analysis_prompt, plot_prompt, GENERATOR_SYSTEM_PROMPT};
use polars::prelude::DataFrame;
use tracing::info;

/// Generate an analysis snippet for the question and report whether it is
/// meant to produce a chart.
///
/// A reply with no extractable fenced code block is a generation failure,
/// surfaced as its own error kind rather than silently executing nothing.
pub async fn generate_code(
    llm: &LlmClient,
    question: &str,
    table: &DataFrame,
) -> Result<(String, bool)> {
    let needs_plot = is_visual_query(llm, question).await?;
    info!("Visual intent: {}", needs_plot);

    let prompt = if needs_plot {
        plot_prompt(table, question)
    } else {
        analysis_prompt(table, question)
    };

    let reply = llm
        .chat(GENERATOR_SYSTEM_PROMPT, &prompt, 0.2, None)
        .await?;

    let code = first_code_block(&reply).ok_or_else(|| {
        AgentError::Generation("Model response contained no fenced code block".to_string())
    })?;

    Ok((code, needs_plot))
}

/// Extract the first fenced code block from markdown-formatted text.
pub fn first_code_block(markdown: &str) -> Option<String> {
    for tag in ["```sql", "```"] {
        if let Some(start) = markdown.find(tag) {
            let body_start = start + tag.len();
            if let Some(end) = markdown[body_start..].find("```") {
                return Some(markdown[body_start..body_start + end].trim().to_string());
            }
        }
    }
    None
}
