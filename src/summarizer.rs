//! Natural-language explanation of an execution outcome.

use crate::error::Result;
use crate::executor::{ExecOutcome, ExecValue};
use crate::llm::LlmClient;

const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a senior data analyst. If the result contains \
valid data, explain the findings clearly in 3-5 user-friendly sentences. Focus on patterns, \
comparisons, or anomalies. Avoid generic phrases like 'This analysis shows...' - get straight \
to the insight. If the result indicates an error or failed code execution, DO NOT include \
technical error messages. Instead, briefly explain that something went wrong and suggest the \
user rephrase the question or try again later. Keep the tone polite, professional, and \
reassuring.";

const DESCRIPTION_LIMIT: usize = 500;

/// Ask the model for a 3-5 sentence explanation of the outcome.
pub async fn explain_result(
    llm: &LlmClient,
    user_question: &str,
    outcome: &ExecOutcome,
) -> Result<String> {
    let prompt = build_reasoning_prompt(user_question, outcome);
    let reply = llm
        .chat(SUMMARIZER_SYSTEM_PROMPT, &prompt, 0.2, Some(512))
        .await?;
    Ok(reply.trim().to_string())
}

/// Build the reasoning prompt from the question and the outcome.
///
/// Failures pass their raw message through as the description; the system
/// instruction keeps technical detail away from the end user. Charts are
/// described by title plus a preview of the data behind them; anything else
/// is stringified and truncated.
pub fn build_reasoning_prompt(user_question: &str, outcome: &ExecOutcome) -> String {
    let (description, is_chart) = describe(outcome);

    if is_chart {
        format!(
            "User question: \"{}\"\n\n\
             The following chart is generated in response. {}\n\n\
             Summarize the insights shown in this chart in 3-5 sentences. Focus on patterns, \
             extremes, and trends. Avoid mentioning chart or code.",
            user_question, description
        )
    } else {
        format!(
            "User question: \"{}\"\n\n\
             The following result was returned from the analysis: {}\n\n\
             Explain in 3-5 sentences what this tells us about the data. Focus on what stands \
             out, changes over time, or comparisons between values.",
            user_question, description
        )
    }
}

fn describe(outcome: &ExecOutcome) -> (String, bool) {
    match outcome {
        ExecOutcome::Failure { message } => (message.clone(), false),
        ExecOutcome::Success { primary, table } => match primary {
            ExecValue::Chart(chart) => {
                let title = chart.title().unwrap_or("Untitled");
                let mut description = format!("[Chart Title: {}]", title);
                if let Some(df) = table {
                    description.push_str(&format!(
                        "\nChart data preview:\n{}",
                        df.head(Some(10))
                    ));
                }
                (description, true)
            }
            ExecValue::Table(df) => (truncate(format!("{}", df)), false),
            ExecValue::Scalar(value) => (truncate(value.to_string()), false),
        },
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        text
    } else {
        text.chars().take(DESCRIPTION_LIMIT).collect()
    }
}
