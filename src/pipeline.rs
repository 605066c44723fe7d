//! Pipeline orchestration: classify, generate, execute, format.
//!
//! One `Pipeline` is built at startup and shared by reference with every
//! request handler; it owns the immutable sensor table and the LLM client.

use crate::config::Config;
use crate::error::Result;
use crate::executor;
use crate::formatter::{create_response_package, PipelineResponse};
use crate::generator::generate_code;
use crate::llm::LlmClient;
use crate::loader::DatasetLoader;
use polars::prelude::DataFrame;
use tracing::{error, info};

pub struct Pipeline {
    config: Config,
    llm: LlmClient,
    table: DataFrame,
}

impl Pipeline {
    /// Load the sensor dataset and wire up the model client.
    pub fn new(config: Config) -> Result<Self> {
        let loader = DatasetLoader::default();
        let table = loader.load_combined(&config.data_dir)?;
        info!(
            "Loaded combined sensor table: {} rows, {} columns",
            table.height(),
            table.width()
        );

        let llm = LlmClient::new(
            config.llm_api_key.clone(),
            config.llm_base_url.clone(),
            config.llm_model.clone(),
        );

        Ok(Self { config, llm, table })
    }

    /// Answer one question. Never fails: every error is converted into a
    /// well-formed response at this boundary.
    pub async fn run(&self, question: &str) -> PipelineResponse {
        match self.try_run(question).await {
            Ok(response) => response,
            Err(e) => {
                error!("Pipeline failed for question {:?}: {}", question, e);
                PipelineResponse {
                    summary: format!("Error: {}", e),
                    table: Some(Vec::new()),
                    chart_path: None,
                }
            }
        }
    }

    async fn try_run(&self, question: &str) -> Result<PipelineResponse> {
        let (code, needs_plot) = generate_code(&self.llm, question, &self.table).await?;
        info!("Generated snippet:\n{}", code);

        let outcome = executor::execute(&code, &self.table, needs_plot);

        create_response_package(&self.llm, question, &outcome, &self.config.charts_dir).await
    }
}
