//! Process configuration, read once at startup from environment variables.

use std::path::PathBuf;

/// Runtime configuration for the agent.
///
/// The API key is not validated here; a missing or wrong key surfaces as a
/// remote-call failure on the first model request.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the OpenAI-compatible chat completions endpoint.
    pub llm_base_url: String,
    /// API key sent as a bearer token.
    pub llm_api_key: String,
    /// Model identifier.
    pub llm_model: String,
    /// Directory containing one NDJSON file per room.
    pub data_dir: PathBuf,
    /// Directory chart PNGs are written to.
    pub charts_dir: PathBuf,
    /// Bind address for the HTTP server binary.
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            llm_base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "llama3-70b-8192".to_string()),
            data_dir: PathBuf::from(
                std::env::var("SENSOR_DATA_DIR").unwrap_or_else(|_| "sensor-data".to_string()),
            ),
            charts_dir: PathBuf::from(
                std::env::var("CHARTS_DIR").unwrap_or_else(|_| "charts".to_string()),
            ),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
        }
    }
}
