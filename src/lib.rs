pub mod chart;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod generator;
pub mod llm;
pub mod loader;
pub mod normalizer;
pub mod pipeline;
pub mod prompts;
pub mod summarizer;
