use airlens::config::Config;
use airlens::pipeline::Pipeline;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "airlens")]
#[command(about = "Natural-language analysis over room sensor data")]
struct Args {
    /// The question to answer, in natural language
    question: String,

    /// Path to the sensor data directory (overrides SENSOR_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Directory chart images are written to (overrides CHARTS_DIR)
    #[arg(long)]
    charts_dir: Option<PathBuf>,

    /// API key for the model endpoint (overrides LLM_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.charts_dir {
        config.charts_dir = dir;
    }
    if let Some(key) = args.api_key {
        config.llm_api_key = key;
    }

    info!("Question: {}", args.question);

    let pipeline = Pipeline::new(config)?;
    let response = pipeline.run(&args.question).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
