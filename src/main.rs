// src/main.rs

use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use tryon::config::CONFIG;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let level = CONFIG.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tryon server");
    info!("Uploads dir: {}", CONFIG.uploads_dir);
    info!(
        "Generation: {}",
        match (&CONFIG.gemini_api_key, &CONFIG.anthropic_api_key) {
            (Some(_), Some(_)) => "gemini with claude fallback",
            (Some(_), None) => "gemini",
            (None, Some(_)) => "claude",
            (None, None) => "disabled (no API key configured)",
        }
    );

    tryon::api::run(&CONFIG).await
}
