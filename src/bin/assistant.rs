use multi_agent_assistant::{api::start_server, assistant::Assistant, config::Config};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = Config::from_env()?;

    info!("🚀 Multi-Agent AI Assistant - API Server");
    info!("📍 Port: {}", config.port);
    info!("🧠 Model: {}", config.model);

    if !config.api_key_configured() {
        warn!("⚠️  GROQ_API_KEY not set; queries will fail until it is added to .env");
    }

    let assistant = Arc::new(Assistant::from_config(&config)?);

    info!("✅ Assistant initialized");
    info!("📡 Starting API server...");

    start_server(assistant, config.port).await?;

    Ok(())
}
