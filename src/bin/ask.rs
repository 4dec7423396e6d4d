use clap::Parser;
use multi_agent_assistant::{
    assistant::{AskRequest, Assistant},
    config::Config,
    models::AgentKind,
};
use tracing_subscriber::EnvFilter;

/// Send one query to an agent and print the markdown answer.
#[derive(Parser)]
#[command(name = "ask", about = "Query the web search, finance or multi-agent assistant")]
struct Cli {
    /// The question to ask
    #[arg(required = true)]
    query: Vec<String>,

    /// Agent to use: multi, web_search or finance
    #[arg(short, long, default_value = "multi")]
    agent: AgentKind,

    /// Optional ticker symbol, e.g. NVDA
    #[arg(short, long)]
    symbol: Option<String>,

    /// Override the Groq model
    #[arg(long, env = "GROQ_MODEL")]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout carries only the answer.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = cli.model {
        config.model = model;
    }

    let assistant = Assistant::from_config(&config)?;

    let mut request = AskRequest::new(cli.query.join(" "), cli.agent);
    request.symbol = cli.symbol;

    match assistant.ask(request).await {
        Ok(response) => {
            println!("{}", response.content);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
