//! The single request path shared by the HTTP API and the CLI
//!
//! QUERY → VALIDATE → ROUTE (web | finance | team | finance+web) → RECORD

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::agent::AgentTeam;
use crate::classifier::{is_finance_query, normalize_symbol};
use crate::config::Config;
use crate::error::AssistantError;
use crate::history::{ChatHistory, ChatTurn};
use crate::llm::{ChatModel, GroqClient};
use crate::models::{AgentKind, AgentResponse, AnalysisType, StockSnapshot};
use crate::tools::{create_default_registry, ToolRegistry, YahooFinance};
use crate::Result;

const EMPTY_QUERY: &str = "Please enter a query before submitting.";

pub const POPULAR_STOCKS: [&str; 6] = ["NVDA", "AAPL", "GOOGL", "MSFT", "TSLA", "AMZN"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub agent: AgentKind,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AskRequest {
    pub fn new(query: impl Into<String>, agent: AgentKind) -> Self {
        Self {
            query: query.into(),
            agent,
            ..Default::default()
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

}

#[derive(Debug, Clone, Serialize)]
pub struct StockAnalysis {
    pub symbol: String,
    pub analysis_type: AnalysisType,
    pub snapshot: StockSnapshot,
    pub analysis: AgentResponse,
}

//
// ================= Catalog =================
//

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub kind: AgentKind,
    pub label: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickQuery {
    pub label: &'static str,
    pub query: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOption {
    pub kind: AnalysisType,
    pub label: &'static str,
}

/// Static content the UI offers as shortcuts.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub agents: Vec<AgentInfo>,
    pub quick_queries: Vec<QuickQuery>,
    pub trending_topics: Vec<QuickQuery>,
    pub popular_stocks: Vec<&'static str>,
    pub analysis_types: Vec<AnalysisOption>,
}

const QUICK_QUERIES: [QuickQuery; 4] = [
    QuickQuery {
        label: "📈 NVDA Stock Analysis",
        query: "Get the latest analyst recommendations and stock price for NVDA",
    },
    QuickQuery {
        label: "📰 Tesla News",
        query: "Get the most recent news about Tesla (TSLA)",
    },
    QuickQuery {
        label: "🔍 Market Trends",
        query: "Search for the latest stock market trends and analysis",
    },
    QuickQuery {
        label: "💰 Apple Fundamentals",
        query: "Get fundamental analysis for Apple (AAPL) stock",
    },
];

const TRENDING_TOPICS: [QuickQuery; 5] = [
    QuickQuery {
        label: "AI News",
        query: "latest artificial intelligence news",
    },
    QuickQuery {
        label: "Tech Trends",
        query: "latest technology trends",
    },
    QuickQuery {
        label: "Market News",
        query: "stock market news today",
    },
    QuickQuery {
        label: "Crypto Updates",
        query: "cryptocurrency news today",
    },
    QuickQuery {
        label: "Market Overview",
        query: "Get current market overview including major indices performance \
                and market sentiment",
    },
];

const ANALYSIS_TYPES: [AnalysisType; 4] = [
    AnalysisType::Complete,
    AnalysisType::PriceMetrics,
    AnalysisType::Financial,
    AnalysisType::MarketResearch,
];

//
// ================= Assistant =================
//

pub struct Assistant {
    agents: AgentTeam,
    market: Arc<YahooFinance>,
    history: ChatHistory,
    model_id: String,
    api_key_configured: bool,
}

impl Assistant {
    /// Build against the hosted model and the live data APIs.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(GroqClient::new(config)?);
        let registry = create_default_registry(config)?;
        Self::with_parts(config, model, &registry)
    }

    /// Build with an explicit model and tool registry.
    pub fn with_parts(
        config: &Config,
        model: Arc<dyn ChatModel>,
        registry: &ToolRegistry,
    ) -> Result<Self> {
        let model_id = model.id().to_string();
        let agents = AgentTeam::build(model, registry, config.max_tool_rounds)?;

        info!(
            model = %model_id,
            tools = registry.list().len(),
            api_key_configured = config.api_key_configured(),
            "Assistant initialized"
        );

        Ok(Self {
            agents,
            market: Arc::new(YahooFinance::new(config)?),
            history: ChatHistory::new(config.history_capacity, config.history_max_sessions),
            model_id,
            api_key_configured: config.api_key_configured(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn api_key_configured(&self) -> bool {
        self.api_key_configured
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AgentResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AssistantError::InvalidQuery(EMPTY_QUERY.to_string()));
        }

        let symbol = parse_symbol(request.symbol.as_deref())?;

        info!(agent = ?request.agent, symbol = ?symbol, "Processing query");

        let response = match (request.agent, symbol.as_deref()) {
            (AgentKind::Finance, Some(sym)) => self.finance_with_data(query, sym).await?,
            (AgentKind::Multi, Some(sym)) if is_finance_query(query) => {
                self.finance_and_news(query, sym).await?
            }
            (AgentKind::Multi, Some(sym)) => {
                let prompt = format!("{}\n\nTicker symbol: {}", query, sym);
                self.agents.multi.run(&prompt).await?
            }
            (kind, _) => self.agents.get(kind).run(query).await?,
        };

        self.history
            .record(
                request.session_id.as_deref(),
                ChatTurn::new(query, response.content.clone(), request.agent, symbol),
            )
            .await;

        Ok(response)
    }

    /// Snapshot plus a finance-agent write-up for one analysis type.
    pub async fn analyze_stock(
        &self,
        symbol: &str,
        analysis_type: AnalysisType,
    ) -> Result<StockAnalysis> {
        let symbol = require_symbol(symbol)?;
        let snapshot = self.market.stock_snapshot(&symbol).await;

        let query = analysis_type.query_for(&symbol);
        let analysis = self
            .agents
            .finance
            .run(&finance_prompt(&query, &snapshot))
            .await?;

        Ok(StockAnalysis {
            symbol,
            analysis_type,
            snapshot,
            analysis,
        })
    }

    pub async fn stock_snapshot(&self, symbol: &str) -> Result<StockSnapshot> {
        let symbol = require_symbol(symbol)?;
        Ok(self.market.stock_snapshot(&symbol).await)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            agents: AgentKind::ALL
                .iter()
                .map(|kind| AgentInfo {
                    kind: *kind,
                    label: kind.label(),
                    description: kind.description(),
                    capabilities: kind.capabilities(),
                })
                .collect(),
            quick_queries: QUICK_QUERIES.to_vec(),
            trending_topics: TRENDING_TOPICS.to_vec(),
            popular_stocks: POPULAR_STOCKS.to_vec(),
            analysis_types: ANALYSIS_TYPES
                .iter()
                .map(|kind| AnalysisOption {
                    kind: *kind,
                    label: kind.label(),
                })
                .collect(),
        }
    }

    async fn finance_with_data(&self, query: &str, symbol: &str) -> Result<AgentResponse> {
        let snapshot = self.market.stock_snapshot(symbol).await;
        if snapshot.is_fallback() {
            warn!(
                symbol,
                "Live market data unavailable, finance agent works from knowledge"
            );
        }
        self.agents.finance.run(&finance_prompt(query, &snapshot)).await
    }

    /// Finance analysis and a news search for the same ticker, run side by side.
    async fn finance_and_news(&self, query: &str, symbol: &str) -> Result<AgentResponse> {
        let start = Instant::now();
        let news_query = format!("latest news and analysis for {}", symbol);

        let (finance, web) = tokio::join!(
            self.finance_with_data(query, symbol),
            self.agents.web.run(&news_query)
        );
        let (finance, web) = (finance?, web?);

        let content = format!(
            "## 📊 Financial Analysis\n{}\n\n## 🌐 Latest News & Web Search\n{}\n\n---\n\
             *Analysis combining real-time financial data and web search results*",
            finance.content, web.content
        );

        let mut tool_calls = finance.tool_calls;
        tool_calls.extend(web.tool_calls);

        Ok(AgentResponse {
            agent: self.agents.multi.name().to_string(),
            model: self.model_id.clone(),
            content,
            tool_calls,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn parse_symbol(raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => require_symbol(s).map(Some),
        None => Ok(None),
    }
}

fn require_symbol(raw: &str) -> Result<String> {
    normalize_symbol(raw).ok_or_else(|| {
        AssistantError::InvalidQuery(format!("'{}' is not a valid ticker symbol", raw.trim()))
    })
}

/// Hand the snapshot to the finance agent, or say plainly that live data is missing.
fn finance_prompt(query: &str, snapshot: &StockSnapshot) -> String {
    if snapshot.is_fallback() {
        format!(
            "Analyze {} ({}) in the {} sector. Query: {}\n\n\
             Note: Real-time data unavailable due to API limits. \
             Provide analysis based on your knowledge \
             and be honest about the data limitations.\n\n{}",
            snapshot.symbol,
            snapshot.company_name,
            snapshot.sector.as_deref().unwrap_or("Unknown"),
            query,
            snapshot.to_markdown()
        )
    } else {
        format!(
            "Analyze this stock data and query: {}\n\nStock Data:\n{}",
            query,
            snapshot.to_markdown()
        )
    }
}
