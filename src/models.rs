//! Core data models for the assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AssistantError;

//
// ================= Agent selection =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Multi,
    WebSearch,
    Finance,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Multi, AgentKind::WebSearch, AgentKind::Finance];

    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Multi => "Multi-Agent System",
            AgentKind::WebSearch => "Web Search Agent",
            AgentKind::Finance => "Finance Agent",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentKind::Multi => "Combines web search and financial analysis capabilities",
            AgentKind::WebSearch => "Searches the web for general information",
            AgentKind::Finance => "Provides financial data, stock analysis, and market insights",
        }
    }

    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            AgentKind::Multi => &[
                "Web Search (DuckDuckGo)",
                "Financial Data (Yahoo Finance)",
                "Stock Prices & Analysis",
                "Company News",
                "Analyst Recommendations",
            ],
            AgentKind::WebSearch => &[
                "Web Search (DuckDuckGo)",
                "Source Citations",
                "General Information Retrieval",
            ],
            AgentKind::Finance => &[
                "Stock Prices",
                "Analyst Recommendations",
                "Company Fundamentals",
                "Financial News",
                "Market Data",
            ],
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for AgentKind {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "multi" | "multi_agent" | "multi_agent_system" | "team" => Ok(AgentKind::Multi),
            "web" | "web_search" | "web_search_agent" | "search" => Ok(AgentKind::WebSearch),
            "finance" | "finance_agent" | "financial" => Ok(AgentKind::Finance),
            other => Err(AssistantError::InvalidQuery(format!(
                "Unknown agent: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    #[default]
    Complete,
    PriceMetrics,
    Financial,
    MarketResearch,
}

impl AnalysisType {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisType::Complete => "Complete Analysis",
            AnalysisType::PriceMetrics => "Current Price & Metrics",
            AnalysisType::Financial => "Financial Analysis",
            AnalysisType::MarketResearch => "Market Research",
        }
    }

    pub fn query_for(&self, symbol: &str) -> String {
        match self {
            AnalysisType::Complete => {
                format!("Provide a comprehensive financial analysis for {}", symbol)
            }
            AnalysisType::PriceMetrics => {
                format!("Analyze the stock metrics and trends for {}", symbol)
            }
            AnalysisType::Financial => {
                format!("Provide detailed financial analysis for {}", symbol)
            }
            AnalysisType::MarketResearch => {
                format!("Research market sentiment and developments for {}", symbol)
            }
        }
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// One tool invocation made while an agent produced its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub execution_time_ms: u64,
}

//
// ================= Agent output =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent: String,
    pub model: String,
    /// Markdown answer
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub elapsed_ms: u64,
}

//
// ================= Market data =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockSnapshot {
    pub symbol: String,
    pub company_name: String,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_percent: Option<f64>,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    #[serde(rename = "52_week_high")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(rename = "52_week_low")]
    pub fifty_two_week_low: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub volume: Option<u64>,
    pub data_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl StockSnapshot {
    pub fn is_fallback(&self) -> bool {
        self.data_source == crate::tools::yfinance::FALLBACK_SOURCE
    }

    /// Markdown table used when handing the snapshot to the finance agent.
    pub fn to_markdown(&self) -> String {
        fn money(v: Option<f64>) -> String {
            v.map(|v| format!("${:.2}", v)).unwrap_or_else(|| "N/A".into())
        }
        fn plain<T: fmt::Display>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_else(|| "N/A".into())
        }

        let mut out = format!(
            "**Stock Information for {} ({})**\n\n| Metric | Value |\n|--------|-------|\n",
            self.company_name, self.symbol
        );

        if self.is_fallback() {
            out.push_str(&format!("| Sector | {} |\n", plain(self.sector.as_deref())));
            out.push_str(&format!("| Data Source | {} |\n", self.data_source));
            out.push_str("| API Status | Limited due to rate limiting |\n");
            if let Some(err) = &self.error_msg {
                out.push_str(&format!("\n**Error Details**: {}\n", err));
            }
            return out;
        }

        let indicator = match self.price_change {
            Some(c) if c > 0.0 => "📈",
            Some(c) if c < 0.0 => "📉",
            _ => "➡️",
        };

        out.push_str(&format!("| Current Price | {} |\n", money(self.current_price)));
        out.push_str(&format!("| Previous Close | {} |\n", money(self.previous_close)));
        out.push_str(&format!(
            "| Price Change | {} {} ({}%) |\n",
            indicator,
            money(self.price_change),
            plain(self.price_change_percent)
        ));
        out.push_str(&format!("| Market Cap | {} |\n", plain(self.market_cap.map(|m| m as u64))));
        out.push_str(&format!("| P/E Ratio | {} |\n", plain(self.pe_ratio)));
        out.push_str(&format!("| Dividend Yield | {} |\n", plain(self.dividend_yield)));
        out.push_str(&format!("| 52 Week High | {} |\n", money(self.fifty_two_week_high)));
        out.push_str(&format!("| 52 Week Low | {} |\n", money(self.fifty_two_week_low)));
        out.push_str(&format!("| Sector | {} |\n", plain(self.sector.as_deref())));
        out.push_str(&format!("| Industry | {} |\n", plain(self.industry.as_deref())));
        out.push_str(&format!("| Volume | {} |\n", plain(self.volume)));
        out.push_str(&format!("| Data Source | {} |\n", self.data_source));
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub publisher: Option<String>,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub href: String,
    pub body: String,
}
