//! Yahoo Finance tools
//!
//! Stock price, fundamentals, analyst recommendations and company news, read
//! from the public Yahoo Finance JSON endpoints. Also produces the stock
//! snapshot shown on the dashboard, with a static fallback when the price
//! history cannot be fetched.

use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ensure_object_parameters, optional_count, require_str, Tool, ToolRegistry};
use crate::classifier::normalize_symbol;
use crate::config::Config;
use crate::error::AssistantError;
use crate::models::{NewsItem, StockSnapshot, ToolInput, ToolOutput};
use crate::Result;

pub const STOCK_PRICE: &str = "get_current_stock_price";
pub const STOCK_FUNDAMENTALS: &str = "get_stock_fundamentals";
pub const ANALYST_RECOMMENDATIONS: &str = "get_analyst_recommendations";
pub const COMPANY_NEWS: &str = "get_company_news";

pub const TOOL_NAMES: [&str; 4] = [
    STOCK_PRICE,
    STOCK_FUNDAMENTALS,
    ANALYST_RECOMMENDATIONS,
    COMPANY_NEWS,
];

pub const LIVE_SOURCE: &str = "Yahoo Finance";
pub const FALLBACK_SOURCE: &str = "Fallback Data";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) multi-agent-assistant/0.1";

const SUMMARY_MODULES: &str =
    "price,summaryDetail,assetProfile,defaultKeyStatistics,financialData,recommendationTrend";

/// (symbol, company name, sector) for the fallback snapshot
const KNOWN_COMPANIES: &[(&str, &str, &str)] = &[
    ("AAPL", "Apple Inc.", "Technology"),
    ("GOOGL", "Alphabet Inc.", "Technology"),
    ("MSFT", "Microsoft Corporation", "Technology"),
    ("NVDA", "NVIDIA Corporation", "Technology"),
    ("TSLA", "Tesla, Inc.", "Automotive"),
    ("AMZN", "Amazon.com Inc.", "E-commerce"),
];

//
// ================= Parsed payloads =================
//

#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub symbol: String,
    pub currency: Option<String>,
    pub long_name: Option<String>,
    /// Daily closes, oldest first, gaps removed
    pub closes: Vec<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Fundamentals {
    pub symbol: String,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub eps: Option<f64>,
    #[serde(rename = "52_week_high")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(rename = "52_week_low")]
    pub fifty_two_week_low: Option<f64>,
    pub fifty_day_average: Option<f64>,
    pub two_hundred_day_average: Option<f64>,
    pub beta: Option<f64>,
    pub volume: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationTrend {
    pub period: String,
    pub strong_buy: u64,
    pub buy: u64,
    pub hold: u64,
    pub sell: u64,
    pub strong_sell: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recommendations {
    pub symbol: String,
    pub recommendation_key: Option<String>,
    pub recommendation_mean: Option<f64>,
    pub number_of_analysts: Option<u64>,
    pub target_mean_price: Option<f64>,
    pub target_high_price: Option<f64>,
    pub target_low_price: Option<f64>,
    pub trend: Vec<RecommendationTrend>,
}

//
// ================= Snapshot cache =================
//

/// Per-key memo with a fixed time-to-live.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn insert(&self, key: String, value: V) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }
}

//
// ================= Client =================
//

pub struct YahooFinance {
    client: Client,
    base_url: String,
    cookie_url: String,
    /// Crumb for quoteSummary, tied to the session cookie in `client`
    crumb: RwLock<Option<String>>,
    snapshots: TtlCache<StockSnapshot>,
}

impl YahooFinance {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.yahoo_base_url.clone(),
            cookie_url: config.yahoo_cookie_url.clone(),
            crumb: RwLock::new(None),
            snapshots: TtlCache::new(config.stock_cache_ttl),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            AssistantError::ConfigError(format!("Invalid Yahoo Finance base URL: {}", e))
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                AssistantError::ConfigError("Yahoo Finance base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, url: Url, query: &[(&str, String)]) -> Result<(StatusCode, String)> {
        let path = url.path().to_string();

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                AssistantError::ToolError(format!(
                    "Yahoo Finance request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value> {
        let path = url.path().to_string();
        let (status, body) = self.send(url, query).await?;
        decode_json(&path, status, &body)
    }

    /// Cached crumb, or a fresh one when `refresh` is set or none is held yet.
    async fn crumb(&self, refresh: bool) -> Result<String> {
        if !refresh {
            if let Some(crumb) = self.crumb.read().await.clone() {
                return Ok(crumb);
            }
        }

        let mut slot = self.crumb.write().await;
        if !refresh {
            if let Some(crumb) = slot.clone() {
                return Ok(crumb);
            }
        }

        // The cookie page answers 404 but still sets the session cookie.
        if let Err(e) = self.client.get(&self.cookie_url).send().await {
            debug!(error = %e, "Yahoo cookie request failed");
        }

        let url = self.endpoint(&["v1", "test", "getcrumb"])?;
        let (status, body) = self.send(url, &[]).await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AssistantError::RateLimited("Yahoo Finance".to_string()));
        }

        let crumb = body.trim().to_string();
        if !status.is_success() || crumb.is_empty() || crumb.contains('<') {
            return Err(AssistantError::ToolError(format!(
                "Yahoo Finance crumb unavailable ({})",
                status
            )));
        }

        debug!("Obtained Yahoo Finance crumb");
        *slot = Some(crumb.clone());
        Ok(crumb)
    }

    pub async fn price_history(&self, symbol: &str) -> Result<PriceHistory> {
        let url = self.endpoint(&["v8", "finance", "chart", symbol])?;
        let body = self
            .get_json(
                url,
                &[("range", "5d".to_string()), ("interval", "1d".to_string())],
            )
            .await?;
        parse_chart(symbol, &body)
    }

    async fn quote_summary(&self, symbol: &str) -> Result<Value> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary", symbol])?;
        let path = url.path().to_string();
        let query = |crumb: String| [("modules", SUMMARY_MODULES.to_string()), ("crumb", crumb)];

        let crumb = self.crumb(false).await?;
        let (mut status, mut body) = self.send(url.clone(), &query(crumb)).await?;

        // A stale crumb is answered with 401; refresh it once.
        if status == StatusCode::UNAUTHORIZED {
            debug!(symbol, "Yahoo Finance rejected crumb, refreshing");
            let crumb = self.crumb(true).await?;
            (status, body) = self.send(url, &query(crumb)).await?;
        }

        summary_result(&decode_json(&path, status, &body)?)
    }

    pub async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let summary = self.quote_summary(symbol).await?;
        Ok(parse_fundamentals(symbol, &summary))
    }

    pub async fn recommendations(&self, symbol: &str) -> Result<Recommendations> {
        let summary = self.quote_summary(symbol).await?;
        Ok(parse_recommendations(symbol, &summary))
    }

    pub async fn company_news(&self, symbol: &str, count: usize) -> Result<Vec<NewsItem>> {
        let url = self.endpoint(&["v1", "finance", "search"])?;
        let body = self
            .get_json(
                url,
                &[
                    ("q", symbol.to_string()),
                    ("quotesCount", "0".to_string()),
                    ("newsCount", count.to_string()),
                ],
            )
            .await?;
        let mut news = parse_news(&body);
        news.truncate(count);
        Ok(news)
    }

    /// Dashboard snapshot. Never fails: an unavailable price history yields
    /// the fallback snapshot instead. Only live snapshots are cached.
    pub async fn stock_snapshot(&self, symbol: &str) -> StockSnapshot {
        if let Some(cached) = self.snapshots.get(symbol).await {
            debug!(symbol, "Stock snapshot served from cache");
            return cached;
        }

        let history = match self.price_history(symbol).await {
            Ok(history) => history,
            Err(e) => {
                warn!(symbol, error = %e, "Price history unavailable, using fallback data");
                return fallback_snapshot(symbol, &e.to_string());
            }
        };

        // Fundamentals are best-effort: the snapshot stands on the history alone.
        let fundamentals = match self.fundamentals(symbol).await {
            Ok(f) => Some(f),
            Err(e) => {
                debug!(symbol, error = %e, "Fundamentals unavailable for snapshot");
                None
            }
        };

        match build_snapshot(symbol, &history, fundamentals.as_ref()) {
            Ok(snapshot) => {
                info!(symbol, price = ?snapshot.current_price, "Stock snapshot fetched");
                self.snapshots.insert(symbol.to_string(), snapshot.clone()).await;
                snapshot
            }
            Err(e) => fallback_snapshot(symbol, &e.to_string()),
        }
    }
}

//
// ================= Parsing =================
//

fn decode_json(path: &str, status: StatusCode, body: &str) -> Result<Value> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AssistantError::RateLimited("Yahoo Finance".to_string()));
    }
    if !status.is_success() {
        return Err(AssistantError::ToolError(format!(
            "Yahoo Finance returned {} for {}: {}",
            status,
            path,
            body.chars().take(200).collect::<String>()
        )));
    }

    serde_json::from_str(body)
        .map_err(|e| AssistantError::ToolError(format!("Invalid JSON response: {}", e)))
}

/// Read a Yahoo numeric field, which is either `{"raw": n, "fmt": ".."}` or a bare number.
fn raw_f64(value: &Value) -> Option<f64> {
    value
        .get("raw")
        .and_then(Value::as_f64)
        .or_else(|| value.as_f64())
}

fn field_f64(summary: &Value, module: &str, field: &str) -> Option<f64> {
    summary.get(module).and_then(|m| m.get(field)).and_then(raw_f64)
}

fn field_str(summary: &Value, module: &str, field: &str) -> Option<String> {
    summary
        .get(module)
        .and_then(|m| m.get(field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn upstream_error(body: &Value, root: &str) -> Option<String> {
    let error = body.get(root)?.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    )
}

pub fn parse_chart(symbol: &str, body: &Value) -> Result<PriceHistory> {
    if let Some(description) = upstream_error(body, "chart") {
        return Err(AssistantError::ToolError(format!(
            "No price data for {}: {}",
            symbol, description
        )));
    }

    let result = body
        .pointer("/chart/result/0")
        .ok_or_else(|| AssistantError::ToolError(format!("No price data for {}", symbol)))?;

    let meta = result.get("meta").cloned().unwrap_or(Value::Null);

    let closes = result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    Ok(PriceHistory {
        symbol: symbol.to_string(),
        currency: meta.get("currency").and_then(Value::as_str).map(str::to_string),
        long_name: meta
            .get("longName")
            .or_else(|| meta.get("shortName"))
            .and_then(Value::as_str)
            .map(str::to_string),
        closes,
        fifty_two_week_high: meta.get("fiftyTwoWeekHigh").and_then(Value::as_f64),
        fifty_two_week_low: meta.get("fiftyTwoWeekLow").and_then(Value::as_f64),
        volume: meta.get("regularMarketVolume").and_then(Value::as_u64),
    })
}

fn summary_result(body: &Value) -> Result<Value> {
    if let Some(description) = upstream_error(body, "quoteSummary") {
        return Err(AssistantError::ToolError(format!(
            "Quote summary unavailable: {}",
            description
        )));
    }
    body.pointer("/quoteSummary/result/0")
        .cloned()
        .ok_or_else(|| AssistantError::ToolError("Quote summary returned no result".to_string()))
}

pub fn parse_fundamentals(symbol: &str, summary: &Value) -> Fundamentals {
    Fundamentals {
        symbol: symbol.to_string(),
        company_name: field_str(summary, "price", "longName")
            .or_else(|| field_str(summary, "price", "shortName")),
        sector: field_str(summary, "assetProfile", "sector"),
        industry: field_str(summary, "assetProfile", "industry"),
        market_cap: field_f64(summary, "price", "marketCap")
            .or_else(|| field_f64(summary, "summaryDetail", "marketCap")),
        pe_ratio: field_f64(summary, "summaryDetail", "trailingPE"),
        forward_pe: field_f64(summary, "summaryDetail", "forwardPE"),
        price_to_book: field_f64(summary, "defaultKeyStatistics", "priceToBook"),
        dividend_yield: field_f64(summary, "summaryDetail", "dividendYield"),
        eps: field_f64(summary, "defaultKeyStatistics", "trailingEps"),
        fifty_two_week_high: field_f64(summary, "summaryDetail", "fiftyTwoWeekHigh"),
        fifty_two_week_low: field_f64(summary, "summaryDetail", "fiftyTwoWeekLow"),
        fifty_day_average: field_f64(summary, "summaryDetail", "fiftyDayAverage"),
        two_hundred_day_average: field_f64(summary, "summaryDetail", "twoHundredDayAverage"),
        beta: field_f64(summary, "summaryDetail", "beta"),
        volume: field_f64(summary, "summaryDetail", "volume").map(|v| v as u64),
    }
}

pub fn parse_recommendations(symbol: &str, summary: &Value) -> Recommendations {
    let count = |row: &Value, key: &str| row.get(key).and_then(raw_f64).unwrap_or(0.0) as u64;

    let trend = summary
        .pointer("/recommendationTrend/trend")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| RecommendationTrend {
                    period: row
                        .get("period")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    strong_buy: count(row, "strongBuy"),
                    buy: count(row, "buy"),
                    hold: count(row, "hold"),
                    sell: count(row, "sell"),
                    strong_sell: count(row, "strongSell"),
                })
                .collect()
        })
        .unwrap_or_default();

    Recommendations {
        symbol: symbol.to_string(),
        recommendation_key: field_str(summary, "financialData", "recommendationKey"),
        recommendation_mean: field_f64(summary, "financialData", "recommendationMean"),
        number_of_analysts: field_f64(summary, "financialData", "numberOfAnalystOpinions")
            .map(|v| v as u64),
        target_mean_price: field_f64(summary, "financialData", "targetMeanPrice"),
        target_high_price: field_f64(summary, "financialData", "targetHighPrice"),
        target_low_price: field_f64(summary, "financialData", "targetLowPrice"),
        trend,
    }
}

pub fn parse_news(body: &Value) -> Vec<NewsItem> {
    body.get("news")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let title = item.get("title").and_then(Value::as_str)?;
                    let link = item.get("link").and_then(Value::as_str)?;
                    Some(NewsItem {
                        title: title.to_string(),
                        publisher: item
                            .get("publisher")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        link: link.to_string(),
                        published_at: item
                            .get("providerPublishTime")
                            .and_then(Value::as_i64)
                            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Combine the price history and (optional) fundamentals into a snapshot.
pub fn build_snapshot(
    symbol: &str,
    history: &PriceHistory,
    fundamentals: Option<&Fundamentals>,
) -> Result<StockSnapshot> {
    let current = *history.closes.last().ok_or_else(|| {
        AssistantError::ToolError("No historical data available".to_string())
    })?;

    let previous = if history.closes.len() > 1 {
        history.closes[history.closes.len() - 2]
    } else {
        current
    };

    let change_percent = if previous != 0.0 {
        Some(round2((current - previous) / previous * 100.0))
    } else {
        None
    };

    let f = fundamentals.cloned().unwrap_or_default();

    Ok(StockSnapshot {
        symbol: symbol.to_string(),
        company_name: f
            .company_name
            .or_else(|| history.long_name.clone())
            .unwrap_or_else(|| symbol.to_string()),
        current_price: Some(round2(current)),
        previous_close: Some(round2(previous)),
        price_change: Some(round2(current - previous)),
        price_change_percent: change_percent,
        currency: history.currency.clone(),
        market_cap: f.market_cap,
        pe_ratio: f.pe_ratio,
        dividend_yield: f.dividend_yield,
        fifty_two_week_high: f.fifty_two_week_high.or(history.fifty_two_week_high),
        fifty_two_week_low: f.fifty_two_week_low.or(history.fifty_two_week_low),
        sector: f.sector,
        industry: f.industry,
        volume: f.volume.or(history.volume),
        data_source: LIVE_SOURCE.to_string(),
        error_msg: None,
        note: None,
        fetched_at: Utc::now(),
    })
}

/// Snapshot used when live data cannot be fetched.
pub fn fallback_snapshot(symbol: &str, error: &str) -> StockSnapshot {
    let (company_name, sector) = KNOWN_COMPANIES
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(symbol))
        .map(|(_, name, sector)| (name.to_string(), sector.to_string()))
        .unwrap_or_else(|| (format!("{} Corporation", symbol), "Unknown".to_string()));

    StockSnapshot {
        symbol: symbol.to_string(),
        company_name,
        current_price: None,
        previous_close: None,
        price_change: None,
        price_change_percent: None,
        currency: None,
        market_cap: None,
        pe_ratio: None,
        dividend_yield: None,
        fifty_two_week_high: None,
        fifty_two_week_low: None,
        sector: Some(sector),
        industry: None,
        volume: None,
        data_source: FALLBACK_SOURCE.to_string(),
        error_msg: Some(format!("API Error: {}", error)),
        note: Some(
            "Using AI analysis instead of real-time data due to API limitations".to_string(),
        ),
        fetched_at: Utc::now(),
    }
}

//
// ================= Tools =================
//

fn symbol_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "The stock ticker symbol, e.g. NVDA"
            }
        },
        "required": ["symbol"]
    })
}

fn require_symbol(input: &ToolInput) -> Result<String> {
    ensure_object_parameters(input)?;
    let raw = require_str(input, "symbol")?;
    normalize_symbol(raw).ok_or_else(|| {
        AssistantError::InvalidToolInput(format!("'{}' is not a valid ticker symbol", raw))
    })
}

pub struct StockPriceTool {
    api: Arc<YahooFinance>,
}

#[async_trait::async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        STOCK_PRICE
    }

    fn description(&self) -> &'static str {
        "Use this function to get the current stock price for a given symbol."
    }

    fn parameters(&self) -> Value {
        symbol_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_symbol(input)?;
        let history = self.api.price_history(&symbol).await?;
        let snapshot = build_snapshot(&symbol, &history, None)?;

        Ok(ToolOutput::ok(json!({
            "symbol": symbol,
            "price": snapshot.current_price,
            "currency": snapshot.currency,
            "previous_close": snapshot.previous_close,
            "change": snapshot.price_change,
            "change_percent": snapshot.price_change_percent,
        })))
    }
}

pub struct StockFundamentalsTool {
    api: Arc<YahooFinance>,
}

#[async_trait::async_trait]
impl Tool for StockFundamentalsTool {
    fn name(&self) -> &'static str {
        STOCK_FUNDAMENTALS
    }

    fn description(&self) -> &'static str {
        "Use this function to get fundamental data for a given stock symbol: \
         company name, sector, industry, market cap, P/E ratio, EPS, dividend yield, \
         52-week range and moving averages."
    }

    fn parameters(&self) -> Value {
        symbol_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_symbol(input)?;
        let fundamentals = self.api.fundamentals(&symbol).await?;
        Ok(ToolOutput::ok(serde_json::to_value(fundamentals)?))
    }
}

pub struct AnalystRecommendationsTool {
    api: Arc<YahooFinance>,
}

#[async_trait::async_trait]
impl Tool for AnalystRecommendationsTool {
    fn name(&self) -> &'static str {
        ANALYST_RECOMMENDATIONS
    }

    fn description(&self) -> &'static str {
        "Use this function to get analyst recommendations and price targets for a given stock symbol."
    }

    fn parameters(&self) -> Value {
        symbol_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_symbol(input)?;
        let recommendations = self.api.recommendations(&symbol).await?;
        Ok(ToolOutput::ok(serde_json::to_value(recommendations)?))
    }
}

pub struct CompanyNewsTool {
    api: Arc<YahooFinance>,
}

#[async_trait::async_trait]
impl Tool for CompanyNewsTool {
    fn name(&self) -> &'static str {
        COMPANY_NEWS
    }

    fn description(&self) -> &'static str {
        "Use this function to get company news and press releases for a given stock symbol."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "The stock ticker symbol, e.g. NVDA"
                },
                "num_stories": {
                    "type": "integer",
                    "description": "Number of stories to return. Defaults to 3."
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let symbol = require_symbol(input)?;
        let count = optional_count(input, "num_stories", 3, 20);
        let news = self.api.company_news(&symbol, count).await?;

        Ok(ToolOutput::ok(json!({
            "symbol": symbol,
            "news": news,
        })))
    }
}

pub fn register_tools(registry: &mut ToolRegistry, api: Arc<YahooFinance>) {
    registry.register(Arc::new(StockPriceTool { api: api.clone() }));
    registry.register(Arc::new(StockFundamentalsTool { api: api.clone() }));
    registry.register(Arc::new(AnalystRecommendationsTool { api: api.clone() }));
    registry.register(Arc::new(CompanyNewsTool { api }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_fixture(closes: Value) -> Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {
                        "currency": "USD",
                        "symbol": "NVDA",
                        "longName": "NVIDIA Corporation",
                        "fiftyTwoWeekHigh": 153.13,
                        "fiftyTwoWeekLow": 86.62,
                        "regularMarketVolume": 180000000u64
                    },
                    "timestamp": [1, 2, 3],
                    "indicators": { "quote": [{ "close": closes }] }
                }],
                "error": null
            }
        })
    }

    fn summary_fixture() -> Value {
        json!({
            "price": {
                "longName": "NVIDIA Corporation",
                "marketCap": { "raw": 3.4e12, "fmt": "3.4T" }
            },
            "summaryDetail": {
                "trailingPE": { "raw": 55.2, "fmt": "55.20" },
                "forwardPE": { "raw": 32.1 },
                "dividendYield": { "raw": 0.0003 },
                "fiftyTwoWeekHigh": { "raw": 153.13 },
                "fiftyTwoWeekLow": { "raw": 86.62 },
                "beta": { "raw": 1.7 },
                "volume": { "raw": 200000000.0 }
            },
            "assetProfile": { "sector": "Technology", "industry": "Semiconductors" },
            "defaultKeyStatistics": { "trailingEps": { "raw": 2.53 } },
            "financialData": {
                "recommendationKey": "strong_buy",
                "recommendationMean": { "raw": 1.4 },
                "numberOfAnalystOpinions": { "raw": 58 },
                "targetMeanPrice": { "raw": 170.5 }
            },
            "recommendationTrend": {
                "trend": [
                    { "period": "0m", "strongBuy": 12, "buy": 45, "hold": 6, "sell": 0, "strongSell": 0 },
                    { "period": "-1m", "strongBuy": 11, "buy": 44, "hold": 7, "sell": 1, "strongSell": 0 }
                ]
            }
        })
    }

    #[test]
    fn test_parse_chart_skips_null_closes() {
        let history = parse_chart("NVDA", &chart_fixture(json!([120.0, null, 130.5]))).unwrap();
        assert_eq!(history.closes, vec![120.0, 130.5]);
        assert_eq!(history.currency.as_deref(), Some("USD"));
        assert_eq!(history.long_name.as_deref(), Some("NVIDIA Corporation"));
    }

    #[test]
    fn test_parse_chart_upstream_error() {
        let body = json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        });
        let err = parse_chart("ZZZZ", &body).unwrap_err();
        assert!(err.to_string().contains("symbol may be delisted"));
    }

    #[test]
    fn test_snapshot_price_change() {
        let history = parse_chart("NVDA", &chart_fixture(json!([100.0, 110.0]))).unwrap();
        let fundamentals = parse_fundamentals("NVDA", &summary_fixture());
        let snapshot = build_snapshot("NVDA", &history, Some(&fundamentals)).unwrap();

        assert_eq!(snapshot.current_price, Some(110.0));
        assert_eq!(snapshot.previous_close, Some(100.0));
        assert_eq!(snapshot.price_change, Some(10.0));
        assert_eq!(snapshot.price_change_percent, Some(10.0));
        assert_eq!(snapshot.sector.as_deref(), Some("Technology"));
        assert_eq!(snapshot.pe_ratio, Some(55.2));
        assert!(!snapshot.is_fallback());
    }

    #[test]
    fn test_snapshot_single_close_has_no_change() {
        let history = parse_chart("NVDA", &chart_fixture(json!([123.456]))).unwrap();
        let snapshot = build_snapshot("NVDA", &history, None).unwrap();

        assert_eq!(snapshot.current_price, Some(123.46));
        assert_eq!(snapshot.price_change, Some(0.0));
        assert_eq!(snapshot.company_name, "NVIDIA Corporation");
        assert_eq!(snapshot.volume, Some(180000000));
    }

    #[test]
    fn test_snapshot_requires_history() {
        let history = parse_chart("NVDA", &chart_fixture(json!([]))).unwrap();
        let err = build_snapshot("NVDA", &history, None).unwrap_err();
        assert!(err.to_string().contains("No historical data"));
    }

    #[test]
    fn test_fallback_snapshot() {
        let known = fallback_snapshot("TSLA", "429 Too Many Requests");
        assert_eq!(known.company_name, "Tesla, Inc.");
        assert_eq!(known.sector.as_deref(), Some("Automotive"));
        assert!(known.is_fallback());
        assert!(known.error_msg.unwrap().contains("429"));

        let unknown = fallback_snapshot("ACME", "timeout");
        assert_eq!(unknown.company_name, "ACME Corporation");
        assert_eq!(unknown.sector.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_parse_fundamentals() {
        let f = parse_fundamentals("NVDA", &summary_fixture());
        assert_eq!(f.company_name.as_deref(), Some("NVIDIA Corporation"));
        assert_eq!(f.industry.as_deref(), Some("Semiconductors"));
        assert_eq!(f.market_cap, Some(3.4e12));
        assert_eq!(f.eps, Some(2.53));
        assert_eq!(f.volume, Some(200000000));
        assert_eq!(f.price_to_book, None);
    }

    #[test]
    fn test_parse_recommendations() {
        let r = parse_recommendations("NVDA", &summary_fixture());
        assert_eq!(r.recommendation_key.as_deref(), Some("strong_buy"));
        assert_eq!(r.number_of_analysts, Some(58));
        assert_eq!(r.trend.len(), 2);
        assert_eq!(r.trend[0].period, "0m");
        assert_eq!(r.trend[0].buy, 45);
        assert_eq!(r.trend[1].sell, 1);
    }

    #[test]
    fn test_summary_error_is_surfaced() {
        let body = json!({
            "quoteSummary": { "result": null, "error": { "code": "Unauthorized", "description": "Invalid Crumb" } }
        });
        let err = summary_result(&body).unwrap_err();
        assert!(err.to_string().contains("Invalid Crumb"));
    }

    #[test]
    fn test_parse_news() {
        let body = json!({
            "news": [
                {
                    "uuid": "a",
                    "title": "NVIDIA beats estimates",
                    "publisher": "Reuters",
                    "link": "https://example.com/a",
                    "providerPublishTime": 1700000000
                },
                { "uuid": "b", "title": "missing link" }
            ]
        });
        let news = parse_news(&body);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].publisher.as_deref(), Some("Reuters"));
        assert_eq!(news[0].published_at.unwrap().timestamp(), 1700000000);
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let mut config = Config::default();
        config.yahoo_base_url = "http://localhost:9999/".to_string();
        let api = YahooFinance::new(&config).unwrap();

        let url = api.endpoint(&["v8", "finance", "chart", "BRK.B"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9999/v8/finance/chart/BRK.B");
    }

    #[tokio::test]
    async fn test_cache_respects_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("NVDA".to_string(), 1u32).await;
        assert_eq!(cache.get("NVDA").await, Some(1));
        assert_eq!(cache.get("AAPL").await, None);

        let expired = TtlCache::new(Duration::ZERO);
        expired.insert("NVDA".to_string(), 1u32).await;
        assert_eq!(expired.get("NVDA").await, None);
    }

    #[tokio::test]
    async fn test_tools_reject_invalid_symbol() {
        let api = Arc::new(YahooFinance::new(&Config::default()).unwrap());
        let tool = StockPriceTool { api };
        let input = ToolInput {
            tool_name: STOCK_PRICE.to_string(),
            parameters: json!({ "symbol": "not a ticker!" }),
        };

        let err = tool.execute(&input).await.unwrap_err();
        assert!(matches!(err, AssistantError::InvalidToolInput(_)));
    }

    //
    // ---- against a local Yahoo stand-in ----
    //

    use crate::tools::testing::serve;
    use axum::extract::{Query, State};
    use axum::http::header;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Upstream {
        served_crumb: Mutex<String>,
        accepted_crumb: Mutex<String>,
        chart_status: StatusCode,
        cookie_visits: AtomicUsize,
        crumb_requests: AtomicUsize,
        chart_requests: AtomicUsize,
    }

    impl Upstream {
        fn new(crumb: &str) -> Self {
            Self {
                served_crumb: Mutex::new(crumb.to_string()),
                accepted_crumb: Mutex::new(crumb.to_string()),
                chart_status: StatusCode::OK,
                cookie_visits: AtomicUsize::new(0),
                crumb_requests: AtomicUsize::new(0),
                chart_requests: AtomicUsize::new(0),
            }
        }
    }

    async fn consent(State(up): State<Arc<Upstream>>) -> Response {
        up.cookie_visits.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::NOT_FOUND,
            [(header::SET_COOKIE, "A3=session-token; Path=/")],
            "",
        )
            .into_response()
    }

    async fn getcrumb(State(up): State<Arc<Upstream>>) -> String {
        up.crumb_requests.fetch_add(1, Ordering::SeqCst);
        up.served_crumb.lock().unwrap().clone()
    }

    async fn chart(State(up): State<Arc<Upstream>>) -> Response {
        up.chart_requests.fetch_add(1, Ordering::SeqCst);
        if up.chart_status.is_success() {
            axum::Json(chart_fixture(json!([100.0, 110.0]))).into_response()
        } else {
            (up.chart_status, "upstream trouble").into_response()
        }
    }

    async fn quote_summary(
        State(up): State<Arc<Upstream>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        let accepted = up.accepted_crumb.lock().unwrap().clone();
        if params.get("crumb") == Some(&accepted) {
            axum::Json(json!({ "quoteSummary": { "result": [summary_fixture()], "error": null } }))
                .into_response()
        } else {
            (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({
                    "finance": {
                        "result": null,
                        "error": { "code": "Unauthorized", "description": "Invalid Crumb" }
                    }
                })),
            )
                .into_response()
        }
    }

    async fn start(upstream: Arc<Upstream>) -> YahooFinance {
        let router = Router::new()
            .route("/consent", get(consent))
            .route("/v1/test/getcrumb", get(getcrumb))
            .route("/v8/finance/chart/:symbol", get(chart))
            .route("/v10/finance/quoteSummary/:symbol", get(quote_summary))
            .with_state(upstream);
        let base = serve(router).await;

        let config = Config {
            yahoo_cookie_url: format!("{}/consent", base),
            yahoo_base_url: base,
            ..Config::default()
        };
        YahooFinance::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_quote_summary_sends_crumb() {
        let upstream = Arc::new(Upstream::new("crumb-1"));
        let api = start(upstream.clone()).await;

        let fundamentals = tokio_test::assert_ok!(api.fundamentals("NVDA").await);
        assert_eq!(fundamentals.sector.as_deref(), Some("Technology"));

        let recommendations = tokio_test::assert_ok!(api.recommendations("NVDA").await);
        assert_eq!(recommendations.trend.len(), 2);

        // one handshake serves both calls
        assert_eq!(upstream.cookie_visits.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.crumb_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_crumb_is_refreshed_once() {
        let upstream = Arc::new(Upstream::new("crumb-1"));
        let api = start(upstream.clone()).await;
        tokio_test::assert_ok!(api.fundamentals("NVDA").await);

        *upstream.served_crumb.lock().unwrap() = "crumb-2".to_string();
        *upstream.accepted_crumb.lock().unwrap() = "crumb-2".to_string();

        tokio_test::assert_ok!(api.recommendations("NVDA").await);
        assert_eq!(upstream.crumb_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_crumb_is_reported() {
        let upstream = Arc::new(Upstream::new("crumb-1"));
        *upstream.accepted_crumb.lock().unwrap() = "something-else".to_string();
        let api = start(upstream.clone()).await;

        let err = api.fundamentals("NVDA").await.unwrap_err();
        assert!(err.to_string().contains("Invalid Crumb"));
        // initial fetch plus a single refresh
        assert_eq!(upstream.crumb_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_live_snapshot_is_cached() {
        let upstream = Arc::new(Upstream::new("crumb-1"));
        let api = start(upstream.clone()).await;

        let first = api.stock_snapshot("NVDA").await;
        assert!(!first.is_fallback());
        assert_eq!(first.current_price, Some(110.0));
        assert_eq!(first.sector.as_deref(), Some("Technology"));
        assert_eq!(first.pe_ratio, Some(55.2));

        let second = api.stock_snapshot("NVDA").await;
        assert_eq!(second, first);
        assert_eq!(upstream.chart_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_snapshot_is_not_cached() {
        let mut upstream = Upstream::new("crumb-1");
        upstream.chart_status = StatusCode::INTERNAL_SERVER_ERROR;
        let upstream = Arc::new(upstream);
        let api = start(upstream.clone()).await;

        assert!(api.stock_snapshot("AAPL").await.is_fallback());
        assert!(api.stock_snapshot("AAPL").await.is_fallback());
        assert_eq!(upstream.chart_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chart_rate_limit() {
        let mut upstream = Upstream::new("crumb-1");
        upstream.chart_status = StatusCode::TOO_MANY_REQUESTS;
        let api = start(Arc::new(upstream)).await;

        let err = api.price_history("NVDA").await.unwrap_err();
        assert!(matches!(err, AssistantError::RateLimited(_)));
    }
}
