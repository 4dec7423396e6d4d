//! DuckDuckGo web search tools
//!
//! Queries the DuckDuckGo HTML endpoint and scrapes the result list.

use reqwest::{Client, StatusCode, Url};
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ensure_object_parameters, optional_count, require_str, Tool, ToolRegistry};
use crate::config::Config;
use crate::error::AssistantError;
use crate::models::{SearchResult, ToolInput, ToolOutput};
use crate::Result;

pub const SEARCH: &str = "duckduckgo_search";
pub const NEWS: &str = "duckduckgo_news";

pub const TOOL_NAMES: [&str; 2] = [SEARCH, NEWS];

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) multi-agent-assistant/0.1";

/// Recency filter accepted by the `df` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Any,
    PastDay,
    PastWeek,
    PastMonth,
}

impl TimeRange {
    fn as_param(&self) -> Option<&'static str> {
        match self {
            TimeRange::Any => None,
            TimeRange::PastDay => Some("d"),
            TimeRange::PastWeek => Some("w"),
            TimeRange::PastMonth => Some("m"),
        }
    }
}

pub struct DuckDuckGo {
    client: Client,
    base_url: String,
}

impl DuckDuckGo {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.duckduckgo_base_url.clone(),
        })
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        range: TimeRange,
    ) -> Result<Vec<SearchResult>> {
        let url = format!("{}/html/", self.base_url);

        let mut form = vec![("q", query.to_string())];
        if let Some(df) = range.as_param() {
            form.push(("df", df.to_string()));
        }

        debug!(query, ?range, "Searching DuckDuckGo");

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AssistantError::ToolError(format!("DuckDuckGo request failed: {}", e)))?;

        let status = response.status();
        // DuckDuckGo answers bursts with 202 + a challenge page.
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::ACCEPTED {
            return Err(AssistantError::RateLimited("DuckDuckGo".to_string()));
        }
        if !status.is_success() {
            return Err(AssistantError::ToolError(format!(
                "DuckDuckGo returned {}",
                status
            )));
        }

        let html = response.text().await?;
        let mut results = parse_results(&html);
        results.truncate(max_results);

        info!(query, count = results.len(), "DuckDuckGo search completed");
        Ok(results)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the HTML result page into title/link/snippet triples.
pub fn parse_results(html: &str) -> Vec<SearchResult> {
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);

    document
        .select(&result_sel)
        .filter(|result| {
            // Sponsored entries carry the result--ad class.
            !result
                .value()
                .classes()
                .any(|class| class == "result--ad")
        })
        .filter_map(|result| {
            let link = result.select(&link_sel).next()?;
            let href = resolve_href(link.value().attr("href")?)?;
            let title = element_text(link);
            if title.is_empty() {
                return None;
            }
            let body = result
                .select(&snippet_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();

            Some(SearchResult { title, href, body })
        })
        .collect()
}

/// Unwrap DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=<target>`).
pub fn resolve_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    let url = Url::parse(&absolute).ok()?;

    let is_redirect = url
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"))
        && url.path().starts_with("/l/");

    if is_redirect {
        return url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned());
    }

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

fn search_schema(what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": format!("The query to search {} for.", what)
            },
            "max_results": {
                "type": "integer",
                "description": "The maximum number of results to return. Defaults to 5."
            }
        },
        "required": ["query"]
    })
}

async fn run_search(api: &DuckDuckGo, input: &ToolInput, range: TimeRange) -> Result<ToolOutput> {
    ensure_object_parameters(input)?;
    let query = require_str(input, "query")?;
    let max_results = optional_count(input, "max_results", 5, 20);

    let results = api.search(query, max_results, range).await?;

    Ok(ToolOutput::ok(json!({
        "query": query,
        "results": results,
    })))
}

pub struct DuckDuckGoSearchTool {
    api: Arc<DuckDuckGo>,
}

#[async_trait::async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn name(&self) -> &'static str {
        SEARCH
    }

    fn description(&self) -> &'static str {
        "Use this function to search DuckDuckGo for a query. Returns titles, links and snippets."
    }

    fn parameters(&self) -> Value {
        search_schema("DuckDuckGo")
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        run_search(&self.api, input, TimeRange::Any).await
    }
}

pub struct DuckDuckGoNewsTool {
    api: Arc<DuckDuckGo>,
}

#[async_trait::async_trait]
impl Tool for DuckDuckGoNewsTool {
    fn name(&self) -> &'static str {
        NEWS
    }

    fn description(&self) -> &'static str {
        "Use this function to get the latest news from DuckDuckGo (results from the past week)."
    }

    fn parameters(&self) -> Value {
        search_schema("DuckDuckGo news")
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        run_search(&self.api, input, TimeRange::PastWeek).await
    }
}

pub fn register_tools(registry: &mut ToolRegistry, api: Arc<DuckDuckGo>) {
    registry.register(Arc::new(DuckDuckGoSearchTool { api: api.clone() }));
    registry.register(Arc::new(DuckDuckGoNewsTool { api }));
}
