//! Runtime configuration
//!
//! Everything is read from the process environment (a `.env` file is loaded
//! by the binaries before calling [`Config::from_env`]).

use crate::error::AssistantError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
/// Visited once to obtain the session cookie the crumb is tied to.
pub const DEFAULT_YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";
pub const DEFAULT_DUCKDUCKGO_BASE_URL: &str = "https://html.duckduckgo.com";

/// Name of the single required credential.
pub const API_KEY_VAR: &str = "GROQ_API_KEY";

#[derive(Debug, Clone)]
pub struct Config {
    /// Groq API key. Absence is tolerated at startup and reported on use.
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub port: u16,
    pub yahoo_base_url: String,
    pub yahoo_cookie_url: String,
    pub duckduckgo_base_url: String,
    pub stock_cache_ttl: Duration,
    pub history_capacity: usize,
    pub history_max_sessions: usize,
    pub max_tool_rounds: usize,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            groq_base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            port: 8080,
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            yahoo_cookie_url: DEFAULT_YAHOO_COOKIE_URL.to_string(),
            duckduckgo_base_url: DEFAULT_DUCKDUCKGO_BASE_URL.to_string(),
            stock_cache_ttl: Duration::from_secs(300),
            history_capacity: 50,
            history_max_sessions: 1000,
            max_tool_rounds: 8,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let groq_api_key = get(API_KEY_VAR).filter(|k| k != "your_groq_api_key_here");

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        Ok(Self {
            groq_api_key,
            groq_base_url: get("GROQ_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.groq_base_url),
            model: get("GROQ_MODEL").unwrap_or(defaults.model),
            temperature: parse_or("LLM_TEMPERATURE", get("LLM_TEMPERATURE"), defaults.temperature)?,
            max_tokens: parse_or("LLM_MAX_TOKENS", get("LLM_MAX_TOKENS"), defaults.max_tokens)?,
            port,
            yahoo_base_url: get("YAHOO_FINANCE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.yahoo_base_url),
            yahoo_cookie_url: get("YAHOO_COOKIE_URL").unwrap_or(defaults.yahoo_cookie_url),
            duckduckgo_base_url: get("DUCKDUCKGO_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.duckduckgo_base_url),
            stock_cache_ttl: Duration::from_secs(parse_or(
                "STOCK_CACHE_TTL_SECS",
                get("STOCK_CACHE_TTL_SECS"),
                defaults.stock_cache_ttl.as_secs(),
            )?),
            history_capacity: parse_or(
                "HISTORY_CAPACITY",
                get("HISTORY_CAPACITY"),
                defaults.history_capacity,
            )?,
            history_max_sessions: parse_or(
                "HISTORY_MAX_SESSIONS",
                get("HISTORY_MAX_SESSIONS"),
                defaults.history_max_sessions,
            )?,
            max_tool_rounds: parse_or(
                "MAX_TOOL_ROUNDS",
                get("MAX_TOOL_ROUNDS"),
                defaults.max_tool_rounds,
            )?,
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                defaults.http_timeout.as_secs(),
            )?),
        })
    }

    pub fn api_key_configured(&self) -> bool {
        self.groq_api_key.is_some()
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        AssistantError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
    })
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
