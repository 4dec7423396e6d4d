//! Tool trait and registry
//!
//! Tools wrap the remote data APIs an agent may call: Yahoo Finance for
//! market data and DuckDuckGo for web search.

use crate::config::Config;
use crate::error::AssistantError;
use crate::llm::ToolDefinition;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod duckduckgo;
pub mod yfinance;

pub use duckduckgo::DuckDuckGo;
pub use yfinance::YahooFinance;

/// Trait for a single remotely-backed tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the argument object
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}

/// Tool registry for looking up and executing tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Definitions offered to the model, in name order so prompts are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// A registry restricted to the given names. Unknown names are rejected.
    pub fn subset(&self, names: &[&str]) -> Result<ToolRegistry> {
        let mut subset = ToolRegistry::new();
        for name in names {
            let tool = self
                .get(name)
                .ok_or_else(|| AssistantError::ToolNotFound(name.to_string()))?;
            subset.register(tool);
        }
        Ok(subset)
    }

    pub async fn execute(&self, name: &str, parameters: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AssistantError::ToolNotFound(name.to_string()))?;

        let input = ToolInput {
            tool_name: name.to_string(),
            parameters,
        };
        tool.execute(&input).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}

pub(crate) fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(AssistantError::InvalidToolInput(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}

pub(crate) fn require_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    input
        .parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AssistantError::InvalidToolInput(format!(
                "Expected '{}' for {}",
                key, input.tool_name
            ))
        })
}

/// Read an optional count argument, accepting numbers or numeric strings.
pub(crate) fn optional_count(input: &ToolInput, key: &str, default: usize, max: usize) -> usize {
    let value = input.parameters.get(key);
    value
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .or_else(|| value.and_then(Value::as_str).and_then(|s| s.trim().parse().ok()))
        .unwrap_or(default)
        .clamp(1, max)
}

/// Create a registry with every Yahoo Finance and DuckDuckGo tool.
pub fn create_default_registry(config: &Config) -> Result<ToolRegistry> {
    let finance = Arc::new(YahooFinance::new(config)?);
    let search = Arc::new(DuckDuckGo::new(config)?);

    let mut registry = ToolRegistry::new();
    yfinance::register_tools(&mut registry, finance);
    duckduckgo::register_tools(&mut registry, search);

    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process tools for agent and registry tests.

    use super::*;
    use serde_json::json;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Echoes its arguments back.
    pub struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the arguments"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
            Ok(ToolOutput::ok(json!({ "echo": input.parameters })))
        }
    }

    /// Always fails like an unreachable upstream.
    pub struct FailingTool;

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
            Err(AssistantError::ToolError("upstream unreachable".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{EchoTool, FailingTool};
    use super::*;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[test]
    fn test_list_and_definitions_are_sorted() {
        let registry = registry();
        assert_eq!(registry.list(), vec!["echo", "failing"]);

        let names: Vec<String> = registry
            .definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["echo", "failing"]);
    }

    #[test]
    fn test_subset_rejects_unknown_tool() {
        let registry = registry();
        let subset = registry.subset(&["echo"]).unwrap();
        assert_eq!(subset.list(), vec!["echo"]);

        let err = registry.subset(&["echo", "missing"]).unwrap_err();
        assert!(matches!(err, AssistantError::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_execute_by_name() {
        let registry = registry();
        let output = tokio_test::assert_ok!(registry.execute("echo", json!({"text": "hi"})).await);
        assert_eq!(output.data["echo"]["text"], "hi");

        tokio_test::assert_err!(registry.execute("failing", json!({})).await);
        tokio_test::assert_err!(registry.execute("nope", json!({})).await);
    }

    #[test]
    fn test_optional_count_clamps() {
        let input = ToolInput {
            tool_name: "t".into(),
            parameters: json!({"n": "50", "m": 0}),
        };
        assert_eq!(optional_count(&input, "n", 3, 10), 10);
        assert_eq!(optional_count(&input, "m", 3, 10), 1);
        assert_eq!(optional_count(&input, "missing", 3, 10), 3);
    }

    #[test]
    fn test_default_registry_contains_all_tools() {
        let registry = create_default_registry(&Config::default()).unwrap();
        for name in yfinance::TOOL_NAMES.iter().chain(duckduckgo::TOOL_NAMES.iter()) {
            assert!(registry.contains(name), "missing {}", name);
        }
    }
}
