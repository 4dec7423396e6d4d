//! Hosted LLM client
//!
//! Speaks the OpenAI-compatible chat-completions protocol served by Groq,
//! including function/tool calling. Uses a long-lived reqwest::Client for
//! connection pooling.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::AssistantError;
use crate::Result;

//
// ================= Wire types =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Assistant turn that requests tool invocations.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as produced by the model
    pub arguments: String,
}

/// Function schema offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

fn function_kind() -> String {
    "function".to_string()
}

//
// ================= Model trait =================
//

/// A hosted chat model able to answer or request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn id(&self) -> &str;

    /// Send the conversation and the callable tools, returning the assistant turn.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage>;
}

//
// ================= Groq client =================
//

/// Reusable Groq client (connection-pooled)
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GroqClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: config.groq_api_key.clone().unwrap_or_default(),
            base_url: config.groq_base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl ChatModel for GroqClient {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        if self.api_key.is_empty() {
            return Err(AssistantError::MissingCredential(format!(
                "{} not found. Please add it to your .env file.",
                crate::config::API_KEY_VAR
            )));
        }

        let request = build_request(
            &self.model,
            messages,
            tools,
            self.temperature,
            self.max_tokens,
        );

        info!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling Groq API"
        );

        let response = self
            .client
            .post(self.completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Groq API request failed: {}", e);
                AssistantError::LlmError(format!("Groq API request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(status = %status, "Groq API error response: {}", body);
            return Err(status_error(status, &body));
        }

        parse_completion(&body)
    }
}

fn build_request<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [ToolDefinition],
    temperature: f32,
    max_tokens: u32,
) -> CompletionRequest<'a> {
    let has_tools = !tools.is_empty();
    CompletionRequest {
        model,
        messages,
        tools: has_tools.then_some(tools),
        tool_choice: has_tools.then_some("auto"),
        temperature,
        max_tokens,
    }
}

/// Map a non-success HTTP status to the matching error variant.
fn status_error(status: StatusCode, body: &str) -> AssistantError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AssistantError::MissingCredential(message)
        }
        StatusCode::TOO_MANY_REQUESTS => AssistantError::RateLimited(format!("Groq: {}", message)),
        _ => AssistantError::LlmError(format!("Groq API returned {}: {}", status, message)),
    }
}

fn parse_completion(body: &str) -> Result<ChatMessage> {
    let response: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        error!("Failed to parse Groq response: {}", e);
        AssistantError::LlmError(format!("Groq parse error: {}", e))
    })?;

    if let Some(usage) = &response.usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Groq usage"
        );
    }

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AssistantError::LlmError("No response from Groq API".to_string()))?;

    debug!(finish_reason = ?choice.finish_reason, "Groq response received");

    Ok(choice.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_with_tools() {
        let messages = vec![
            ChatMessage::system("You are a finance agent"),
            ChatMessage::user("NVDA price?"),
        ];
        let tools = vec![ToolDefinition::function(
            "get_current_stock_price",
            "Get the current stock price",
            json!({"type": "object", "properties": {"symbol": {"type": "string"}}}),
        )];

        let request = build_request("llama3-70b-8192", &messages, &tools, 0.7, 1000);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "get_current_stock_price");
        assert_eq!(value["messages"][1]["content"], "NVDA price?");
        assert!(value["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn test_request_without_tools_omits_tool_fields() {
        let messages = vec![ChatMessage::user("hello")];
        let request = build_request("m", &messages, &[], 0.7, 1000);
        let value = serde_json::to_value(&request).unwrap();

        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "get_current_stock_price",
                            "arguments": "{\"symbol\":\"NVDA\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string();

        let message = parse_completion(&body).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.tool_calls().len(), 1);
        assert_eq!(message.tool_calls()[0].function.name, "get_current_stock_price");
        assert_eq!(message.text(), "");
    }

    #[test]
    fn test_parse_empty_choices_is_error() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(err.to_string().contains("No response"));
    }

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error": {"message": "Invalid API Key", "type": "invalid_request_error"}}"#;
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, body),
            AssistantError::MissingCredential(m) if m == "Invalid API Key"
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            AssistantError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "oops"),
            AssistantError::LlmError(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GroqClient::new(&Config::default()).unwrap();
        let result = client.complete(&[ChatMessage::user("what is RSI?")], &[]).await;

        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("GROQ_API_KEY"));
    }

    use crate::tools::testing::serve;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::post;
    use axum::{Json, Router};

    /// Stand-in for the completions endpoint: checks the bearer key, then
    /// answers with a fixed tool call, or 429 for the model named "busy".
    async fn completions(
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (HttpStatus, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer gsk_test");
        if !authorized {
            return (
                HttpStatus::UNAUTHORIZED,
                Json(json!({"error": {"message": "Invalid API Key"}})),
            );
        }
        if body["model"] == "busy" {
            return (
                HttpStatus::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "Rate limit reached"}})),
            );
        }

        let tool = body["tools"][0]["function"]["name"].clone();
        (
            HttpStatus::OK,
            Json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": tool, "arguments": "{}" }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })),
        )
    }

    async fn client(key: &str, model: &str) -> GroqClient {
        let base = serve(Router::new().route("/chat/completions", post(completions))).await;
        let config = Config {
            groq_api_key: Some(key.to_string()),
            groq_base_url: base,
            model: model.to_string(),
            ..Config::default()
        };
        GroqClient::new(&config).unwrap()
    }

    fn price_tool() -> Vec<ToolDefinition> {
        vec![ToolDefinition::function(
            "get_current_stock_price",
            "Get the current stock price",
            json!({"type": "object", "properties": {}}),
        )]
    }

    #[tokio::test]
    async fn test_completion_over_http() {
        let groq = client("gsk_test", "llama3-70b-8192").await;
        let reply = tokio_test::assert_ok!(
            groq.complete(&[ChatMessage::user("NVDA?")], &price_tool()).await
        );
        assert_eq!(reply.tool_calls()[0].function.name, "get_current_stock_price");
    }

    #[tokio::test]
    async fn test_rejected_key_over_http() {
        let groq = client("gsk_wrong", "llama3-70b-8192").await;
        let err = groq.complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, AssistantError::MissingCredential(ref m) if m == "Invalid API Key"));
    }

    #[tokio::test]
    async fn test_rate_limit_over_http() {
        let groq = client("gsk_test", "busy").await;
        let err = groq.complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, AssistantError::RateLimited(_)));
    }
}
