//! Agent definition and the tool-calling loop
//!
//! QUERY → MODEL → (TOOL CALLS → RESULTS → MODEL)* → ANSWER
//!
//! An agent owns a model, the tools it may call and, for a team leader, the
//! member agents it can hand tasks to. Members are offered to the leader as
//! `transfer_task_to_<member>` functions.

use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AssistantError;
use crate::llm::{ChatMessage, ChatModel, ToolCall, ToolDefinition};
use crate::models::{AgentResponse, ToolCallRecord};
use crate::tools::ToolRegistry;
use crate::Result;

pub mod presets;
pub use presets::AgentTeam;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
const TRANSFER_PREFIX: &str = "transfer_task_to_";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw result of a run, before tool calls are rendered into the answer.
struct RunOutcome {
    content: String,
    records: Vec<ToolCallRecord>,
}

pub struct Agent {
    name: String,
    role: Option<String>,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    instructions: Vec<String>,
    team: Vec<Arc<Agent>>,
    show_tool_calls: bool,
    markdown: bool,
    max_tool_rounds: usize,
}

impl Agent {
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            name: name.into(),
            role: None,
            model,
            tools: ToolRegistry::new(),
            instructions: Vec::new(),
            team: Vec::new(),
            show_tool_calls: false,
            markdown: false,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_team(mut self, team: Vec<Arc<Agent>>) -> Self {
        self.team = team;
        self
    }

    pub fn show_tool_calls(mut self, show: bool) -> Self {
        self.show_tool_calls = show;
        self
    }

    pub fn markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.list()
    }

    /// Function name under which a team leader reaches this agent.
    pub fn transfer_function_name(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        format!("{}{}", TRANSFER_PREFIX, slug.trim_matches('_'))
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = String::new();

        if !self.team.is_empty() {
            prompt.push_str("You are the leader of a team of AI Agents.\n");
            prompt.push_str(
                "You can either respond directly or transfer tasks to other Agents in your team \
                 depending on the tools available to them.\n",
            );
            prompt.push_str(
                "If you transfer a task to another Agent, include a clear description of the task \
                 and the expected output.\n",
            );
            prompt.push_str(
                "Always validate the output of the other Agents before responding to the user.\n\n",
            );
        }

        prompt.push_str(&format!("Your name is {}.\n", self.name));
        if let Some(role) = &self.role {
            prompt.push_str(&format!("Your role is: {}\n", role));
        }

        let mut instructions = self.instructions.clone();
        if self.markdown {
            instructions.push("Use markdown to format your answers.".to_string());
        }
        if !instructions.is_empty() {
            prompt.push_str("\n## Instructions\n");
            for instruction in &instructions {
                prompt.push_str(&format!("- {}\n", instruction));
            }
        }

        if !self.team.is_empty() {
            prompt.push_str("\n## Agents in your team\n");
            prompt.push_str("You can transfer tasks to the following agents:\n");
            for (i, member) in self.team.iter().enumerate() {
                prompt.push_str(&format!("\nAgent {}:\nName: {}\n", i + 1, member.name));
                if let Some(role) = &member.role {
                    prompt.push_str(&format!("Role: {}\n", role));
                }
                let tools = member.tool_names();
                if !tools.is_empty() {
                    prompt.push_str(&format!("Available tools: {}\n", tools.join(", ")));
                }
            }
        }

        prompt
    }

    /// Tool definitions offered to the model: own tools, then one transfer
    /// function per team member.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.tools.definitions();

        for member in &self.team {
            let description = format!(
                "Use this function to transfer a task to {}. {}",
                member.name,
                member.role.as_deref().unwrap_or_default()
            );
            definitions.push(ToolDefinition::function(
                member.transfer_function_name(),
                description.trim_end(),
                json!({
                    "type": "object",
                    "properties": {
                        "task_description": {
                            "type": "string",
                            "description":
                                "A clear and concise description of the task the agent should achieve."
                        },
                        "expected_output": {
                            "type": "string",
                            "description": "The expected output from the agent."
                        }
                    },
                    "required": ["task_description"]
                }),
            ));
        }

        definitions
    }

    /// Answer a query, calling tools and team members as the model requests.
    pub async fn run(&self, query: &str) -> Result<AgentResponse> {
        let start = Instant::now();

        info!(agent = %self.name, "Agent: starting run");

        let outcome = self.run_inner(query).await?;
        let content = self.render(outcome.content, &outcome.records);

        info!(
            agent = %self.name,
            tool_calls = outcome.records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Agent: run complete"
        );

        Ok(AgentResponse {
            agent: self.name.clone(),
            model: self.model.id().to_string(),
            content,
            tool_calls: outcome.records,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn run_inner<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<RunOutcome>> {
        Box::pin(async move {
            let definitions = self.definitions();
            let mut messages = vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(query),
            ];
            let mut records = Vec::new();

            for round in 0..=self.max_tool_rounds {
                let reply = self.model.complete(&messages, &definitions).await?;

                if reply.tool_calls().is_empty() {
                    return Ok(RunOutcome {
                        content: reply.content.unwrap_or_default(),
                        records,
                    });
                }

                if round == self.max_tool_rounds {
                    break;
                }

                debug!(
                    agent = %self.name,
                    round = round + 1,
                    calls = reply.tool_calls().len(),
                    "Model requested tool calls"
                );

                let calls = reply.tool_calls().to_vec();
                messages.push(reply);

                for call in &calls {
                    let started = Instant::now();
                    let (arguments, result, nested) = self.invoke(call).await;
                    let success = result.is_ok();
                    let content = result.unwrap_or_else(|e| format!("Error: {}", e));

                    records.push(ToolCallRecord {
                        tool_name: call.function.name.clone(),
                        arguments,
                        success,
                        execution_time_ms: started.elapsed().as_millis() as u64,
                    });
                    records.extend(nested);

                    messages.push(ChatMessage::tool_result(
                        call.id.clone(),
                        call.function.name.clone(),
                        content,
                    ));
                }
            }

            Err(AssistantError::AgentError(format!(
                "{} exceeded {} tool rounds without answering",
                self.name, self.max_tool_rounds
            )))
        })
    }

    /// Execute one tool call. Failures become the tool message content so the
    /// model can recover; they never abort the run.
    async fn invoke(
        &self,
        call: &ToolCall,
    ) -> (Value, std::result::Result<String, String>, Vec<ToolCallRecord>) {
        let name = call.function.name.as_str();

        let arguments = match parse_arguments(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(agent = %self.name, tool = name, error = %e, "Malformed tool arguments");
                return (
                    Value::String(call.function.arguments.clone()),
                    Err(e.to_string()),
                    Vec::new(),
                );
            }
        };

        if let Some(member) = self.team.iter().find(|m| m.transfer_function_name() == name) {
            let Some(task) = arguments.get("task_description").and_then(Value::as_str) else {
                return (
                    arguments,
                    Err("Expected 'task_description'".to_string()),
                    Vec::new(),
                );
            };

            let mut prompt = task.to_string();
            if let Some(expected) = arguments.get("expected_output").and_then(Value::as_str) {
                prompt.push_str(&format!("\n\nThe expected output is: {}", expected));
            }

            info!(leader = %self.name, member = %member.name, "Transferring task to team member");

            return match member.run_inner(&prompt).await {
                Ok(outcome) => (arguments, Ok(outcome.content), outcome.records),
                Err(e) => {
                    warn!(member = %member.name, error = %e, "Team member failed");
                    (arguments, Err(e.to_string()), Vec::new())
                }
            };
        }

        let result = match self.tools.execute(name, arguments.clone()).await {
            Ok(output) => serde_json::to_string(&output.data).map_err(|e| e.to_string()),
            Err(e) => {
                warn!(agent = %self.name, tool = name, error = %e, "Tool execution failed");
                Err(e.to_string())
            }
        };

        (arguments, result, Vec::new())
    }

    fn render(&self, content: String, records: &[ToolCallRecord]) -> String {
        if !self.show_tool_calls || records.is_empty() {
            return content;
        }

        let mut out = String::from("Running:\n");
        for record in records {
            out.push_str(&format!(" - {}\n", format_call(record)));
        }
        out.push('\n');
        out.push_str(&content);
        out
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("model", &self.model.id())
            .field("tools", &self.tools)
            .field("team", &self.team.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

fn parse_arguments(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        AssistantError::InvalidToolInput(format!("arguments are not valid JSON: {}", e))
    })?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(AssistantError::InvalidToolInput(
            "arguments must be a JSON object".to_string(),
        ))
    }
}

/// `name(key=value, ...)` as shown in the "Running:" block.
fn format_call(record: &ToolCallRecord) -> String {
    let args = match &record.arguments {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    format!("{}({})", record.tool_name, args)
}
