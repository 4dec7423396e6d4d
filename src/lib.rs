//! Multi-Agent AI Assistant
//!
//! A chat assistant that routes each query to a team of LLM agents:
//! - a web search agent backed by DuckDuckGo
//! - a finance agent backed by Yahoo Finance
//! - a team leader that delegates to both
//!
//! The hosted model (Groq) decides which tools to call; this crate wires the
//! tools, runs the tool-calling loop and renders the markdown answer.
//!
//! REQUEST PATH:
//! QUERY → ASSISTANT → AGENT ⇄ TOOLS → MARKDOWN

pub mod agent;
pub mod api;
pub mod assistant;
pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod tools;
pub mod ui;

pub use error::Result;

// Re-export common types
pub use assistant::{AskRequest, Assistant};
pub use config::Config;
pub use error::AssistantError;
pub use models::*;
