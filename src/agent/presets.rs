//! The three preconfigured agents: web search, finance and the team leader.

use std::sync::Arc;

use super::Agent;
use crate::llm::ChatModel;
use crate::models::AgentKind;
use crate::tools::{duckduckgo, yfinance, ToolRegistry};
use crate::Result;

pub const WEB_SEARCH_AGENT: &str = "Web Search Agent";
pub const FINANCE_AGENT: &str = "Finance AI Agent";
pub const MULTI_AGENT: &str = "Multi-AI Agent";

const INCLUDE_SOURCES: &str = "Always include sources";
const USE_TABLES: &str = "Use tables to display the data";

pub fn web_search_agent(
    model: Arc<dyn ChatModel>,
    registry: &ToolRegistry,
    max_tool_rounds: usize,
) -> Result<Agent> {
    Ok(Agent::new(WEB_SEARCH_AGENT, model)
        .with_role("Search the web for the information")
        .with_tools(registry.subset(&duckduckgo::TOOL_NAMES)?)
        .with_instructions([INCLUDE_SOURCES])
        .show_tool_calls(true)
        .markdown(true)
        .max_tool_rounds(max_tool_rounds))
}

pub fn finance_agent(
    model: Arc<dyn ChatModel>,
    registry: &ToolRegistry,
    max_tool_rounds: usize,
) -> Result<Agent> {
    Ok(Agent::new(FINANCE_AGENT, model)
        .with_role(
            "Get financial data: stock prices, company fundamentals, analyst recommendations and company news",
        )
        .with_tools(registry.subset(&yfinance::TOOL_NAMES)?)
        .with_instructions([USE_TABLES])
        .show_tool_calls(true)
        .markdown(true)
        .max_tool_rounds(max_tool_rounds))
}

pub fn multi_agent(
    model: Arc<dyn ChatModel>,
    web: Arc<Agent>,
    finance: Arc<Agent>,
    max_tool_rounds: usize,
) -> Agent {
    Agent::new(MULTI_AGENT, model)
        .with_team(vec![web, finance])
        .with_instructions([INCLUDE_SOURCES, USE_TABLES])
        .show_tool_calls(true)
        .markdown(true)
        .max_tool_rounds(max_tool_rounds)
}

/// All three agents, sharing one model and one tool registry.
#[derive(Debug, Clone)]
pub struct AgentTeam {
    pub web: Arc<Agent>,
    pub finance: Arc<Agent>,
    pub multi: Arc<Agent>,
}

impl AgentTeam {
    pub fn build(
        model: Arc<dyn ChatModel>,
        registry: &ToolRegistry,
        max_tool_rounds: usize,
    ) -> Result<Self> {
        let web = Arc::new(web_search_agent(model.clone(), registry, max_tool_rounds)?);
        let finance = Arc::new(finance_agent(model.clone(), registry, max_tool_rounds)?);
        let multi = Arc::new(multi_agent(
            model,
            web.clone(),
            finance.clone(),
            max_tool_rounds,
        ));

        Ok(Self {
            web,
            finance,
            multi,
        })
    }

    pub fn get(&self, kind: AgentKind) -> &Arc<Agent> {
        match kind {
            AgentKind::Multi => &self.multi,
            AgentKind::WebSearch => &self.web,
            AgentKind::Finance => &self.finance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::EchoModel;
    use crate::config::Config;
    use crate::error::AssistantError;
    use crate::tools::create_default_registry;

    fn team() -> AgentTeam {
        let registry = create_default_registry(&Config::default()).unwrap();
        AgentTeam::build(Arc::new(EchoModel), &registry, 4).unwrap()
    }

    #[test]
    fn test_presets_carry_expected_tools() {
        let team = team();

        assert_eq!(
            team.web.tool_names(),
            vec!["duckduckgo_news", "duckduckgo_search"]
        );
        assert_eq!(
            team.finance.tool_names(),
            vec![
                "get_analyst_recommendations",
                "get_company_news",
                "get_current_stock_price",
                "get_stock_fundamentals",
            ]
        );
        assert!(team.multi.tool_names().is_empty());

        let transfers: Vec<String> = team
            .multi
            .definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(
            transfers,
            vec![
                team.web.transfer_function_name(),
                team.finance.transfer_function_name(),
            ]
        );
    }

    #[test]
    fn test_preset_instructions() {
        let team = team();
        assert!(team.web.system_prompt().contains("- Always include sources\n"));
        assert!(team.finance.system_prompt().contains("- Use tables to display the data\n"));

        let leader = team.multi.system_prompt();
        assert!(leader.contains("Always include sources"));
        assert!(leader.contains("Use tables to display the data"));
        assert!(leader.contains("Use markdown to format your answers."));
    }

    #[test]
    fn test_get_by_kind() {
        let team = team();
        assert_eq!(team.get(AgentKind::Multi).name(), MULTI_AGENT);
        assert_eq!(team.get(AgentKind::WebSearch).name(), WEB_SEARCH_AGENT);
        assert_eq!(team.get(AgentKind::Finance).name(), FINANCE_AGENT);
    }

    #[test]
    fn test_missing_tools_are_reported() {
        let err = finance_agent(Arc::new(EchoModel), &ToolRegistry::new(), 4).unwrap_err();
        assert!(matches!(err, AssistantError::ToolNotFound(_)));
    }
}
