//! Configuration for the orchestration runtime.
//!
//! Plain Rust structs constructed by the embedding application, mirroring the
//! teacher's `CloudLLMConfig` philosophy: intentionally minimal, no TOML/YAML
//! parsing dependency. There is no file-based config loader — callers build
//! these structs in code and pass them to the coordinator.

use std::collections::HashMap;

/// One LLM backend an [`AgentProfile`] can be pointed at.
///
/// `dialect` selects which concrete [`crate::runtime::client_wrapper::ClientWrapper`]
/// to construct: `"openai-compatible"`, `"openrouter"`, `"ollama"`, `"anthropic"`,
/// or `"anthropic-with-cache"` (§4.4). `api_key` is required for every dialect
/// except `"ollama"`.
#[derive(Debug, Clone)]
pub struct LLMProfile {
    pub id: String,
    pub dialect: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl LLMProfile {
    pub fn new(id: impl Into<String>, dialect: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dialect: dialect.into(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Static profile for one catalogued agent: identity plus which [`LLMProfile`]
/// and tool ids it is entitled to use. Mirrors the persistent half of
/// [`crate::runtime::model::AgentDefinition`]; an `AgentDefinition` additionally
/// carries a runtime `source_event_id` when discovered via the event bus.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub role: String,
    pub instructions: String,
    pub llm_profile_id: String,
    pub tool_ids: Vec<String>,
    pub signing_key_hex: Option<String>,
}

/// Top-level coordinator configuration (§4.9), owning the agent catalogue,
/// LLM profiles, and the constraint knobs the request analyser enforces.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub agents: Vec<AgentProfile>,
    pub llm_profiles: HashMap<String, LLMProfile>,
    /// LLM profile used for the planning call itself (§4.8).
    pub planning_llm_profile_id: String,
    /// Upper bound on team size; excess members are truncated (§4.8).
    pub max_team_size: usize,
    /// Fallback lead used when planning fails outright (§4.8).
    pub default_agent_name: String,
    /// Project address tag (`a`) attached to every published reply (§4.9).
    pub project_address: String,
    /// Max tool-loop turns per LLM call before C5 gives up (§4.5).
    pub max_tool_turns: u32,
    /// Conversation cleanup horizon in seconds (§4.2). Defaults to 30 days.
    pub conversation_max_age_secs: i64,
}

impl CoordinatorConfig {
    pub fn agent_profile(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_profile_builder_sets_base_url() {
        let profile = LLMProfile::new("p1", "ollama", "llama3", "").with_base_url("http://localhost:11434/v1");
        assert_eq!(profile.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn agent_profile_lookup_by_name() {
        let cfg = CoordinatorConfig {
            agents: vec![AgentProfile {
                name: "lead".into(),
                description: String::new(),
                role: String::new(),
                instructions: String::new(),
                llm_profile_id: "p1".into(),
                tool_ids: vec![],
                signing_key_hex: None,
            }],
            llm_profiles: HashMap::new(),
            planning_llm_profile_id: "p1".into(),
            max_team_size: 5,
            default_agent_name: "lead".into(),
            project_address: "proj".into(),
            max_tool_turns: 8,
            conversation_max_age_secs: crate::runtime::store::default_cleanup_max_age_secs(),
        };
        assert!(cfg.agent_profile("lead").is_some());
        assert!(cfg.agent_profile("nobody").is_none());
    }
}
