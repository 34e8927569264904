//! Core data model shared by every component: events, conversations, teams,
//! and the records a strategy run produces.
//!
//! These are plain serde-friendly structs, not behaviour — mirroring how the
//! teacher keeps `Message`/`Role`/`TokenUsage` as inert data in `client_wrapper`
//! and leaves behaviour to the types that consume them (`Agent`, `LLMSession`).

use crate::runtime::client_wrapper::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An addressable, signed record on the pub/sub network. Opaque to every
/// component except the event bus and signer; carried around by value
/// elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub author_key: String,
    pub content: String,
    pub kind: u32,
    /// Each inner vec is `[key, value, ...]`, mirroring the wire tag shape.
    pub tags: Vec<Vec<String>>,
    pub created_at: i64,
    pub sig: String,
}

impl Event {
    /// First tag value for `key`, e.g. `tag_value("e")` for the reply-to id.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(|k| k.as_str()) == Some(key))
            .and_then(|t| t.get(1))
            .map(|s| s.as_str())
    }

    pub fn tag_values(&self, key: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.first().map(|k| k.as_str()) == Some(key))
            .filter_map(|t| t.get(1))
            .map(|s| s.as_str())
            .collect()
    }

    /// Per §4.9 / §4.2: the conversation id is the first present of the `e`
    /// tag, the `root` tag, or the event's own id.
    pub fn extract_conversation_id(&self) -> String {
        self.tag_value("e")
            .or_else(|| self.tag_value("root"))
            .unwrap_or(&self.id)
            .to_string()
    }
}

/// Identity and configuration for one agent. `pubkey(signing_key)` is the
/// agent's identity; the signing key itself is never serialised back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub role: String,
    pub instructions: String,
    #[serde(skip_serializing)]
    pub signing_key: Option<String>,
    pub tool_ids: Vec<String>,
    pub llm_profile_id: String,
    pub source_event_id: Option<String>,
}

/// Conversation lifecycle phase. `Chores` matches the source domain's
/// catch-all housekeeping phase (lesson recording, cleanup) distinct from the
/// four strategy phases in §8's regexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Chat,
    Plan,
    Execute,
    Review,
    Chores,
}

impl Phase {
    /// Map a strategy's free-form invocation label ("analyse", "review", a
    /// phased-delivery phase name, …) onto the conversation lifecycle phase.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "analyse" | "plan" => Phase::Plan,
            "review" | "integrate" => Phase::Review,
            _ => Phase::Execute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
    pub event_id: Option<String>,
    pub agent_name: Option<String>,
    pub tool_call_id: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn system(content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp,
            event_id: None,
            agent_name: None,
            tool_call_id: None,
            usage: None,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: i64, event_id: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
            event_id,
            agent_name: None,
            tool_call_id: None,
            usage: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        timestamp: i64,
        agent_name: impl Into<String>,
        usage: Option<TokenUsage>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            event_id: None,
            agent_name: Some(agent_name.into()),
            tool_call_id: None,
            usage,
        }
    }

    pub fn tool(content: impl Into<String>, timestamp: i64, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            timestamp,
            event_id: None,
            agent_name: None,
            tool_call_id: Some(tool_call_id.into()),
            usage: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub participants: HashSet<String>,
    pub current_agent: Option<String>,
    pub phase_started_at: Option<i64>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            phase: Phase::Chat,
            messages: Vec::new(),
            participants: HashSet::new(),
            current_agent: None,
            phase_started_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Invariant: the system message is always first; enforced by only ever
    /// calling this once, before any other message is appended.
    pub fn seed_system_message(&mut self, content: impl Into<String>, timestamp: i64) {
        debug_assert!(self.messages.is_empty(), "system message must be first");
        self.messages.push(Message::system(content, timestamp));
    }

    pub fn append(&mut self, message: Message) {
        if let Some(name) = &message.agent_name {
            self.participants.insert(name.clone());
        }
        self.messages.push(message);
    }

    /// Non-duplication rule (§4.9): true if `event_id` is already the last
    /// user message's event id.
    pub fn last_user_message_has_event(&self, event_id: &str) -> bool {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.event_id.as_deref())
            == Some(event_id)
    }

    /// Transition phase, atomically recording the transition timestamp and a
    /// transition marker message so phase history can be reconstructed.
    pub fn transition_phase(&mut self, phase: Phase, timestamp: i64) {
        if phase == self.phase {
            return;
        }
        let marker = format!("[phase transition] {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.phase_started_at = Some(timestamp);
        self.append(Message::system(marker, timestamp));
    }

    pub fn first_system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Single,
    Hierarchical,
    Parallel,
    Phased,
}

impl Strategy {
    /// Unknown strategy names from a planning response map to `hierarchical` (§4.8).
    pub fn from_suggestion(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "single" => Strategy::Single,
            "hierarchical" => Strategy::Hierarchical,
            "parallel" => Strategy::Parallel,
            "phased" => Strategy::Phased,
            _ => Strategy::Hierarchical,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Hierarchical => "hierarchical",
            Strategy::Parallel => "parallel",
            Strategy::Phased => "phased",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub request_type: String,
    pub required_capabilities: Vec<String>,
    pub estimated_complexity: u8,
    pub suggested_strategy: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub description: String,
    pub success_criteria: Vec<String>,
    pub requires_green_light: bool,
    pub reviewers: Vec<String>,
    pub estimated_complexity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFormation {
    pub timestamp: i64,
    pub reasoning: String,
    pub request_analysis: RequestAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub conversation_id: String,
    pub lead: String,
    pub members: Vec<String>,
    pub strategy: Strategy,
    pub task_definition: TaskDefinition,
    pub formation: TeamFormation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub output: String,
    pub render_in_chat: Option<serde_json::Value>,
}

/// One agent's contribution within a strategy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_name: String,
    pub response: String,
    pub timestamp: i64,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Opaque tool-set payload (§3's `ToolResponse.renderInChat`) surfaced by
    /// the underlying generation call. A response carrying one is published
    /// even if its text would otherwise be withheld (§4.9 step 6).
    pub render_in_chat: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyExecutionResult {
    pub success: bool,
    pub responses: Vec<AgentResponse>,
    pub errors: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StrategyExecutionResult {
    pub fn empty_failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            responses: Vec::new(),
            errors: vec![error.into()],
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_prefers_e_tag_then_root_then_id() {
        let mut e = Event {
            id: "evt1".into(),
            author_key: "pk".into(),
            content: "hi".into(),
            kind: 1,
            tags: vec![],
            created_at: 0,
            sig: "sig".into(),
        };
        assert_eq!(e.extract_conversation_id(), "evt1");

        e.tags.push(vec!["root".into(), "root1".into()]);
        assert_eq!(e.extract_conversation_id(), "root1");

        e.tags.push(vec!["e".into(), "reply1".into()]);
        assert_eq!(e.extract_conversation_id(), "reply1");
    }

    #[test]
    fn strategy_unknown_suggestion_maps_to_hierarchical() {
        assert_eq!(Strategy::from_suggestion("single"), Strategy::Single);
        assert_eq!(Strategy::from_suggestion("bogus"), Strategy::Hierarchical);
    }

    #[test]
    fn conversation_append_tracks_participants() {
        let mut c = Conversation::new("c1", "t");
        c.seed_system_message("sys", 0);
        c.append(Message::assistant("hi", 1, "alice", None));
        assert!(c.participants.contains("alice"));
        assert_eq!(c.messages.len(), 2);
    }
}
