//! Agent Runtime (§4.6).
//!
//! Grounded in the teacher's `Agent` struct: identity (`id`, `name`), a
//! wrapped LLM session, and a builder-style construction API. Unlike the
//! teacher's `Agent`, which owns a raw `LLMSession` with rolling history, this
//! `Agent` is a thin index onto the shared [`ConversationStore`] (C2) keyed by
//! conversation id — conversation state lives in the store, not on the agent,
//! so the same agent definition can serve many conversations concurrently.
//! `Sign` is grounded on `ed25519-dalek`-based content-addressed signing
//! (mirroring the teacher's sibling crate family) since the teacher's own
//! `Agent` has no signing concept.

use crate::runtime::client_wrapper::{ClientWrapper, Message as WireMessage, Role as WireRole};
use crate::runtime::error::OrchestrationError;
use crate::runtime::model::{AgentDefinition, AgentResponse, Conversation, Message, Phase, Role};
use crate::runtime::signer::Signer;
use crate::runtime::store::ConversationStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Material used to assemble a brand-new conversation's system message
/// (§4.6's `GetOrCreateConversationWithContext`).
#[derive(Debug, Clone, Default)]
pub struct ContextSeed {
    pub project_metadata: HashMap<String, String>,
    pub available_agents: Vec<String>,
    pub environment_context: String,
    /// Set when the inbound request originated from another agent rather
    /// than a human end-user; triggers the terse agent-to-agent directive.
    pub is_from_agent: bool,
}

/// An LLM-backed participant identified by an [`AgentDefinition`], fronted by
/// a tool-enabled LLM (C5) and a shared conversation store (C2).
pub struct Agent {
    definition: AgentDefinition,
    llm: Arc<dyn ClientWrapper>,
    store: Arc<dyn ConversationStore>,
    signer: Option<Signer>,
}

impl Agent {
    pub fn new(
        definition: AgentDefinition,
        llm: Arc<dyn ClientWrapper>,
        store: Arc<dyn ConversationStore>,
        signer: Option<Signer>,
    ) -> Self {
        Self { definition, llm, store, signer }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Build the system message assembled for a brand-new conversation: base
    /// runtime directives, the agent's role/instructions, project metadata,
    /// the available-agents enumeration, and environment context. When the
    /// request came from another agent, an additional terse-response
    /// directive is appended.
    fn assemble_system_message(&self, seed: &ContextSeed) -> String {
        let mut sections = vec![
            "You are participating in a multi-agent orchestration runtime. \
             Respond only with content relevant to your role; defer out-of-scope \
             requests to the lead."
                .to_string(),
            format!("Role: {}\n{}", self.definition.role, self.definition.instructions),
        ];

        if !seed.project_metadata.is_empty() {
            let mut lines: Vec<String> = seed
                .project_metadata
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect();
            lines.sort();
            sections.push(format!("Project metadata:\n{}", lines.join("\n")));
        }

        if !seed.available_agents.is_empty() {
            sections.push(format!("Available agents: {}", seed.available_agents.join(", ")));
        }

        if !seed.environment_context.is_empty() {
            sections.push(format!("Environment:\n{}", seed.environment_context));
        }

        if seed.is_from_agent {
            sections.push(
                "This request originated from another agent. Respond tersely, \
                 omitting pleasantries and restating only what is necessary."
                    .to_string(),
            );
        }

        sections.join("\n\n")
    }

    /// Load the named conversation, creating it (with a freshly assembled
    /// system message) on first contact.
    pub async fn get_or_create_conversation_with_context(
        &self,
        conversation_id: &str,
        seed: &ContextSeed,
        timestamp: i64,
    ) -> Result<Conversation, OrchestrationError> {
        if let Some(existing) = self.store.load(conversation_id).await? {
            return Ok(existing);
        }

        let mut conversation = Conversation::new(conversation_id.to_string(), conversation_id.to_string());
        conversation.seed_system_message(self.assemble_system_message(seed), timestamp);
        self.store.save(&conversation).await?;
        Ok(conversation)
    }

    pub async fn add_user_message(
        &self,
        conversation_id: &str,
        content: impl Into<String>,
        event_id: Option<String>,
        timestamp: i64,
    ) -> Result<(), OrchestrationError> {
        let mut conversation = self.require_conversation(conversation_id).await?;
        conversation.append(Message::user(content.into(), timestamp, event_id));
        self.store.save(&conversation).await
    }

    pub async fn add_assistant_message(
        &self,
        conversation_id: &str,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Result<(), OrchestrationError> {
        let mut conversation = self.require_conversation(conversation_id).await?;
        conversation.append(Message::assistant(content.into(), timestamp, self.definition.name.clone(), None));
        self.store.save(&conversation).await
    }

    async fn require_conversation(&self, conversation_id: &str) -> Result<Conversation, OrchestrationError> {
        self.store.load(conversation_id).await?.ok_or_else(|| {
            OrchestrationError::Configuration(format!("conversation '{}' does not exist", conversation_id))
        })
    }

    /// Move the conversation to `phase`, inserting a transition marker
    /// message when the phase actually changes (§3's `phaseStartedAt`
    /// invariant).
    pub async fn transition_phase(&self, conversation_id: &str, phase: Phase, timestamp: i64) -> Result<(), OrchestrationError> {
        let mut conversation = self.require_conversation(conversation_id).await?;
        conversation.transition_phase(phase, timestamp);
        self.store.save(&conversation).await
    }

    /// §4.6's `GenerateResponse`: load the conversation, append the user
    /// message, call the tool-enabled LLM over the full formatted history,
    /// append and persist the assistant reply, and return it.
    ///
    /// The first message of every conversation must be `role=system`; a
    /// conversation missing one is a programming error (the conversation was
    /// never seeded via [`get_or_create_conversation_with_context`]).
    pub async fn generate_response(
        &self,
        conversation_id: &str,
        user_message: &str,
        event_id: Option<String>,
        timestamp: i64,
    ) -> Result<AgentResponse, OrchestrationError> {
        let mut conversation = self.require_conversation(conversation_id).await?;

        assert!(
            conversation.first_system_message().is_some(),
            "programming error: conversation '{}' has no system message",
            conversation_id
        );

        let already_recorded = event_id
            .as_ref()
            .is_some_and(|id| conversation.last_user_message_has_event(id));
        if !already_recorded {
            conversation.append(Message::user(user_message.to_string(), timestamp, event_id.clone()));
        }

        let wire_messages: Vec<WireMessage> = conversation
            .messages
            .iter()
            .map(model_message_to_wire)
            .collect();

        let response = self
            .llm
            .send_message(&wire_messages, None)
            .await
            .map_err(|e| OrchestrationError::Provider(e.to_string()))?;

        let usage = self.llm.get_last_usage().await;
        conversation.append(Message::assistant(
            response.content.to_string(),
            timestamp,
            self.definition.name.clone(),
            usage,
        ));
        self.store.save(&conversation).await?;

        let metadata = extract_metadata(&response.content);
        let render_in_chat = metadata.get("renderInChat").cloned();

        Ok(AgentResponse {
            agent_name: self.definition.name.clone(),
            response: response.content.to_string(),
            timestamp,
            metadata,
            render_in_chat,
        })
    }

    /// Sign arbitrary content as this agent, producing a publishable event.
    /// Returns a configuration error if the agent has no signer attached.
    pub fn sign(
        &self,
        content: String,
        kind: u32,
        tags: Vec<Vec<String>>,
        timestamp: i64,
    ) -> Result<crate::runtime::model::Event, OrchestrationError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| OrchestrationError::Configuration(format!("agent '{}' has no signer", self.definition.name)))?;
        Ok(signer.sign_event(content, kind, tags, timestamp))
    }
}

/// When an agent is prompted for a structured plan (hierarchical's delegation
/// plan, phased's phase list), its reply is expected to be JSON, possibly
/// malformed. Repair-parse it and surface its top-level object keys as
/// response metadata so strategies can read `subtasks`/`phases` out of it
/// (§4.7.2, §4.7.4); a plain prose reply simply yields empty metadata.
fn extract_metadata(content: &str) -> HashMap<String, serde_json::Value> {
    match crate::runtime::json_repair::repair_parse(content) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

fn model_message_to_wire(message: &Message) -> WireMessage {
    let role = match message.role {
        Role::System => WireRole::System,
        Role::User => WireRole::User,
        Role::Assistant => WireRole::Assistant,
        Role::Tool => WireRole::Tool { call_id: message.tool_call_id.clone().unwrap_or_default() },
    };
    WireMessage {
        role,
        content: Arc::from(message.content.as_str()),
        tool_calls: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::client_wrapper::{NativeToolCall, TokenUsage, ToolDefinition};
    use crate::runtime::store::InMemoryConversationStore;
    use async_trait::async_trait;
    use std::error::Error;

    struct StubLlm {
        reply: String,
    }

    #[async_trait]
    impl ClientWrapper for StubLlm {
        async fn send_message(
            &self,
            _messages: &[WireMessage],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<WireMessage, Box<dyn Error>> {
            Ok(WireMessage {
                role: WireRole::Assistant,
                content: Arc::from(self.reply.as_str()),
                tool_calls: vec![],
            })
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn definition() -> AgentDefinition {
        AgentDefinition {
            name: "alice".to_string(),
            description: "helper".to_string(),
            role: "assistant".to_string(),
            instructions: "be helpful".to_string(),
            signing_key: None,
            tool_ids: vec![],
            llm_profile_id: "default".to_string(),
            source_event_id: None,
        }
    }

    fn agent_with_reply(reply: &str) -> Agent {
        let store = Arc::new(InMemoryConversationStore::new());
        let llm = Arc::new(StubLlm { reply: reply.to_string() });
        Agent::new(definition(), llm, store, None)
    }

    #[tokio::test]
    async fn new_conversation_is_seeded_with_a_system_message() {
        let agent = agent_with_reply("hi");
        let conv = agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn generate_response_appends_user_and_assistant_messages() {
        let agent = agent_with_reply("the answer");
        agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        let response = agent.generate_response("c1", "what is it?", None, 1).await.unwrap();
        assert_eq!(response.response, "the answer");

        let saved = agent.require_conversation("c1").await.unwrap();
        assert_eq!(saved.messages.len(), 3); // system + user + assistant
    }

    #[tokio::test]
    async fn duplicate_event_id_does_not_reinsert_user_message() {
        let agent = agent_with_reply("ok");
        agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        agent
            .add_user_message("c1", "hello", Some("evt1".to_string()), 0)
            .await
            .unwrap();
        let response = agent.generate_response("c1", "hello", Some("evt1".to_string()), 1).await.unwrap();
        assert_eq!(response.response, "ok");
        let saved = agent.require_conversation("c1").await.unwrap();
        // system + user(hello,evt1) + assistant — no second user message inserted
        assert_eq!(saved.messages.len(), 3);
    }

    #[tokio::test]
    async fn structured_json_reply_is_surfaced_as_metadata() {
        let agent = agent_with_reply(r#"{"phases": [{"name": "Build", "agents": ["m1"]}]}"#);
        agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        let response = agent.generate_response("c1", "plan it", None, 1).await.unwrap();
        assert!(response.metadata.contains_key("phases"));
    }

    #[tokio::test]
    async fn prose_reply_yields_empty_metadata() {
        let agent = agent_with_reply("just a plain answer");
        agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        let response = agent.generate_response("c1", "what is it?", None, 1).await.unwrap();
        assert!(response.metadata.is_empty());
    }

    #[tokio::test]
    async fn missing_signer_is_a_configuration_error() {
        let agent = agent_with_reply("hi");
        let err = agent.sign("content".to_string(), 1, vec![], 0).unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn render_in_chat_is_surfaced_from_repaired_json() {
        let agent = agent_with_reply(r#"Nothing to add. {"renderInChat": {"table": [1, 2, 3]}}"#);
        agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        let response = agent.generate_response("c1", "show me", None, 1).await.unwrap();
        assert!(response.render_in_chat.is_some());
    }

    #[tokio::test]
    async fn transition_phase_inserts_a_marker_only_on_actual_change() {
        let agent = agent_with_reply("hi");
        agent
            .get_or_create_conversation_with_context("c1", &ContextSeed::default(), 0)
            .await
            .unwrap();
        agent.transition_phase("c1", crate::runtime::model::Phase::Plan, 1).await.unwrap();
        agent.transition_phase("c1", crate::runtime::model::Phase::Plan, 2).await.unwrap();
        let conv = agent.require_conversation("c1").await.unwrap();
        assert_eq!(conv.phase, crate::runtime::model::Phase::Plan);
        // system seed + one transition marker; the no-op second call adds nothing.
        assert_eq!(conv.messages.len(), 2);
    }

    #[test]
    fn native_tool_call_is_ignored_by_the_wire_mapper() {
        // generate_response only ever reads response.content; tool_calls on
        // an assistant message never reach model_message_to_wire since
        // Message (model) has no tool_calls field — this just documents the
        // boundary between the wire Message and the stored Message.
        let _ = NativeToolCall { id: "x".into(), name: "y".into(), arguments: serde_json::json!({}) };
        let _ = TokenUsage { input_tokens: 0, output_tokens: 0, total_tokens: 0 };
    }
}
