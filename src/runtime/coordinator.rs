//! Orchestration Coordinator (§4.9): the runtime's top-level dispatch loop.
//!
//! Grounded in the teacher's top-level orchestration entry point, which wires
//! `Agent`, `Orchestration`, and event-bus subscription together; generalised
//! here to the seven-step dispatch algorithm described in §4.9: extract
//! conversation id, dedupe, resolve responders (explicit `p` tags or C7),
//! resolve the LLM profile, run the chosen strategy (C8), publish every
//! non-empty response with retry (C1), and mark the inbound event processed.

use crate::runtime::agent::{Agent, ContextSeed};
use crate::runtime::analyser::{self, AgentCatalogueEntry, TeamFormationInput};
use crate::runtime::client_wrapper::ClientWrapper;
use crate::runtime::clients::anthropic::AnthropicClient;
use crate::runtime::clients::openai::{Dialect, OpenAICompatibleClient};
use crate::runtime::config::CoordinatorConfig;
use crate::runtime::error::OrchestrationError;
use crate::runtime::event::{CoordinatorEvent, EventObserver};
use crate::runtime::event_bus::{publish_with_retry, EventBus, RetryPolicy};
use crate::runtime::model::{AgentResponse, Event, Phase, StrategyExecutionResult, Team};
use crate::runtime::signer::Signer;
use crate::runtime::store::ConversationStore;
use crate::runtime::strategy::{self, AgentInvoker};
use crate::runtime::tool_enabled::ToolEnabledLlm;
use crate::runtime::tool_protocol::ToolRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Responses carrying only this disclaimer are withheld rather than
/// published (§4.9 step 6).
const NOTHING_TO_ADD_DISCLAIMER: &str = "nothing to add";

/// Typing-indicator kinds (§6): ephemeral, bracket every agent invocation.
const TYPING_START_KIND: u32 = 24111;
const TYPING_STOP_KIND: u32 = 24112;

/// Builds the concrete LLM client for an [`crate::runtime::config::LLMProfile`].
/// A seam between the coordinator's dispatch logic and the provider layer (C4)
/// so integration tests can substitute stub providers instead of ones that
/// make real HTTP calls, without the coordinator itself branching on whether
/// it's under test.
pub trait LlmClientFactory: Send + Sync {
    fn build(&self, profile: &crate::runtime::config::LLMProfile) -> Result<Arc<dyn ClientWrapper>, OrchestrationError>;
}

/// Default factory: dispatches on `LLMProfile::dialect` per spec.md §4.4's
/// five named variants, mirroring the teacher's per-dialect client modules.
pub struct DefaultLlmClientFactory;

impl LlmClientFactory for DefaultLlmClientFactory {
    fn build(&self, profile: &crate::runtime::config::LLMProfile) -> Result<Arc<dyn ClientWrapper>, OrchestrationError> {
        let openai_dialect = match profile.dialect.as_str() {
            "openai-compatible" => Some(Dialect::OpenAiCompatible),
            "openrouter" => Some(Dialect::OpenRouter),
            "ollama" => Some(Dialect::Ollama),
            _ => None,
        };

        if let Some(dialect) = openai_dialect {
            let client = match &profile.base_url {
                Some(base_url) => {
                    OpenAICompatibleClient::with_base_url(dialect, profile.api_key.clone(), profile.model.clone(), base_url.clone())
                }
                None => OpenAICompatibleClient::new(dialect, profile.api_key.clone(), profile.model.clone()),
            };
            return Ok(Arc::new(client));
        }

        let client: Arc<dyn ClientWrapper> = match profile.dialect.as_str() {
            "anthropic" | "anthropic-with-cache" => {
                let with_cache = profile.dialect == "anthropic-with-cache";
                let mut client = AnthropicClient::new(profile.api_key.clone(), profile.model.clone(), with_cache);
                if let Some(base_url) = &profile.base_url {
                    client = client.with_base_url(base_url.clone());
                }
                Arc::new(client)
            }
            other => {
                return Err(OrchestrationError::Configuration(format!(
                    "unsupported llm dialect '{}'",
                    other
                )))
            }
        };
        Ok(client)
    }
}

/// Everything the coordinator needs to turn one inbound [`Event`] into zero
/// or more published replies.
pub struct Coordinator {
    config: CoordinatorConfig,
    bus: Arc<dyn EventBus>,
    store: Arc<dyn ConversationStore>,
    tool_registry: Arc<ToolRegistry>,
    client_factory: Arc<dyn LlmClientFactory>,
    observer: Option<Arc<dyn EventObserver>>,
    retry_policy: RetryPolicy,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        bus: Arc<dyn EventBus>,
        store: Arc<dyn ConversationStore>,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            config,
            bus,
            store,
            tool_registry,
            client_factory: Arc::new(DefaultLlmClientFactory),
            observer: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Substitute the LLM client factory, e.g. with a stub provider for
    /// tests. Defaults to [`DefaultLlmClientFactory`].
    pub fn with_client_factory(mut self, factory: Arc<dyn LlmClientFactory>) -> Self {
        self.client_factory = factory;
        self
    }

    async fn emit(&self, event: CoordinatorEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event).await;
        }
    }

    fn build_client(&self, llm_profile_id: &str) -> Result<Arc<dyn ClientWrapper>, OrchestrationError> {
        let profile = self.config.llm_profiles.get(llm_profile_id).ok_or_else(|| {
            OrchestrationError::Configuration(format!("unknown llm profile '{}'", llm_profile_id))
        })?;
        self.client_factory.build(profile)
    }

    /// Build a fresh [`Agent`] for `agent_name`, wiring its profile's LLM
    /// through the tool loop (C5) and its signing key (C6).
    fn build_agent(&self, agent_name: &str) -> Result<Agent, OrchestrationError> {
        let profile = self.config.agent_profile(agent_name).ok_or_else(|| {
            OrchestrationError::Configuration(format!("unknown agent '{}'", agent_name))
        })?;
        let raw_client = self.build_client(&profile.llm_profile_id)?;
        let llm: Arc<dyn ClientWrapper> = Arc::new(
            ToolEnabledLlm::new(raw_client, self.tool_registry.clone())
                .with_max_turns(self.config.max_tool_turns),
        );
        let signer = profile
            .signing_key_hex
            .as_deref()
            .map(Signer::from_hex)
            .transpose()?;

        let definition = crate::runtime::model::AgentDefinition {
            name: profile.name.clone(),
            description: profile.description.clone(),
            role: profile.role.clone(),
            instructions: profile.instructions.clone(),
            signing_key: profile.signing_key_hex.clone(),
            tool_ids: profile.tool_ids.clone(),
            llm_profile_id: profile.llm_profile_id.clone(),
            source_event_id: None,
        };

        Ok(Agent::new(definition, llm, self.store.clone(), signer))
    }

    fn catalogue(&self) -> Vec<AgentCatalogueEntry> {
        self.config
            .agents
            .iter()
            .map(|a| AgentCatalogueEntry {
                name: a.name.clone(),
                description: a.description.clone(),
                role: a.role.clone(),
            })
            .collect()
    }

    /// Resolve the team that should answer `event`. Explicit `p` tags name
    /// the responders directly (single-strategy, lead = first tag value);
    /// otherwise the request analyser (C7) forms a team from scratch.
    async fn resolve_team(
        &self,
        event: &Event,
        conversation_id: &str,
        request_text: &str,
        timestamp: i64,
    ) -> Result<Team, OrchestrationError> {
        let p_tags = event.tag_values("p");
        if !p_tags.is_empty() {
            let lead = p_tags[0].to_string();
            let members: Vec<String> = p_tags.iter().map(|s| s.to_string()).collect();
            return Ok(Team {
                id: format!("{}-explicit", conversation_id),
                conversation_id: conversation_id.to_string(),
                lead: lead.clone(),
                members,
                strategy: crate::runtime::model::Strategy::Single,
                task_definition: crate::runtime::model::TaskDefinition {
                    id: format!("{}-task", conversation_id),
                    description: request_text.to_string(),
                    success_criteria: vec![],
                    requires_green_light: false,
                    reviewers: vec![],
                    estimated_complexity: 1,
                },
                formation: crate::runtime::model::TeamFormation {
                    timestamp,
                    reasoning: "explicit p-tag addressing".to_string(),
                    request_analysis: crate::runtime::model::RequestAnalysis {
                        request_type: "direct".to_string(),
                        required_capabilities: vec![],
                        estimated_complexity: 1,
                        suggested_strategy: "single".to_string(),
                        reasoning: String::new(),
                    },
                },
            });
        }

        let planning_client = self.build_client(&self.config.planning_llm_profile_id)?;
        let catalogue = self.catalogue();
        let input = TeamFormationInput {
            conversation_id,
            request_text,
            catalogue: &catalogue,
            max_team_size: self.config.max_team_size,
            default_agent: &self.config.default_agent_name,
        };
        Ok(analyser::form_team(&planning_client, input, timestamp).await)
    }

    /// Entry point (§4.9): run the full dispatch algorithm for one inbound
    /// event. Returns the published response events, in team-member order.
    pub async fn handle_event(&self, event: Event, timestamp: i64) -> Result<Vec<Event>, OrchestrationError> {
        let conversation_id = event.extract_conversation_id();

        self.emit(CoordinatorEvent::EventReceived {
            conversation_id: conversation_id.clone(),
            event_id: event.id.clone(),
        })
        .await;

        if self.store.is_processed(&conversation_id, &event.id).await? {
            self.emit(CoordinatorEvent::EventSkippedDuplicate {
                conversation_id: conversation_id.clone(),
                event_id: event.id.clone(),
            })
            .await;
            return Ok(vec![]);
        }

        let lock = self.store.lock_conversation(&conversation_id).await;
        let _guard = lock.lock().await;

        let is_from_agent = self.config.agents.iter().any(|a| a.name == event.author_key)
            || self.config.agents.iter().any(|a| {
                a.signing_key_hex
                    .as_deref()
                    .and_then(|hex| Signer::from_hex(hex).ok())
                    .map(|s| s.pubkey() == event.author_key)
                    .unwrap_or(false)
            });

        let request_text = event.content.clone();
        let team = self
            .resolve_team(&event, &conversation_id, &request_text, timestamp)
            .await?;

        self.emit(CoordinatorEvent::TeamFormed {
            conversation_id: conversation_id.clone(),
            lead: team.lead.clone(),
            members: team.members.clone(),
            strategy: team.strategy,
        })
        .await;

        let invoker = CoordinatorInvoker {
            coordinator: self,
            event_id: event.id.clone(),
            is_from_agent,
        };

        self.emit(CoordinatorEvent::StrategyStarted {
            conversation_id: conversation_id.clone(),
            strategy: team.strategy,
        })
        .await;

        let engine = strategy::engine_for(team.strategy);
        let result: StrategyExecutionResult = engine.execute(&team, &request_text, &invoker, timestamp).await;

        self.emit(CoordinatorEvent::StrategyFinished {
            conversation_id: conversation_id.clone(),
            success: result.success,
            response_count: result.responses.len(),
        })
        .await;

        let mut published = Vec::new();
        for response in &result.responses {
            if should_publish(response) {
                match self.publish_response(&conversation_id, &event, response, timestamp).await {
                    Ok(published_event) => {
                        self.emit(CoordinatorEvent::ResponsePublished {
                            conversation_id: conversation_id.clone(),
                            agent_name: response.agent_name.clone(),
                        })
                        .await;
                        published.push(published_event);
                    }
                    Err(e) => {
                        log::warn!("failed to publish response from {}: {}", response.agent_name, e);
                    }
                }
            } else {
                self.emit(CoordinatorEvent::ResponseSuppressed {
                    conversation_id: conversation_id.clone(),
                    agent_name: response.agent_name.clone(),
                    reason: "empty or nothing-to-add response".to_string(),
                })
                .await;
            }
        }

        if published.is_empty() && !result.success {
            match self.publish_diagnostic(&event, &team.lead, &result, timestamp).await {
                Ok(diagnostic_event) => {
                    self.emit(CoordinatorEvent::ResponsePublished {
                        conversation_id: conversation_id.clone(),
                        agent_name: team.lead.clone(),
                    })
                    .await;
                    published.push(diagnostic_event);
                }
                Err(e) => log::warn!("failed to publish diagnostic for failed run on '{}': {}", conversation_id, e),
            }
            if let Err(e) = self.mark_conversation_failed(&conversation_id).await {
                log::warn!("failed to record failed status on conversation '{}': {}", conversation_id, e);
            }
        }

        self.store.mark_processed(&conversation_id, &event.id).await?;
        Ok(published)
    }

    /// §7's persistence-error/partial-failure contract: a run that published
    /// nothing still owes the thread a short diagnostic rather than silence.
    async fn publish_diagnostic(
        &self,
        original: &Event,
        lead: &str,
        result: &StrategyExecutionResult,
        timestamp: i64,
    ) -> Result<Event, OrchestrationError> {
        let agent = self.build_agent(lead)?;
        let summary = if result.errors.is_empty() {
            "The request could not be completed.".to_string()
        } else {
            format!("The request could not be completed: {}", result.errors.join("; "))
        };
        let tags = vec![
            vec!["e".to_string(), original.id.clone()],
            vec!["a".to_string(), self.config.project_address.clone()],
        ];
        let signed = agent.sign(summary, 1, tags, timestamp)?;
        publish_with_retry(self.bus.as_ref(), signed.clone(), self.retry_policy).await?;
        Ok(signed)
    }

    /// Best-effort: mark the conversation `status=failed` in its metadata so
    /// a later read can tell a failed run apart from a quiet one.
    async fn mark_conversation_failed(&self, conversation_id: &str) -> Result<(), OrchestrationError> {
        if let Some(mut conversation) = self.store.load(conversation_id).await? {
            conversation
                .metadata
                .insert("status".to_string(), serde_json::Value::String("failed".to_string()));
            self.store.save(&conversation).await?;
        }
        Ok(())
    }

    async fn publish_response(
        &self,
        conversation_id: &str,
        original: &Event,
        response: &AgentResponse,
        timestamp: i64,
    ) -> Result<Event, OrchestrationError> {
        let agent = self.build_agent(&response.agent_name)?;
        let tags = vec![
            vec!["e".to_string(), original.id.clone()],
            vec!["a".to_string(), self.config.project_address.clone()],
        ];
        let signed = agent.sign(response.response.clone(), 1, tags, timestamp)?;
        publish_with_retry(self.bus.as_ref(), signed.clone(), self.retry_policy).await?;
        let _ = conversation_id;
        Ok(signed)
    }
}

/// A response publishes if it carries a `render_in_chat` payload, or if its
/// content is non-empty and does not contain the suppression disclaimer as a
/// case-insensitive substring (§4.9 step 6).
fn should_publish(response: &AgentResponse) -> bool {
    if response.render_in_chat.is_some() {
        return true;
    }
    let trimmed = response.response.trim();
    if trimmed.is_empty() {
        return false;
    }
    !trimmed.to_lowercase().contains(NOTHING_TO_ADD_DISCLAIMER)
}

/// Bridges [`AgentInvoker`] (what strategies call) to [`Agent::generate_response`]
/// (what actually talks to an LLM and persists the turn), building a fresh
/// [`Agent`] per call so each invocation gets an up-to-date tool registry and
/// signer without the coordinator needing to cache agent instances.
struct CoordinatorInvoker<'a> {
    coordinator: &'a Coordinator,
    event_id: String,
    is_from_agent: bool,
}

#[async_trait]
impl<'a> AgentInvoker for CoordinatorInvoker<'a> {
    async fn generate(
        &self,
        conversation_id: &str,
        agent_name: &str,
        prompt: &str,
        phase: &str,
        timestamp: i64,
    ) -> Result<AgentResponse, OrchestrationError> {
        let agent = self.coordinator.build_agent(agent_name)?;
        let seed = ContextSeed {
            project_metadata: HashMap::new(),
            available_agents: self.coordinator.config.agents.iter().map(|a| a.name.clone()).collect(),
            environment_context: String::new(),
            is_from_agent: self.is_from_agent,
        };
        agent
            .get_or_create_conversation_with_context(conversation_id, &seed, timestamp)
            .await?;

        if let Err(e) = agent.transition_phase(conversation_id, Phase::from_label(phase), timestamp).await {
            log::warn!("phase transition to '{}' failed for '{}': {}", phase, agent_name, e);
        }

        self.publish_typing_indicator(&agent, conversation_id, phase, TYPING_START_KIND, timestamp).await;
        let result = agent
            .generate_response(conversation_id, prompt, Some(self.event_id.clone()), timestamp)
            .await;
        self.publish_typing_indicator(&agent, conversation_id, phase, TYPING_STOP_KIND, timestamp).await;

        result
    }
}

impl<'a> CoordinatorInvoker<'a> {
    /// Best-effort (§5): a failed typing-indicator publish never aborts
    /// orchestration, so errors are logged and swallowed rather than
    /// propagated.
    async fn publish_typing_indicator(&self, agent: &Agent, conversation_id: &str, phase: &str, kind: u32, timestamp: i64) {
        let tags = vec![vec!["e".to_string(), conversation_id.to_string()]];
        let signed = match agent.sign(phase.to_string(), kind, tags, timestamp) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("typing indicator not signed for '{}': {}", agent.name(), e);
                return;
            }
        };
        if let Err(e) = self.coordinator.bus.publish_ephemeral(signed).await {
            log::debug!("typing indicator publish failed for '{}': {}", agent.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::config::{AgentProfile, LLMProfile};
    use crate::runtime::model::StrategyExecutionResult;
    use crate::runtime::store::InMemoryConversationStore;
    use std::collections::HashMap as StdHashMap;

    struct StubBus;

    #[async_trait]
    impl EventBus for StubBus {
        async fn subscribe(
            &self,
            _filter: crate::runtime::event_bus::EventFilter,
        ) -> Result<Vec<Event>, OrchestrationError> {
            Ok(vec![])
        }

        async fn publish(&self, _event: Event) -> Result<(), OrchestrationError> {
            Ok(())
        }
    }

    fn config() -> CoordinatorConfig {
        let signer = Signer::generate();
        let mut llm_profiles = StdHashMap::new();
        llm_profiles.insert(
            "p1".to_string(),
            LLMProfile::new("p1", "ollama", "llama3", ""),
        );
        CoordinatorConfig {
            agents: vec![AgentProfile {
                name: "lead".to_string(),
                description: "lead agent".to_string(),
                role: "assistant".to_string(),
                instructions: "help".to_string(),
                llm_profile_id: "p1".to_string(),
                tool_ids: vec![],
                signing_key_hex: Some(signer.to_hex()),
            }],
            llm_profiles,
            planning_llm_profile_id: "p1".to_string(),
            max_team_size: 3,
            default_agent_name: "lead".to_string(),
            project_address: "proj1".to_string(),
            max_tool_turns: 8,
            conversation_max_age_secs: crate::runtime::store::default_cleanup_max_age_secs(),
        }
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(
            config(),
            Arc::new(StubBus),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(ToolRegistry::empty()),
        )
    }

    fn event_with_p_tags(tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "evt1".to_string(),
            author_key: "human".to_string(),
            content: "help me".to_string(),
            kind: 1,
            tags,
            created_at: 0,
            sig: String::new(),
        }
    }

    #[tokio::test]
    async fn explicit_p_tag_resolves_to_a_single_strategy_team_without_calling_the_planner() {
        let coordinator = coordinator();
        let event = event_with_p_tags(vec![vec!["p".to_string(), "lead".to_string()]]);
        let team = coordinator
            .resolve_team(&event, "conv1", "help me", 0)
            .await
            .unwrap();
        assert_eq!(team.lead, "lead");
        assert_eq!(team.strategy, crate::runtime::model::Strategy::Single);
    }

    #[test]
    fn nothing_to_add_disclaimer_is_suppressed() {
        let response = AgentResponse {
            agent_name: "lead".to_string(),
            response: "Nothing to add.".to_string(),
            timestamp: 0,
            metadata: StdHashMap::new(),
            render_in_chat: None,
        };
        assert!(!should_publish(&response));
    }

    #[test]
    fn disclaimer_as_a_substring_is_still_suppressed() {
        let response = AgentResponse {
            agent_name: "lead".to_string(),
            response: "Well, there's nothing to add here.".to_string(),
            timestamp: 0,
            metadata: StdHashMap::new(),
            render_in_chat: None,
        };
        assert!(!should_publish(&response));
    }

    #[test]
    fn empty_response_is_suppressed() {
        let response = AgentResponse {
            agent_name: "lead".to_string(),
            response: "   ".to_string(),
            timestamp: 0,
            metadata: StdHashMap::new(),
            render_in_chat: None,
        };
        assert!(!should_publish(&response));
    }

    #[test]
    fn ordinary_response_is_published() {
        let response = AgentResponse {
            agent_name: "lead".to_string(),
            response: "Here is the answer.".to_string(),
            timestamp: 0,
            metadata: StdHashMap::new(),
            render_in_chat: None,
        };
        assert!(should_publish(&response));
    }

    #[test]
    fn disclaimer_only_response_with_render_in_chat_is_still_published() {
        let response = AgentResponse {
            agent_name: "lead".to_string(),
            response: "Nothing to add.".to_string(),
            timestamp: 0,
            metadata: StdHashMap::new(),
            render_in_chat: Some(serde_json::json!({"table": []})),
        };
        assert!(should_publish(&response));
    }

    #[tokio::test]
    async fn duplicate_event_is_skipped_before_team_formation() {
        let coordinator = coordinator();
        let store = InMemoryConversationStore::new();
        store.mark_processed("conv1", "evt1").await.unwrap();
        let coordinator = Coordinator::new(
            config_from(&coordinator),
            Arc::new(StubBus),
            Arc::new(store),
            Arc::new(ToolRegistry::empty()),
        );
        let event = Event {
            id: "evt1".to_string(),
            author_key: "human".to_string(),
            content: "hi".to_string(),
            kind: 1,
            tags: vec![vec!["e".to_string(), "conv1".to_string()]],
            created_at: 0,
            sig: String::new(),
        };
        let published = coordinator.handle_event(event, 0).await.unwrap();
        assert!(published.is_empty());
    }

    fn config_from(coordinator: &Coordinator) -> CoordinatorConfig {
        coordinator.config.clone()
    }
}
