//! End-to-end scenarios driven through the full `Coordinator`, using
//! `LlmClientFactory` to substitute scripted clients per LLM profile instead
//! of real providers, and a recording `EventBus` instead of a real relay.

use async_trait::async_trait;
use relayforge::client_wrapper::{ClientWrapper, Message, Role, ToolDefinition};
use relayforge::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
use relayforge::tool_protocols::CustomToolProtocol;
use relayforge::runtime::error::OrchestrationError;
use relayforge::{AgentProfile, Coordinator, CoordinatorConfig, Event, EventBus, EventFilter, LLMProfile, LlmClientFactory};
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

// --- Scripted LLM client factory -------------------------------------------

type ScriptMap = Arc<Mutex<HashMap<String, VecDeque<Result<String, String>>>>>;

/// Queues one reply (or failure) per LLM profile id, consumed in order. A
/// profile whose queue runs dry keeps answering with a placeholder rather
/// than panicking, since some strategies call the same agent more times than
/// a test cares to script exactly (e.g. phased's per-phase reviews).
struct ScriptedClient {
    profile_id: String,
    script: ScriptMap,
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error>> {
        let mut script = self.script.lock().await;
        let queue = script.entry(self.profile_id.clone()).or_default();
        match queue.pop_front() {
            Some(Ok(text)) => Ok(Message { role: Role::Assistant, content: Arc::from(text.as_str()), tool_calls: vec![] }),
            Some(Err(message)) => Err(message.into()),
            None => Ok(Message { role: Role::Assistant, content: Arc::from("no further scripted response"), tool_calls: vec![] }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedClientFactory {
    script: ScriptMap,
}

impl ScriptedClientFactory {
    fn new() -> Self {
        Self { script: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn queue(&self, profile_id: &str, reply: &str) {
        self.script
            .lock()
            .await
            .entry(profile_id.to_string())
            .or_default()
            .push_back(Ok(reply.to_string()));
    }

    async fn queue_failure(&self, profile_id: &str, message: &str) {
        self.script
            .lock()
            .await
            .entry(profile_id.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }
}

impl LlmClientFactory for ScriptedClientFactory {
    fn build(&self, profile: &LLMProfile) -> Result<Arc<dyn ClientWrapper>, OrchestrationError> {
        Ok(Arc::new(ScriptedClient { profile_id: profile.id.clone(), script: self.script.clone() }))
    }
}

// --- Recording event bus ----------------------------------------------------

struct RecordingBus {
    published: Arc<Mutex<Vec<Event>>>,
}

impl RecordingBus {
    fn new() -> Self {
        Self { published: Arc::new(Mutex::new(Vec::new())) }
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn subscribe(&self, _filter: EventFilter) -> Result<Vec<Event>, OrchestrationError> {
        Ok(vec![])
    }

    async fn publish(&self, event: Event) -> Result<(), OrchestrationError> {
        self.published.lock().await.push(event);
        Ok(())
    }
}

// --- Config helpers ----------------------------------------------------------

fn agent_profile(name: &str) -> AgentProfile {
    AgentProfile {
        name: name.to_string(),
        description: format!("{} agent", name),
        role: "assistant".to_string(),
        instructions: "help with the request".to_string(),
        llm_profile_id: format!("{}-llm", name),
        tool_ids: vec![],
        signing_key_hex: Some(relayforge::Signer::generate().to_hex()),
    }
}

fn config(agents: Vec<AgentProfile>, planning_llm_profile_id: &str, default_agent_name: &str) -> CoordinatorConfig {
    let mut llm_profiles = HashMap::new();
    for a in &agents {
        llm_profiles.insert(a.llm_profile_id.clone(), LLMProfile::new(&a.llm_profile_id, "ollama", "stub-model", ""));
    }
    llm_profiles
        .entry(planning_llm_profile_id.to_string())
        .or_insert_with(|| LLMProfile::new(planning_llm_profile_id, "ollama", "stub-model", ""));

    CoordinatorConfig {
        agents,
        llm_profiles,
        planning_llm_profile_id: planning_llm_profile_id.to_string(),
        max_team_size: 5,
        default_agent_name: default_agent_name.to_string(),
        project_address: "proj1".to_string(),
        max_tool_turns: 8,
        conversation_max_age_secs: relayforge::runtime::store::default_cleanup_max_age_secs(),
    }
}

fn event(id: &str, tags: Vec<Vec<String>>, content: &str) -> Event {
    Event {
        id: id.to_string(),
        author_key: "human".to_string(),
        content: content.to_string(),
        kind: 1,
        tags,
        created_at: 0,
        sig: String::new(),
    }
}

async fn empty_registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::empty())
}

async fn echo_tool_registry() -> Arc<ToolRegistry> {
    let protocol = Arc::new(CustomToolProtocol::new());
    protocol
        .register_async_tool(
            ToolMetadata::new("echo", "Echoes its input")
                .with_parameter(ToolParameter::new("text", ToolParameterType::String).required()),
            Arc::new(|params| Box::pin(async move { Ok(ToolResult::success(params["text"].clone())) })),
        )
        .await;
    let mut registry = ToolRegistry::empty();
    registry.add_protocol("builtin", protocol).await.unwrap();
    Arc::new(registry)
}

// --- Scenario 1: single responder happy path --------------------------------

#[tokio::test]
async fn single_responder_happy_path() {
    let lead = agent_profile("lead");
    let cfg = config(vec![lead.clone()], "lead-llm", "lead");
    let bus = Arc::new(RecordingBus::new());
    let factory = ScriptedClientFactory::new();
    factory.queue("lead-llm", "2 + 2 is 4.").await;

    let coordinator = Coordinator::new(cfg, bus.clone(), Arc::new(relayforge::runtime::store::InMemoryConversationStore::new()), empty_registry().await)
        .with_client_factory(Arc::new(factory));

    let inbound = event("evt1", vec![vec!["p".to_string(), "lead".to_string()]], "What's 2+2?");
    let published = coordinator.handle_event(inbound, 100).await.unwrap();

    assert_eq!(published.len(), 1);
    assert_eq!(published[0].content, "2 + 2 is 4.");
    relayforge::runtime::signer::verify_event(&published[0]).unwrap();
    assert!(published[0].tags.iter().any(|t| t[0] == "e" && t[1] == "evt1"));
}

// --- Scenario 2: hierarchical strategy with one member failing --------------

#[tokio::test]
async fn hierarchical_partial_failure_still_publishes_surviving_responses() {
    let agents = vec![agent_profile("lead"), agent_profile("m1"), agent_profile("m2")];
    let cfg = config(agents, "planner-llm", "lead");
    let bus = Arc::new(RecordingBus::new());
    let factory = ScriptedClientFactory::new();

    factory
        .queue(
            "planner-llm",
            r#"{"suggestedStrategy":"hierarchical","lead":"lead","members":["lead","m1","m2"],"taskDescription":"ship it"}"#,
        )
        .await;
    factory.queue("lead-llm", "Delegating: m1 handles research, m2 handles writing.").await; // analyse
    factory.queue("lead-llm", "Final integrated answer.").await; // review
    factory.queue("m1-llm", "Research done.").await;
    factory.queue_failure("m2-llm", "provider timed out").await;

    let coordinator = Coordinator::new(cfg, bus.clone(), Arc::new(relayforge::runtime::store::InMemoryConversationStore::new()), empty_registry().await)
        .with_client_factory(Arc::new(factory));

    let inbound = event("evt1", vec![], "Ship the feature.");
    let published = coordinator.handle_event(inbound, 100).await.unwrap();

    // analysis (lead) + m1's response + review (lead); m2 dropped as a partial failure.
    assert_eq!(published.len(), 3);
    assert!(published.iter().any(|e| e.content == "Research done."));
    assert!(!published.iter().any(|e| e.content.contains("provider timed out")));
}

// --- Scenario 3: parallel strategy, every member fails -----------------------

#[tokio::test]
async fn parallel_all_members_failing_publishes_a_diagnostic() {
    let agents = vec![agent_profile("m1"), agent_profile("m2"), agent_profile("m3")];
    let cfg = config(agents, "planner-llm", "m1");
    let bus = Arc::new(RecordingBus::new());
    let factory = ScriptedClientFactory::new();

    factory
        .queue(
            "planner-llm",
            r#"{"suggestedStrategy":"parallel","lead":"m1","members":["m1","m2","m3"]}"#,
        )
        .await;
    factory.queue_failure("m1-llm", "boom").await;
    factory.queue_failure("m2-llm", "boom").await;
    factory.queue_failure("m3-llm", "boom").await;

    let coordinator = Coordinator::new(cfg, bus.clone(), Arc::new(relayforge::runtime::store::InMemoryConversationStore::new()), empty_registry().await)
        .with_client_factory(Arc::new(factory));

    let inbound = event("evt1", vec![], "Summarise this from three angles.");
    let published = coordinator.handle_event(inbound, 100).await.unwrap();

    // No member reply survives, but the thread still gets a short diagnostic
    // rather than silence.
    assert_eq!(published.len(), 1);
    relayforge::runtime::signer::verify_event(&published[0]).unwrap();
    assert!(published[0].tags.iter().any(|t| t[0] == "e" && t[1] == "evt1"));
    assert!(published[0].content.contains("could not be completed"));
}

// --- Scenario 4: phased strategy falls back to the default four phases -----

#[tokio::test]
async fn phased_strategy_uses_default_phases_when_plan_has_none() {
    let agents = vec![agent_profile("lead"), agent_profile("m1")];
    let cfg = config(agents, "planner-llm", "lead");
    let bus = Arc::new(RecordingBus::new());
    let factory = ScriptedClientFactory::new();

    factory
        .queue(
            "planner-llm",
            r#"{"suggestedStrategy":"phased","lead":"lead","members":["lead","m1"]}"#,
        )
        .await;
    factory.queue("lead-llm", "Here is an unstructured delivery plan, no explicit phases.").await; // plan
    for _ in 0..4 {
        factory.queue("lead-llm", "Phase reviewed.").await; // one review per default phase
    }
    factory.queue("lead-llm", "Final integrated deliverable.").await; // integrate
    for _ in 0..4 {
        factory.queue("m1-llm", "Phase work done.").await;
    }

    let coordinator = Coordinator::new(cfg, bus.clone(), Arc::new(relayforge::runtime::store::InMemoryConversationStore::new()), empty_registry().await)
        .with_client_factory(Arc::new(factory));

    let inbound = event("evt1", vec![], "Build the whole feature end to end.");
    let published = coordinator.handle_event(inbound, 100).await.unwrap();

    // plan + 4 * (member + review) + integrate
    assert_eq!(published.len(), 10);
    assert!(published.iter().any(|e| e.content == "Final integrated deliverable."));
}

// --- Scenario 5: duplicate inbound events are not reprocessed ---------------

#[tokio::test]
async fn duplicate_event_is_not_reprocessed() {
    let lead = agent_profile("lead");
    let cfg = config(vec![lead], "lead-llm", "lead");
    let bus = Arc::new(RecordingBus::new());
    let factory = ScriptedClientFactory::new();
    factory.queue("lead-llm", "first reply").await;

    let coordinator = Coordinator::new(cfg, bus.clone(), Arc::new(relayforge::runtime::store::InMemoryConversationStore::new()), empty_registry().await)
        .with_client_factory(Arc::new(factory));

    let inbound = event("evt1", vec![vec!["p".to_string(), "lead".to_string()]], "hello");
    let first = coordinator.handle_event(inbound.clone(), 100).await.unwrap();
    assert_eq!(first.len(), 1);

    let second = coordinator.handle_event(inbound, 101).await.unwrap();
    assert!(second.is_empty());
}

// --- Scenario 6: a text-block tool call is executed and spliced in ----------

#[tokio::test]
async fn text_block_tool_call_is_repaired_and_executed() {
    let lead = agent_profile("lead");
    let cfg = config(vec![lead], "lead-llm", "lead");
    let bus = Arc::new(RecordingBus::new());
    let factory = ScriptedClientFactory::new();
    factory
        .queue(
            "lead-llm",
            "Let me check that.\n<tool_use>\n{\"tool\": \"echo\", \"arguments\": {\"text\": \"hi\"}}\n</tool_use>",
        )
        .await;

    let coordinator = Coordinator::new(cfg, bus.clone(), Arc::new(relayforge::runtime::store::InMemoryConversationStore::new()), echo_tool_registry().await)
        .with_client_factory(Arc::new(factory));

    let inbound = event("evt1", vec![vec!["p".to_string(), "lead".to_string()]], "echo hi for me");
    let published = coordinator.handle_event(inbound, 100).await.unwrap();

    assert_eq!(published.len(), 1);
    assert!(published[0].content.contains("**Tool: echo**"));
    assert!(published[0].content.contains("hi"));
}
