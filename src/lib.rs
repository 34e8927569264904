// src/lib.rs

pub mod runtime;

// Module-level re-exports so doc examples can use `relayforge::client_wrapper::...`
// and `relayforge::clients::openai::...` without the `runtime::` prefix.
pub use runtime::client_wrapper;
pub use runtime::clients;
pub use runtime::tool_protocol;
pub use runtime::tool_protocols;
pub use runtime::tools;

// Re-exporting key items for easier external access.
pub use runtime::agent::Agent;
pub use runtime::client_wrapper::{ClientWrapper, Message, Role};
pub use runtime::config::{AgentProfile, CoordinatorConfig, LLMProfile};
pub use runtime::coordinator::{Coordinator, DefaultLlmClientFactory, LlmClientFactory};
pub use runtime::event::{CoordinatorEvent, EventObserver};
pub use runtime::event_bus::{EventBus, EventFilter, RetryPolicy};
pub use runtime::model::{AgentDefinition, Conversation, Event, Strategy, Team};
pub use runtime::signer::Signer;
pub use runtime::store::ConversationStore;
