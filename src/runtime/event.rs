//! Coordinator observability layer.
//!
//! Grounded in the teacher's `EventHandler`/`AgentEvent`/`OrchestrationEvent`
//! split: a single trait with default no-op methods, wrapped in `Arc<dyn
//! EventObserver>` and shared across the coordinator, so callers only
//! override the events they care about. This is ambient observability (the
//! teacher's own lifecycle-logging layer generalised to this runtime's
//! lifecycle), not an externally visible feature — every lifecycle
//! transition is also logged at `info`/`warn` independent of whether an
//! observer is attached.

use crate::runtime::model::Strategy;
use async_trait::async_trait;

/// Lifecycle events emitted by the coordinator (C9) as it processes an
/// inbound event end-to-end.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// An inbound event was received and its conversation id extracted.
    EventReceived { conversation_id: String, event_id: String },
    /// The event was already processed; dispatch was skipped.
    EventSkippedDuplicate { conversation_id: String, event_id: String },
    /// The request analyser produced a team.
    TeamFormed { conversation_id: String, lead: String, members: Vec<String>, strategy: Strategy },
    /// A strategy began executing.
    StrategyStarted { conversation_id: String, strategy: Strategy },
    /// A strategy finished executing.
    StrategyFinished { conversation_id: String, success: bool, response_count: usize },
    /// A response was signed and published.
    ResponsePublished { conversation_id: String, agent_name: String },
    /// A response was withheld (empty, or a bare "nothing to add" disclaimer).
    ResponseSuppressed { conversation_id: String, agent_name: String, reason: String },
}

/// Optional observer attached to the coordinator. All methods default to a
/// no-op so implementors only override what they need.
#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_event(&self, event: &CoordinatorEvent) {
        let _ = event;
    }
}
