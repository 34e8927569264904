//! Strategy Engine (§4.7): four coordination patterns over a common contract.
//!
//! Grounded directly in the teacher's `Orchestration` engine (`orchestration.rs`),
//! which already implements parallel fan-out via `tokio::spawn` + join and
//! hierarchical layering with the same shape this module needs. The teacher's
//! older `council.rs`/`council_session.rs` iteration of the same idea is not
//! carried forward — its functionality is fully subsumed by `orchestration.rs`'s
//! later design, which this module generalises.

mod hierarchical;
mod parallel;
mod phased;
mod single;

pub use hierarchical::HierarchicalStrategy;
pub use parallel::ParallelStrategy;
pub use phased::PhasedStrategy;
pub use single::SingleResponderStrategy;

use crate::runtime::error::OrchestrationError;
use crate::runtime::model::{AgentResponse, Strategy as StrategyKind, StrategyExecutionResult, Team};
use async_trait::async_trait;

/// Everything a strategy needs from the rest of the runtime to turn a prompt
/// into an [`AgentResponse`], without depending on the concrete `Agent` type.
///
/// One call to [`AgentInvoker::generate`] corresponds to the teacher's
/// `Agent::send`/`GenerateResponse` (§4.6): it loads the named agent's
/// conversation state, calls its tool-enabled LLM, appends and persists the
/// result, and returns the produced [`AgentResponse`]. Typing-indicator
/// bracketing happens inside the invoker so every strategy gets it for free.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn generate(
        &self,
        conversation_id: &str,
        agent_name: &str,
        prompt: &str,
        phase: &str,
        timestamp: i64,
    ) -> Result<AgentResponse, OrchestrationError>;
}

/// A coordination pattern over a formed [`Team`] (§4.7).
#[async_trait]
pub trait StrategyEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        team: &Team,
        request_text: &str,
        invoker: &dyn AgentInvoker,
        timestamp: i64,
    ) -> StrategyExecutionResult;
}

/// Resolve the strategy implementation matching a [`StrategyKind`] (the data
/// carried on a [`Team`] after §4.8's constraint enforcement).
pub fn engine_for(kind: StrategyKind) -> Box<dyn StrategyEngine> {
    match kind {
        StrategyKind::Single => Box::new(SingleResponderStrategy),
        StrategyKind::Hierarchical => Box::new(HierarchicalStrategy),
        StrategyKind::Parallel => Box::new(ParallelStrategy),
        StrategyKind::Phased => Box::new(PhasedStrategy),
    }
}

/// Sub-conversation id used by hierarchical/phased delegation (§4.7.2): the
/// parent conversation id with the member name appended.
pub(crate) fn sub_conversation_id(parent: &str, member: &str) -> String {
    format!("{}-{}", parent, member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_for_maps_every_kind_to_a_distinct_name() {
        let names: Vec<&'static str> = [
            StrategyKind::Single,
            StrategyKind::Hierarchical,
            StrategyKind::Parallel,
            StrategyKind::Phased,
        ]
        .into_iter()
        .map(|k| engine_for(k).name())
        .collect();
        assert_eq!(names, vec!["single", "hierarchical", "parallel", "phased"]);
    }

    #[test]
    fn sub_conversation_id_appends_member_name() {
        assert_eq!(sub_conversation_id("conv1", "bob"), "conv1-bob");
    }
}
