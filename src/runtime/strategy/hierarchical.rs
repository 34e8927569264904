//! Hierarchical strategy (§4.7.2).
//!
//! Grounded in the teacher's `execute_hierarchical` (layered fan-out with
//! synthesis between layers) and `execute_moderated`'s lead/expert split,
//! generalised from static layers to a single analyse/delegate/review cycle.

use super::{sub_conversation_id, AgentInvoker, StrategyEngine};
use crate::runtime::error::PartialFailure;
use crate::runtime::model::{AgentResponse, StrategyExecutionResult, Team};
use async_trait::async_trait;

pub struct HierarchicalStrategy;

#[async_trait]
impl StrategyEngine for HierarchicalStrategy {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    async fn execute(
        &self,
        team: &Team,
        request_text: &str,
        invoker: &dyn AgentInvoker,
        timestamp: i64,
    ) -> StrategyExecutionResult {
        if team.lead.is_empty() {
            return StrategyExecutionResult::empty_failure("hierarchical strategy: no lead resolved".to_string());
        }

        let mut responses: Vec<AgentResponse> = Vec::new();
        let mut partial_failures: Vec<String> = Vec::new();

        // 1. Analyse: lead produces a delegation plan targeting non-lead members.
        let members: Vec<&String> = team.members.iter().filter(|m| *m != &team.lead).collect();
        let analyse_prompt = format!(
            "Produce a delegation plan for the following request, assigning one task per team member ({}):\n{}",
            members.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", "),
            request_text
        );
        let analysis = match invoker
            .generate(&team.conversation_id, &team.lead, &analyse_prompt, "analyse", timestamp)
            .await
        {
            Ok(response) => response,
            Err(e) => return StrategyExecutionResult::empty_failure(format!("analyse phase failed: {}", e)),
        };
        responses.push(analysis.clone());

        // Delegation extraction: use the lead's declared subtasks if present,
        // otherwise synthesise one stock task per non-lead member (§4.7.2).
        let subtasks = extract_subtasks(&analysis, &members);

        // 2. Delegate: each non-lead member runs in its own sub-conversation.
        for (member, task) in members.iter().zip(subtasks.iter()) {
            let sub_conv = sub_conversation_id(&team.conversation_id, member);
            match invoker.generate(&sub_conv, member, task, "delegate", timestamp).await {
                Ok(response) => responses.push(response),
                Err(e) => partial_failures.push(PartialFailure {
                    agent_name: (*member).clone(),
                    phase: "delegate".to_string(),
                    message: e.to_string(),
                }
                .to_string()),
            }
        }

        // 3. Review: lead integrates member outputs.
        let review_prompt = format!(
            "Integrate the following member outputs into a single answer:\n{}",
            responses
                .iter()
                .skip(1)
                .map(|r| format!("[{}]: {}", r.agent_name, r.response))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let review = match invoker
            .generate(&team.conversation_id, &team.lead, &review_prompt, "review", timestamp)
            .await
        {
            Ok(response) => response,
            Err(e) => return StrategyExecutionResult::empty_failure(format!("review phase failed: {}", e)),
        };
        responses.push(review);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "partialFailures".to_string(),
            serde_json::Value::Array(partial_failures.iter().cloned().map(serde_json::Value::String).collect()),
        );

        StrategyExecutionResult {
            success: true,
            responses,
            errors: vec![],
            metadata,
        }
    }
}

/// Pull `subtasks` from the analyse response's metadata if the lead's LLM
/// supplied a stable-shaped list; otherwise fabricate one stock task per
/// non-lead member (the original system's behaviour here was inconsistent —
/// the spec's documented fallback is what this crate implements).
fn extract_subtasks(analysis: &AgentResponse, members: &[&String]) -> Vec<String> {
    if let Some(serde_json::Value::Array(arr)) = analysis.metadata.get("subtasks") {
        let subtasks: Vec<String> = arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        if subtasks.len() == members.len() {
            return subtasks;
        }
    }
    members
        .iter()
        .map(|m| format!("Handle the portion of the request relevant to {}.", m))
        .collect()
}
