//! Parallel strategy (§4.7.3).
//!
//! Grounded in the teacher's `execute_parallel`: every member is spawned
//! concurrently and every task is awaited to completion — no early
//! cancellation on either success or failure of a peer ("wait for all
//! settled").

use super::{AgentInvoker, StrategyEngine};
use crate::runtime::model::{AgentResponse, StrategyExecutionResult, Team};
use async_trait::async_trait;
use std::collections::HashMap;

pub struct ParallelStrategy;

#[async_trait]
impl StrategyEngine for ParallelStrategy {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn execute(
        &self,
        team: &Team,
        request_text: &str,
        invoker: &dyn AgentInvoker,
        timestamp: i64,
    ) -> StrategyExecutionResult {
        let outcomes = futures_util::future::join_all(team.members.iter().map(|member| {
            let conversation_id = team.conversation_id.clone();
            async move {
                let result = invoker
                    .generate(&conversation_id, member, request_text, "parallel", timestamp)
                    .await;
                (member.clone(), result)
            }
        }))
        .await;

        let mut responses: Vec<AgentResponse> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut per_agent_metadata = Vec::new();

        for (member, result) in outcomes {
            match result {
                Ok(response) => {
                    per_agent_metadata.push(serde_json::json!({
                        "agentName": member,
                        "success": true,
                    }));
                    responses.push(response);
                }
                Err(e) => {
                    per_agent_metadata.push(serde_json::json!({
                        "agentName": member,
                        "success": false,
                        "error": e.to_string(),
                    }));
                    errors.push(e.to_string());
                }
            }
        }

        // Aggregated content is ordered by member enumeration in the team,
        // not by completion order (§5): re-sort a view for that purpose only.
        let aggregated_content: String = team
            .members
            .iter()
            .filter_map(|member| responses.iter().find(|r| &r.agent_name == member))
            .map(|r| format!("{}: {}", r.agent_name, r.response))
            .collect::<Vec<_>>()
            .join("\n");

        let mut metadata = HashMap::new();
        metadata.insert("perAgent".to_string(), serde_json::Value::Array(per_agent_metadata));
        metadata.insert("aggregatedContent".to_string(), serde_json::Value::String(aggregated_content));

        StrategyExecutionResult {
            success: !responses.is_empty(),
            responses,
            errors,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::OrchestrationError;
    use crate::runtime::model::{RequestAnalysis, Strategy, TaskDefinition, TeamFormation};
    use async_trait::async_trait;

    struct ScriptedInvoker {
        fail_members: Vec<String>,
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn generate(
            &self,
            _conversation_id: &str,
            agent_name: &str,
            _prompt: &str,
            _phase: &str,
            timestamp: i64,
        ) -> Result<AgentResponse, OrchestrationError> {
            if self.fail_members.contains(&agent_name.to_string()) {
                return Err(OrchestrationError::Provider("boom".to_string()));
            }
            Ok(AgentResponse {
                agent_name: agent_name.to_string(),
                response: "ok".to_string(),
                timestamp,
                metadata: Default::default(),
                render_in_chat: None,
            })
        }
    }

    fn team() -> Team {
        Team {
            id: "t1".into(),
            conversation_id: "c1".into(),
            lead: "m1".into(),
            members: vec!["m1".into(), "m2".into(), "m3".into()],
            strategy: Strategy::Parallel,
            task_definition: TaskDefinition {
                id: "task1".into(),
                description: "do it".into(),
                success_criteria: vec![],
                requires_green_light: false,
                reviewers: vec![],
                estimated_complexity: 1,
            },
            formation: TeamFormation {
                timestamp: 0,
                reasoning: String::new(),
                request_analysis: RequestAnalysis {
                    request_type: "general".into(),
                    required_capabilities: vec![],
                    estimated_complexity: 1,
                    suggested_strategy: "parallel".into(),
                    reasoning: String::new(),
                },
            },
        }
    }

    #[tokio::test]
    async fn all_succeed() {
        let invoker = ScriptedInvoker { fail_members: vec![] };
        let result = ParallelStrategy.execute(&team(), "x", &invoker, 0).await;
        assert!(result.success);
        assert_eq!(result.responses.len(), 3);
        assert_eq!(result.errors.len(), 0);
    }

    #[tokio::test]
    async fn partial_failure_still_succeeds_with_remaining_responses() {
        let invoker = ScriptedInvoker { fail_members: vec!["m2".to_string()] };
        let result = ParallelStrategy.execute(&team(), "x", &invoker, 0).await;
        assert!(result.success);
        assert_eq!(result.responses.len(), 2);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn all_fail_yields_overall_failure() {
        let invoker = ScriptedInvoker { fail_members: vec!["m1".into(), "m2".into(), "m3".into()] };
        let result = ParallelStrategy.execute(&team(), "x", &invoker, 0).await;
        assert!(!result.success);
        assert_eq!(result.responses.len(), 0);
        assert_eq!(result.errors.len(), 3);
    }
}
