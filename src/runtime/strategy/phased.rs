//! Phased Delivery strategy (§4.7.4).
//!
//! Grounded in the teacher's `execute_hierarchical` layer-to-layer synthesis,
//! generalised to lead-planned phases with a default fallback sequence when
//! the planning response omits one.

use super::{AgentInvoker, StrategyEngine};
use crate::runtime::error::PartialFailure;
use crate::runtime::model::{AgentResponse, StrategyExecutionResult, Team};
use async_trait::async_trait;
use std::collections::HashMap;

/// Default phase sequence substituted when the lead's plan omits phases.
const DEFAULT_PHASES: [&str; 4] = [
    "Analysis & Design",
    "Core Implementation",
    "Integration & Enhancement",
    "Testing & Finalisation",
];

struct Phase {
    name: String,
    agents: Vec<String>,
}

pub struct PhasedStrategy;

#[async_trait]
impl StrategyEngine for PhasedStrategy {
    fn name(&self) -> &'static str {
        "phased"
    }

    async fn execute(
        &self,
        team: &Team,
        request_text: &str,
        invoker: &dyn AgentInvoker,
        timestamp: i64,
    ) -> StrategyExecutionResult {
        if team.lead.is_empty() {
            return StrategyExecutionResult::empty_failure("phased strategy: no lead resolved".to_string());
        }

        let plan_prompt = format!(
            "Produce an ordered delivery plan with named phases for the following request:\n{}",
            request_text
        );
        let plan_response = match invoker
            .generate(&team.conversation_id, &team.lead, &plan_prompt, "plan", timestamp)
            .await
        {
            Ok(response) => response,
            Err(e) => return StrategyExecutionResult::empty_failure(format!("plan phase failed: {}", e)),
        };

        let phases = extract_phases(&plan_response, team);
        let mut responses: Vec<AgentResponse> = vec![plan_response];
        let mut partial_failures: Vec<String> = Vec::new();
        let mut phase_context = String::new();

        for phase in &phases {
            let mut phase_outputs = Vec::new();
            for agent in &phase.agents {
                let prompt = format!(
                    "Phase \"{}\". Prior phase context:\n{}\n\nRequest:\n{}",
                    phase.name, phase_context, request_text
                );
                match invoker.generate(&team.conversation_id, agent, &prompt, &phase.name, timestamp).await {
                    Ok(response) => {
                        phase_outputs.push(format!("[{}]: {}", response.agent_name, response.response));
                        responses.push(response);
                    }
                    Err(e) => partial_failures.push(
                        PartialFailure {
                            agent_name: agent.clone(),
                            phase: phase.name.clone(),
                            message: e.to_string(),
                        }
                        .to_string(),
                    ),
                }
            }

            let review_prompt = format!(
                "Review phase \"{}\" outputs:\n{}",
                phase.name,
                phase_outputs.join("\n")
            );
            let review = match invoker
                .generate(&team.conversation_id, &team.lead, &review_prompt, "review", timestamp)
                .await
            {
                Ok(response) => response,
                Err(e) => return StrategyExecutionResult::empty_failure(format!("phase review failed: {}", e)),
            };
            phase_context = review.response.clone();
            responses.push(review);
        }

        let integration_prompt = format!(
            "Produce the final integrated answer based on all phase reviews:\n{}",
            phase_context
        );
        let integration = match invoker
            .generate(&team.conversation_id, &team.lead, &integration_prompt, "integrate", timestamp)
            .await
        {
            Ok(response) => response,
            Err(e) => return StrategyExecutionResult::empty_failure(format!("integration phase failed: {}", e)),
        };
        responses.push(integration);

        let mut metadata = HashMap::new();
        metadata.insert("phaseCount".to_string(), serde_json::json!(phases.len()));
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

/// Pull `phases` from the plan response's metadata if present; otherwise
/// substitute the default four-phase sequence, assigning every non-lead
/// member to every default phase.
fn extract_phases(plan: &AgentResponse, team: &Team) -> Vec<Phase> {
    if let Some(serde_json::Value::Array(arr)) = plan.metadata.get("phases") {
        let phases: Vec<Phase> = arr
            .iter()
            .filter_map(|p| {
                let name = p.get("name")?.as_str()?.to_string();
                let agents = p
                    .get("agents")
                    .and_then(|a| a.as_array())
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                Some(Phase { name, agents })
            })
            .collect();
        if !phases.is_empty() {
            return phases;
        }
    }

    let non_lead: Vec<String> = team.members.iter().filter(|m| *m != &team.lead).cloned().collect();
    let agents = if non_lead.is_empty() { vec![team.lead.clone()] } else { non_lead };
    DEFAULT_PHASES
        .iter()
        .map(|name| Phase { name: name.to_string(), agents: agents.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::OrchestrationError;
    use crate::runtime::model::{RequestAnalysis, Strategy, TaskDefinition, TeamFormation};
    use async_trait::async_trait;

    struct ScriptedInvoker;

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn generate(
            &self,
            _conversation_id: &str,
            agent_name: &str,
            _prompt: &str,
            phase: &str,
            timestamp: i64,
        ) -> Result<AgentResponse, OrchestrationError> {
            Ok(AgentResponse {
                agent_name: agent_name.to_string(),
                response: format!("{}:{}", agent_name, phase),
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
            lead: "lead".into(),
            members: vec!["lead".into(), "m1".into()],
            strategy: Strategy::Phased,
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
                    suggested_strategy: "phased".into(),
                    reasoning: String::new(),
                },
            },
        }
    }

    #[tokio::test]
    async fn missing_phases_uses_default_four_phase_sequence() {
        let invoker = ScriptedInvoker;
        let result = PhasedStrategy.execute(&team(), "build it", &invoker, 0).await;
        assert!(result.success);
        assert_eq!(result.metadata.get("phaseCount").unwrap(), &serde_json::json!(4));
    }
}
