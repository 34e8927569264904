//! Single Responder strategy (§4.7.1).
//!
//! Grounded in the teacher's implicit one-agent case of `execute_parallel`
//! with `rounds=1`: one agent, one call, no delegation or review phase.

use super::{AgentInvoker, StrategyEngine};
use crate::runtime::model::{AgentResponse, StrategyExecutionResult, Team};
use async_trait::async_trait;

pub struct SingleResponderStrategy;

#[async_trait]
impl StrategyEngine for SingleResponderStrategy {
    fn name(&self) -> &'static str {
        "single"
    }

    async fn execute(
        &self,
        team: &Team,
        request_text: &str,
        invoker: &dyn AgentInvoker,
        timestamp: i64,
    ) -> StrategyExecutionResult {
        if team.lead.is_empty() {
            return StrategyExecutionResult::empty_failure("single responder strategy: no lead resolved".to_string());
        }

        match invoker
            .generate(&team.conversation_id, &team.lead, request_text, "respond", timestamp)
            .await
        {
            Ok(response) => StrategyExecutionResult {
                success: true,
                responses: vec![response],
                errors: vec![],
                metadata: Default::default(),
            },
            Err(e) => StrategyExecutionResult::empty_failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::OrchestrationError;
    use crate::runtime::model::{Strategy, TaskDefinition, TeamFormation, RequestAnalysis};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubInvoker {
        outcomes: Mutex<Vec<Result<String, String>>>,
    }

    #[async_trait]
    impl AgentInvoker for StubInvoker {
        async fn generate(
            &self,
            _conversation_id: &str,
            agent_name: &str,
            _prompt: &str,
            _phase: &str,
            timestamp: i64,
        ) -> Result<AgentResponse, OrchestrationError> {
            let outcome = self.outcomes.lock().unwrap().remove(0);
            match outcome {
                Ok(content) => Ok(AgentResponse {
                    agent_name: agent_name.to_string(),
                    response: content,
                    timestamp,
                    metadata: Default::default(),
                    render_in_chat: None,
                }),
                Err(e) => Err(OrchestrationError::Provider(e)),
            }
        }
    }

    fn team(lead: &str) -> Team {
        Team {
            id: "t1".into(),
            conversation_id: "c1".into(),
            lead: lead.to_string(),
            members: vec![lead.to_string()],
            strategy: Strategy::Single,
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
                    suggested_strategy: "single".into(),
                    reasoning: String::new(),
                },
            },
        }
    }

    #[tokio::test]
    async fn one_call_succeeds() {
        let invoker = StubInvoker { outcomes: Mutex::new(vec![Ok("hi".into())]) };
        let result = SingleResponderStrategy.execute(&team("alice"), "hello", &invoker, 0).await;
        assert!(result.success);
        assert_eq!(result.responses.len(), 1);
    }

    #[tokio::test]
    async fn missing_lead_fails_fast() {
        let invoker = StubInvoker { outcomes: Mutex::new(vec![]) };
        let result = SingleResponderStrategy.execute(&team(""), "hello", &invoker, 0).await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn exception_yields_failure() {
        let invoker = StubInvoker { outcomes: Mutex::new(vec![Err("boom".into())]) };
        let result = SingleResponderStrategy.execute(&team("alice"), "hello", &invoker, 0).await;
        assert!(!result.success);
        assert_eq!(result.errors, vec!["provider error: boom".to_string()]);
    }
}
