//! Request Analyser & Team Former (§4.8).
//!
//! One planning call to a designated planning-LLM profile, constrained to
//! produce a `CombinedAnalysisResponse`. Grounded in the teacher's
//! `planner.rs` (`BasicPlanner`'s schema-constrained single planning turn),
//! combined with [`crate::runtime::json_repair`] for the unrepairable-output
//! fallback §4.8 requires.

use crate::runtime::client_wrapper::{ClientWrapper, Message as WireMessage, Role as WireRole};
use crate::runtime::json_repair::repair_parse;
use crate::runtime::model::{RequestAnalysis, Strategy, TaskDefinition, Team, TeamFormation};
use std::sync::Arc;

/// Catalogue entry the planner is told about: just enough to pick a lead/team.
#[derive(Debug, Clone)]
pub struct AgentCatalogueEntry {
    pub name: String,
    pub description: String,
    pub role: String,
}

pub struct TeamFormationInput<'a> {
    pub conversation_id: &'a str,
    pub request_text: &'a str,
    pub catalogue: &'a [AgentCatalogueEntry],
    pub max_team_size: usize,
    /// Used only by the deterministic fallback (§4.8's failure path).
    pub default_agent: &'a str,
}

/// Parsed planning response shape, mirroring `CombinedAnalysisResponse`
/// before constraint enforcement is applied.
#[derive(Debug, Clone)]
struct RawPlanningResponse {
    request_type: String,
    required_capabilities: Vec<String>,
    estimated_complexity: u8,
    suggested_strategy: String,
    reasoning: String,
    lead: String,
    members: Vec<String>,
    task_description: String,
    success_criteria: Vec<String>,
    requires_green_light: bool,
    reviewers: Vec<String>,
}

fn planning_prompt(input: &TeamFormationInput) -> String {
    let catalogue: Vec<serde_json::Value> = input
        .catalogue
        .iter()
        .map(|a| serde_json::json!({ "name": a.name, "description": a.description, "role": a.role }))
        .collect();
    format!(
        "Available agents:\n{}\n\nRequest:\n{}\n\nRespond with a single JSON object matching:\n\
         {{\"requestType\": string, \"requiredCapabilities\": [string], \"estimatedComplexity\": 1-10, \
         \"suggestedStrategy\": \"single\"|\"hierarchical\"|\"parallel\"|\"phased\", \"reasoning\": string, \
         \"lead\": string, \"members\": [string], \"taskDescription\": string, \"successCriteria\": [string], \
         \"requiresGreenLight\": bool, \"reviewers\": [string]}}",
        serde_json::Value::Array(catalogue),
        input.request_text,
    )
}

fn parse_planning_response(value: &serde_json::Value) -> RawPlanningResponse {
    RawPlanningResponse {
        request_type: value["requestType"].as_str().unwrap_or("general").to_string(),
        required_capabilities: string_array(&value["requiredCapabilities"]),
        estimated_complexity: value["estimatedComplexity"].as_u64().unwrap_or(5).clamp(1, 10) as u8,
        suggested_strategy: value["suggestedStrategy"].as_str().unwrap_or("hierarchical").to_string(),
        reasoning: value["reasoning"].as_str().unwrap_or_default().to_string(),
        lead: value["lead"].as_str().unwrap_or_default().to_string(),
        members: string_array(&value["members"]),
        task_description: value["taskDescription"].as_str().unwrap_or_default().to_string(),
        success_criteria: string_array(&value["successCriteria"]),
        requires_green_light: value["requiresGreenLight"].as_bool().unwrap_or(false),
        reviewers: string_array(&value["reviewers"]),
    }
}

fn string_array(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Apply §4.8's constraints to a raw planning response, producing a valid
/// [`Team`]. Never fails: every constraint has a defined repair.
fn enforce_constraints(raw: RawPlanningResponse, input: &TeamFormationInput, timestamp: i64) -> Team {
    let mut members = if raw.members.is_empty() {
        vec![raw.lead.clone()]
    } else {
        raw.members.clone()
    };

    let mut lead = raw.lead.clone();
    if lead.is_empty() || !members.contains(&lead) {
        lead = members[0].clone();
        log::warn!("planning response lead not in members; forcing lead := members[0]");
    }

    if members.len() > input.max_team_size {
        let mut truncated = vec![lead.clone()];
        for m in members.into_iter().filter(|m| m != &lead) {
            if truncated.len() >= input.max_team_size {
                break;
            }
            truncated.push(m);
        }
        members = truncated;
        log::warn!("planning response exceeded maxTeamSize; truncated, keeping lead first");
    }

    let mut strategy = Strategy::from_suggestion(&raw.suggested_strategy);

    if raw.requires_green_light && strategy == Strategy::Single {
        strategy = Strategy::Hierarchical;
        log::info!("requiresGreenLight set on a single-responder plan; upgraded to hierarchical");
    }

    let analysis = RequestAnalysis {
        request_type: raw.request_type,
        required_capabilities: raw.required_capabilities,
        estimated_complexity: raw.estimated_complexity,
        suggested_strategy: raw.suggested_strategy,
        reasoning: raw.reasoning.clone(),
    };

    let task = TaskDefinition {
        id: uuid::Uuid::new_v4().to_string(),
        description: if raw.task_description.is_empty() {
            input.request_text.to_string()
        } else {
            raw.task_description
        },
        success_criteria: raw.success_criteria,
        requires_green_light: raw.requires_green_light,
        reviewers: raw.reviewers,
        estimated_complexity: analysis.estimated_complexity,
    };

    Team {
        id: uuid::Uuid::new_v4().to_string(),
        conversation_id: input.conversation_id.to_string(),
        lead,
        members,
        strategy,
        task_definition: task,
        formation: TeamFormation {
            timestamp,
            reasoning: raw.reasoning,
            request_analysis: analysis,
        },
    }
}

/// §4.8's deterministic fallback: used when the planning call fails outright
/// or the repair-tolerant parser cannot recover valid JSON after one retry.
fn deterministic_fallback(input: &TeamFormationInput, timestamp: i64) -> Team {
    let lead = input.default_agent.to_string();
    Team {
        id: uuid::Uuid::new_v4().to_string(),
        conversation_id: input.conversation_id.to_string(),
        lead: lead.clone(),
        members: vec![lead],
        strategy: Strategy::Single,
        task_definition: TaskDefinition {
            id: uuid::Uuid::new_v4().to_string(),
            description: input.request_text.to_string(),
            success_criteria: vec![],
            requires_green_light: false,
            reviewers: vec![],
            estimated_complexity: 5,
        },
        formation: TeamFormation {
            timestamp,
            reasoning: "deterministic fallback: planning call failed or produced unrepairable output".to_string(),
            request_analysis: RequestAnalysis {
                request_type: "unknown".to_string(),
                required_capabilities: vec![],
                estimated_complexity: 5,
                suggested_strategy: "single".to_string(),
                reasoning: "fallback".to_string(),
            },
        },
    }
}

/// Run the planning call and produce a constraint-satisfying [`Team`].
/// Retries the planning call once on an unrepairable response before giving
/// up and returning the deterministic fallback.
pub async fn form_team(
    planning_llm: &Arc<dyn ClientWrapper>,
    input: TeamFormationInput<'_>,
    timestamp: i64,
) -> Team {
    let prompt = planning_prompt(&input);
    let messages = [WireMessage {
        role: WireRole::User,
        content: std::sync::Arc::from(prompt.as_str()),
        tool_calls: vec![],
    }];

    for attempt in 0..2 {
        match planning_llm.send_message(&messages, None).await {
            Ok(response) => match repair_parse(&response.content) {
                Ok(value) => {
                    let raw = parse_planning_response(&value);
                    return enforce_constraints(raw, &input, timestamp);
                }
                Err(e) => {
                    log::warn!("planning response unrepairable on attempt {}: {}", attempt + 1, e);
                }
            },
            Err(e) => {
                log::warn!("planning call failed on attempt {}: {}", attempt + 1, e);
            }
        }
    }

    deterministic_fallback(&input, timestamp)
}
