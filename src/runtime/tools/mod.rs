//! Built-in Tool Implementations
//!
//! This module provides the tools registered by default for every agent unless the
//! embedding application supplies its own [`ToolRegistry`](crate::runtime::tool_protocol::ToolRegistry).
//!
//! # Available Tools
//!
//! - **Calculator**: stateless scientific expression evaluator.
//! - **Shell**: subprocess execution with timeout, allow/deny lists, and a working-directory
//!   restriction. The streaming transport for shell output (kind 24200 in the event model) is
//!   an external collaborator; this tool only runs the command and returns its captured output.
//!
//! # Integration with Agents
//!
//! ```ignore
//! use relayforge::runtime::tools::default_registry;
//!
//! let registry = default_registry();
//! agent.with_tools(registry);
//! ```

pub mod bash;
pub mod calculator;

pub use bash::{BashError, BashResult, BashTool as ShellTool, Platform};
pub use calculator::{Calculator, CalculatorError, CalculatorResult};

use crate::runtime::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry};
use crate::runtime::tool_protocols::CustomToolProtocol;
use std::sync::Arc;

/// Build the default tool registry every agent receives: `calculator` and `shell`,
/// backed by a single [`CustomToolProtocol`] instance.
pub async fn default_registry() -> ToolRegistry {
    let protocol = Arc::new(CustomToolProtocol::new());

    let calculator = Arc::new(Calculator::new());
    protocol
        .register_async_tool(
            ToolMetadata::new("calculator", "Evaluates a mathematical expression").with_parameter(
                ToolParameter::new("expression", ToolParameterType::String)
                    .with_description("The expression to evaluate, e.g. sqrt(16) + mean([1,2,3])")
                    .required(),
            ),
            Arc::new(move |params| {
                let calculator = calculator.clone();
                Box::pin(async move {
                    let expr = params["expression"].as_str().unwrap_or_default().to_string();
                    match calculator.evaluate(&expr).await {
                        Ok(value) => Ok(crate::runtime::tool_protocol::ToolResult::success(
                            serde_json::json!({ "result": value }),
                        )),
                        Err(e) => Ok(crate::runtime::tool_protocol::ToolResult::failure(
                            e.to_string(),
                        )),
                    }
                })
            }),
        )
        .await;

    let shell = Arc::new(ShellTool::default());
    protocol
        .register_async_tool(
            ToolMetadata::new("shell", "Runs a shell command and returns its output")
                .with_parameter(
                    ToolParameter::new("command", ToolParameterType::String)
                        .with_description("The shell command line to execute")
                        .required(),
                ),
            Arc::new(move |params| {
                let shell = shell.clone();
                Box::pin(async move {
                    let cmd = params["command"].as_str().unwrap_or_default().to_string();
                    match shell.execute(&cmd).await {
                        Ok(result) => Ok(crate::runtime::tool_protocol::ToolResult::success(
                            serde_json::json!({
                                "stdout": result.stdout,
                                "stderr": result.stderr,
                                "exit_code": result.exit_code,
                            }),
                        )),
                        Err(e) => Ok(crate::runtime::tool_protocol::ToolResult::failure(
                            e.to_string(),
                        )),
                    }
                })
            }),
        )
        .await;

    let mut registry = ToolRegistry::empty();
    registry
        .add_protocol("builtin", protocol)
        .await
        .expect("builtin protocol registration never fails");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_registry_exposes_calculator_and_shell() {
        let registry = default_registry().await;
        let names: Vec<&str> = registry.list_tools().iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"calculator"));
        assert!(names.contains(&"shell"));
    }

    #[tokio::test]
    async fn calculator_tool_evaluates_expression() {
        let registry = default_registry().await;
        let result = registry
            .execute_tool("calculator", serde_json::json!({"expression": "2 + 2"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["result"], 4.0);
    }

    #[tokio::test]
    async fn shell_tool_runs_command() {
        let registry = default_registry().await;
        let result = registry
            .execute_tool("shell", serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["stdout"].as_str().unwrap().trim(), "hello");
    }
}
