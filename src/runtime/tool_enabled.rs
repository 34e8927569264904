//! Tool-loop coordination over any [`ClientWrapper`] (§4.5).
//!
//! Grounded in the teacher's `Agent::send` tool loop: call the provider,
//! detect tool calls — native function-calling results or `<tool_use>`-style
//! text blocks — execute them via the tool registry, loop until the provider
//! stops requesting tools or a turn cap is hit. `ToolEnabledLlm` decorates an
//! `Arc<dyn ClientWrapper>` and implements the same trait, so callers cannot
//! distinguish a tool-enabled provider from a bare one.

use crate::runtime::client_wrapper::{ClientWrapper, Message, NativeToolCall, Role, TokenUsage, ToolDefinition};
use crate::runtime::tool_call_parser::{parse_tool_calls, resolve_tool_name};
use crate::runtime::tool_protocol::ToolRegistry;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_MAX_TURNS: u32 = 8;

/// Wraps a provider with tool-loop coordination. Implements [`ClientWrapper`]
/// itself, so it composes transparently with [`crate::runtime::agent::Agent`].
pub struct ToolEnabledLlm {
    inner: Arc<dyn ClientWrapper>,
    registry: Arc<ToolRegistry>,
    max_turns: u32,
    aggregated_usage: Mutex<Option<TokenUsage>>,
}

impl ToolEnabledLlm {
    pub fn new(inner: Arc<dyn ClientWrapper>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            inner,
            registry,
            max_turns: DEFAULT_MAX_TURNS,
            aggregated_usage: Mutex::new(None),
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .list_tools()
            .into_iter()
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters_schema: t.parameters_schema(),
            })
            .collect()
    }

    async fn accumulate_usage(&self) {
        if let Some(turn_usage) = self.inner.get_last_usage().await {
            let mut slot = self.aggregated_usage.lock().await;
            *slot = Some(match slot.take() {
                None => turn_usage,
                Some(acc) => TokenUsage {
                    input_tokens: acc.input_tokens + turn_usage.input_tokens,
                    output_tokens: acc.output_tokens + turn_usage.output_tokens,
                    total_tokens: acc.total_tokens + turn_usage.total_tokens,
                },
            });
        }
    }

    async fn execute_tool_call(&self, name: &str, arguments: serde_json::Value) -> String {
        let known: Vec<&str> = self.registry.list_tools().iter().map(|t| t.name.as_str()).collect();
        let resolved = resolve_tool_name(name, &known);
        let Some(resolved) = resolved else {
            return format!("Error: unknown tool '{}'", name);
        };
        match self.registry.execute_tool(resolved, arguments).await {
            Ok(result) if result.success => {
                serde_json::to_string(&result.output).unwrap_or_else(|_| result.output.to_string())
            }
            Ok(result) => format!("Error: {}", result.error.unwrap_or_else(|| "tool failed".to_string())),
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Native tool-calling loop: call the provider, execute any native tool
    /// calls it returns, append tool-role messages, repeat until a
    /// tool-call-free response or `max_turns` is reached.
    async fn run_native_loop(&self, seed_messages: &[Message]) -> Result<Message, Box<dyn Error>> {
        let mut history: Vec<Message> = seed_messages.to_vec();
        let tools = self.tool_definitions();

        for turn in 0..self.max_turns {
            let response = self.inner.send_message(&history, Some(tools.clone())).await?;
            self.accumulate_usage().await;

            if response.tool_calls.is_empty() {
                return Ok(response);
            }

            log::info!(
                "tool-enabled loop turn {}/{}: executing {} native tool call(s)",
                turn + 1,
                self.max_turns,
                response.tool_calls.len()
            );

            let outputs = futures_util::future::join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|tc| self.execute_tool_call(&tc.name, tc.arguments.clone())),
            )
            .await;

            history.push(response.clone());
            for (tc, output) in response.tool_calls.iter().zip(outputs) {
                history.push(Message {
                    role: Role::Tool { call_id: tc.id.clone() },
                    content: Arc::from(output.as_str()),
                    tool_calls: vec![],
                });
            }
        }

        Err(format!("tool-enabled loop exceeded max_turns ({})", self.max_turns).into())
    }

    /// Text-block fallback path: scan the assistant's raw content for
    /// `<tool_use>`/bare-object tool invocations, execute them in place, and
    /// splice `**Tool: <name>**\n<output>` over each recognised block. No
    /// second provider call is made.
    async fn run_text_block_path(&self, response: Message) -> Message {
        let calls = parse_tool_calls(&response.content);
        if calls.is_empty() {
            return response;
        }

        log::info!("tool-enabled loop: executing {} text-block tool call(s)", calls.len());

        let mut content = response.content.to_string();
        for call in calls {
            let output = self.execute_tool_call(&call.name, call.arguments).await;
            let replacement = format!("**Tool: {}**\n{}", call.name, output);
            content = splice_first_tool_use_block(&content, &replacement);
        }

        Message {
            role: response.role,
            content: Arc::from(content.as_str()),
            tool_calls: response.tool_calls,
        }
    }
}

/// Replace the first `<tool_use>...</tool_use>` block in `content` with
/// `replacement`; if no such block is present the content is returned
/// unchanged (the call came from a bare-object dialect instead).
fn splice_first_tool_use_block(content: &str, replacement: &str) -> String {
    if let Some(start) = content.find("<tool_use>") {
        if let Some(end_rel) = content[start..].find("</tool_use>") {
            let end = start + end_rel + "</tool_use>".len();
            return format!("{}{}{}", &content[..start], replacement, &content[end..]);
        }
    }
    content.to_string()
}

#[async_trait]
impl ClientWrapper for ToolEnabledLlm {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error>> {
        if self.registry.list_tools().is_empty() {
            let response = self.inner.send_message(messages, None).await?;
            self.accumulate_usage().await;
            return Ok(response);
        }

        let response = self.run_native_loop(messages).await?;
        if !response.tool_calls.is_empty() {
            return Ok(response);
        }
        Ok(self.run_text_block_path(response).await)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        self.aggregated_usage.lock().await.clone()
    }
}
