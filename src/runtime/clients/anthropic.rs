//! Native Anthropic Messages API client.
//!
//! Backs the `anthropic` and `anthropic-with-cache` provider variants (§4.4).
//! Unlike [`crate::runtime::clients::openai::OpenAICompatibleClient`], which the
//! teacher's original client proxied Claude through, this talks to
//! `POST /v1/messages` directly: the system message travels out-of-band in a
//! top-level `system` field rather than inline in the `messages` array, tools
//! use the `input_schema` dialect instead of `function.parameters`, and
//! `anthropic-with-cache` attaches a `cache_control` breakpoint to the system
//! block and the last message so the provider can reuse cached prefix tokens.
//!
//! Built on the same pooled [`reqwest::Client`] and `Mutex<Option<TokenUsage>>`
//! bookkeeping pattern as [`crate::runtime::clients::openai`], since no crate in
//! the retrieved pack wraps the native Anthropic API.

use crate::runtime::client_wrapper::{
    ClientWrapper, Message, NativeToolCall, Role, TokenUsage, ToolDefinition,
};
use crate::runtime::clients::common::get_shared_http_client;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[allow(non_camel_case_types)]
pub enum Model {
    Claude45Sonnet,
    Claude45Haiku,
}

pub fn model_to_string(model: Model) -> String {
    match model {
        Model::Claude45Sonnet => "claude-sonnet-4-5".to_string(),
        Model::Claude45Haiku => "claude-haiku-4-5".to_string(),
    }
}

pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    model: String,
    /// When true, attaches `cache_control: {"type": "ephemeral"}` to the system
    /// block and to the last message, implementing the `anthropic-with-cache`
    /// variant; when false, implements plain `anthropic`.
    with_cache: bool,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, with_cache: bool) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            with_cache,
            token_usage: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn cache_control(&self) -> Option<serde_json::Value> {
        self.with_cache.then(|| serde_json::json!({ "type": "ephemeral" }))
    }
}

#[async_trait]
impl ClientWrapper for AnthropicClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error>> {
        if self.api_key.is_empty() {
            return Err("AnthropicClient: missing API key".into());
        }

        // Split the system message out-of-band; Anthropic's wire format has no
        // `system` role inside `messages`.
        let system_content = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.as_ref().to_string());

        let non_system: Vec<&Message> = messages.iter().filter(|m| !matches!(m.role, Role::System)).collect();

        let wire_messages: Vec<serde_json::Value> = non_system
            .iter()
            .enumerate()
            .map(|(i, m)| self.message_to_wire(m, i == non_system.len().saturating_sub(1)))
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "messages": wire_messages,
        });

        if let Some(system) = system_content {
            body["system"] = match self.cache_control() {
                Some(cc) => serde_json::json!([{ "type": "text", "text": system, "cache_control": cc }]),
                None => serde_json::Value::String(system),
            };
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = serde_json::Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters_schema,
                        })
                    })
                    .collect(),
            );
        }

        let url = format!("{}/messages", self.base_url);
        let resp = get_shared_http_client()
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| -> Box<dyn Error> { Box::new(e) })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| -> Box<dyn Error> { Box::new(e) })?;

        if !status.is_success() {
            let truncated: String = text.chars().take(500).collect();
            log::error!("AnthropicClient: HTTP {} from {}: {}", status, url, truncated);
            return Err(format!("anthropic: HTTP {} — {}", status, truncated).into());
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| -> Box<dyn Error> { Box::new(e) })?;

        if let Some(usage) = parsed.get("usage") {
            let input = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let output = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            *self.token_usage.lock().await = Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: input + output,
            });
        }

        let content_blocks = parsed
            .get("content")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();

        let text_content: String = content_blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        let tool_calls: Vec<NativeToolCall> = content_blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
            .filter_map(|b| {
                Some(NativeToolCall {
                    id: b.get("id")?.as_str()?.to_string(),
                    name: b.get("name")?.as_str()?.to_string(),
                    arguments: b.get("input").cloned().unwrap_or(serde_json::json!({})),
                })
            })
            .collect();

        Ok(Message {
            role: Role::Assistant,
            content: Arc::from(text_content.as_str()),
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

impl AnthropicClient {
    fn message_to_wire(&self, msg: &Message, is_last: bool) -> serde_json::Value {
        let role = match &msg.role {
            Role::User | Role::Tool { .. } => "user",
            Role::Assistant => "assistant",
            Role::System => unreachable!("system messages are split out before this point"),
        };

        let content = match &msg.role {
            Role::Tool { call_id } => serde_json::json!([{
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": msg.content.as_ref(),
            }]),
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(serde_json::json!({ "type": "text", "text": msg.content.as_ref() }));
                }
                for tc in &msg.tool_calls {
                    blocks.push(serde_json::json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.arguments,
                    }));
                }
                serde_json::Value::Array(blocks)
            }
            _ => serde_json::Value::String(msg.content.as_ref().to_string()),
        };

        let mut wire = serde_json::json!({ "role": role, "content": content });
        if is_last {
            if let Some(cc) = self.cache_control() {
                if let Some(arr) = wire["content"].as_array_mut() {
                    if let Some(last) = arr.last_mut() {
                        last["cache_control"] = cc;
                    }
                } else {
                    let text = wire["content"].as_str().unwrap_or_default().to_string();
                    wire["content"] = serde_json::json!([{ "type": "text", "text": text, "cache_control": cc }]);
                }
            }
        }
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_match_anthropic_identifiers() {
        assert_eq!(model_to_string(Model::Claude45Sonnet), "claude-sonnet-4-5");
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let client = AnthropicClient::new("", "claude-sonnet-4-5", false);
        let err = client.send_message(&[], None).await.unwrap_err();
        assert!(err.to_string().contains("missing API key"));
    }

    #[test]
    fn tool_message_becomes_tool_result_block() {
        let client = AnthropicClient::new("key", "claude-sonnet-4-5", false);
        let msg = Message {
            role: Role::Tool { call_id: "call_1".into() },
            content: Arc::from("4"),
            tool_calls: vec![],
        };
        let wire = client.message_to_wire(&msg, false);
        assert_eq!(wire["content"][0]["type"], "tool_result");
        assert_eq!(wire["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn cache_variant_attaches_cache_control_to_last_message() {
        let client = AnthropicClient::new("key", "claude-sonnet-4-5", true);
        let msg = Message {
            role: Role::User,
            content: Arc::from("hi"),
            tool_calls: vec![],
        };
        let wire = client.message_to_wire(&msg, true);
        assert_eq!(wire["content"][0]["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn plain_variant_has_no_cache_control() {
        let client = AnthropicClient::new("key", "claude-sonnet-4-5", false);
        let msg = Message {
            role: Role::User,
            content: Arc::from("hi"),
            tool_calls: vec![],
        };
        let wire = client.message_to_wire(&msg, true);
        assert_eq!(wire["content"], "hi");
    }
}
