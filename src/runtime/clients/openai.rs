//! OpenAI-compatible chat completions client.
//!
//! Backs three of the five LLM provider variants named in §4.4
//! (`openai-compatible`, `openrouter`, `ollama`) — all three share the same
//! `/chat/completions` wire shape and differ only in default base URL, default
//! model, and whether an API key is required (`ollama` runs locally and needs
//! none). Built on [`crate::runtime::clients::common::send_with_native_tools`]
//! and the shared, connection-pooled `reqwest::Client`, exactly as the
//! teacher's original client did.

use crate::runtime::client_wrapper::{ClientWrapper, Message, TokenUsage, ToolDefinition};
use crate::runtime::clients::common::{get_shared_http_client, send_with_native_tools};
use async_trait::async_trait;
use std::error::Error;
use tokio::sync::Mutex;

/// Official OpenAI model identifiers.
#[allow(non_camel_case_types)]
pub enum Model {
    GPT41,
    GPT41Mini,
    GPT41Nano,
    GPT4o,
    GPt4oMini,
}

pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::GPT41Nano => "gpt-4.1-nano".to_string(),
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPt4oMini => "gpt-4o-mini".to_string(),
    }
}

/// Which of the three OpenAI-wire-compatible variants this client is configured as.
/// Purely descriptive — the wire format and request path are identical; this only
/// changes defaults and whether a missing API key is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAiCompatible,
    OpenRouter,
    Ollama,
}

impl Dialect {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Dialect::OpenAiCompatible => "https://api.openai.com/v1",
            Dialect::OpenRouter => "https://openrouter.ai/api/v1",
            Dialect::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Dialect::Ollama)
    }
}

/// Client for any of the three OpenAI-wire-compatible provider variants.
pub struct OpenAICompatibleClient {
    dialect: Dialect,
    base_url: String,
    api_key: String,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAICompatibleClient {
    /// Construct a client for `dialect`, using its default base URL.
    ///
    /// `api_key` may be empty only for [`Dialect::Ollama`]; any other dialect
    /// with an empty key fails every request with a configuration error at
    /// call time rather than panicking here, matching the teacher's pattern of
    /// deferring provider errors to the request path.
    pub fn new(dialect: Dialect, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(dialect, api_key, model, dialect.default_base_url())
    }

    pub fn with_base_url(
        dialect: Dialect,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            token_usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ClientWrapper for OpenAICompatibleClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error>> {
        if self.dialect.requires_api_key() && self.api_key.is_empty() {
            return Err(format!("{:?}: missing API key", self.dialect).into());
        }

        let result = send_with_native_tools(
            &self.base_url,
            &self.api_key,
            &self.model,
            messages,
            &tools.unwrap_or_default(),
            get_shared_http_client(),
            &self.token_usage,
        )
        .await;

        if let Err(e) = &result {
            log::error!(
                "OpenAICompatibleClient({:?})::send_message: {}",
                self.dialect,
                e
            );
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_does_not_require_an_api_key() {
        assert!(!Dialect::Ollama.requires_api_key());
        assert!(Dialect::OpenAiCompatible.requires_api_key());
        assert!(Dialect::OpenRouter.requires_api_key());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error_not_a_panic() {
        let client = OpenAICompatibleClient::new(Dialect::OpenAiCompatible, "", "gpt-4.1-nano");
        let err = client.send_message(&[], None).await.unwrap_err();
        assert!(err.to_string().contains("missing API key"));
    }
}
