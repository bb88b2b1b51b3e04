//! AI provider contract consumed by agents that need model inference.
//!
//! The orchestration core ships no wire implementation. Concrete providers
//! (hosted APIs, local runtimes) live outside this workspace and are injected
//! into the agents that need them.

use crate::message::AiMessage;
use crate::NexusResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-request generation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Model override; `None` lets the provider pick its default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// A completed chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
}

/// Chat-completion capability.
///
/// Implementations report transport or model failures as
/// [`NexusError::Provider`](crate::NexusError::Provider); agents turn those
/// into failed tasks instead of surfacing them to the orchestrator.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short provider name used in logs and task results.
    fn name(&self) -> &str;

    /// Non-streaming chat completion.
    async fn chat(&self, messages: &[AiMessage], options: &ChatOptions) -> NexusResult<AiResponse>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl AiProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(
            &self,
            messages: &[AiMessage],
            options: &ChatOptions,
        ) -> NexusResult<AiResponse> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(AiResponse {
                content: last,
                model: options.model.clone().unwrap_or_else(|| "echo-1".into()),
                provider: self.name().to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_provider_as_trait_object() {
        let provider: Box<dyn AiProvider> = Box::new(EchoProvider);
        let response = provider
            .chat(&[AiMessage::user("ping")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ping");
        assert_eq!(response.model, "echo-1");
        assert_eq!(response.provider, "echo");
    }

    #[test]
    fn test_chat_options_defaults_from_empty_json() {
        let options: ChatOptions = serde_json::from_str("{}").unwrap();
        assert!(options.model.is_none());
        assert_eq!(options.max_tokens, 1024);
    }
}
