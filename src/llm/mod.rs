//! Chat-completion providers used by the RAG engine.
//!
//! Both clients talk to their runtime over plain HTTP. The engine only sees
//! [`ChatCompletionClient`], so providers can be swapped via `LLM_PROVIDER`.

mod azure;
mod ollama;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::{LlmProvider, LlmSettings};

pub use azure::AzureOpenAiClient;
pub use ollama::OllamaChatClient;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Required provider settings are absent.
    #[error("Language model provider not configured: {0}")]
    NotConfigured(String),
    /// Provider could not be reached.
    #[error("Language model provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// Instructions framing the conversation.
    System,
    /// End-user text.
    User,
    /// Prior model output.
    Assistant,
}

/// One role-tagged message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Speaker.
    pub role: PromptRole,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request handed to a completion provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Ordered conversation, system prompt first.
    pub messages: Vec<PromptMessage>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Return candidate completions in provider order. An empty list is a valid answer.
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<String>, LlmError>;
}

/// Build the completion client selected by configuration.
pub fn build_chat_client(
    settings: &LlmSettings,
) -> Result<Arc<dyn ChatCompletionClient>, LlmError> {
    match settings.provider {
        LlmProvider::AzureOpenAi => Ok(Arc::new(AzureOpenAiClient::new(settings)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaChatClient::new(settings)?)),
    }
}
