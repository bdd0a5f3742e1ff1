use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{ChatCompletionClient, CompletionRequest, LlmError};
use crate::config::LlmSettings;

/// Azure OpenAI chat-completions deployment.
pub struct AzureOpenAiClient {
    pub(crate) http: Client,
    pub(crate) endpoint: String,
    pub(crate) api_key: Option<String>,
    pub(crate) deployment: String,
    pub(crate) api_version: String,
}

impl AzureOpenAiClient {
    /// Construct a client for the configured deployment.
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let endpoint = settings
            .openai_endpoint
            .clone()
            .ok_or_else(|| LlmError::NotConfigured("OPENAI_ENDPOINT is not set".into()))?;
        let deployment = settings
            .openai_deployment
            .clone()
            .ok_or_else(|| LlmError::NotConfigured("OPENAI_DEPLOYMENT_NAME is not set".into()))?;
        let http = Client::builder()
            .user_agent("jobdesk/chat")
            .build()
            .map_err(|error| LlmError::ProviderUnavailable(error.to_string()))?;
        tracing::debug!(
            endpoint = %endpoint,
            deployment = %deployment,
            has_api_key = settings.openai_api_key.is_some(),
            "Initialized Azure OpenAI client"
        );

        Ok(Self {
            http,
            endpoint,
            api_key: settings.openai_api_key.clone(),
            deployment,
            api_version: settings.openai_api_version.clone(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatCompletionClient for AzureOpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<String>, LlmError> {
        let payload = json!({
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let mut req = self
            .http
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .json(&payload);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }

        let response = req.send().await.map_err(|error| {
            LlmError::ProviderUnavailable(format!(
                "failed to reach Azure OpenAI at {}: {error}",
                self.endpoint
            ))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "deployment {} not found",
                self.deployment
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "Azure OpenAI returned {status}: {body}"
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        Ok(body
            .choices
            .into_iter()
            .map(|choice| choice.message.content.unwrap_or_default())
            .collect())
    }
}
