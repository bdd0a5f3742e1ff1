use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{ChatCompletionClient, CompletionRequest, LlmError};
use crate::config::LlmSettings;

/// Local Ollama runtime via `/api/chat`.
pub struct OllamaChatClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) model: String,
}

impl OllamaChatClient {
    /// Construct a client for the configured runtime and model.
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("jobdesk/chat")
            .build()
            .map_err(|error| LlmError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: settings.ollama_url.clone(),
            model: settings.ollama_model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ChatCompletionClient for OllamaChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<String>, LlmError> {
        let payload = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;
        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(vec![body.message.content])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptMessage;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> OllamaChatClient {
        OllamaChatClient {
            http: Client::builder()
                .user_agent("jobdesk-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            model: "llama3.1".into(),
        }
    }

    #[tokio::test]
    async fn complete_disables_streaming_and_passes_options() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat").json_body(json!({
                    "model": "llama3.1",
                    "messages": [{ "role": "user", "content": "Hi" }],
                    "stream": false,
                    "options": { "temperature": 0.5, "num_predict": 1000 }
                }));
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "Hello there" },
                    "done": true
                }));
            })
            .await;

        let answers = client(&server)
            .complete(CompletionRequest {
                messages: vec![PromptMessage::user("Hi")],
                max_tokens: 1000,
                temperature: 0.5,
            })
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answers, vec!["Hello there".to_string()]);
    }

    #[tokio::test]
    async fn complete_rejects_incomplete_responses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "Hel" },
                    "done": false
                }));
            })
            .await;

        let error = client(&server)
            .complete(CompletionRequest {
                messages: vec![PromptMessage::user("Hi")],
                max_tokens: 10,
                temperature: 0.5,
            })
            .await
            .expect_err("incomplete");
        assert!(matches!(error, LlmError::InvalidResponse(_)));
    }
}
