//! Retrieve, ground, compose, generate.

use std::sync::Arc;

use uuid::Uuid;

use super::prompt::{FALLBACK_ANSWER, build_context, compose_messages, truncate_excerpt};
use crate::llm::{ChatCompletionClient, CompletionRequest, LlmError};
use crate::metrics::PipelineMetrics;
use crate::models::{ChatResponse, ChatTurn, DocumentSource};
use crate::search::{SearchHit, SearchIndex, SearchQuery};

/// Retrieval results per question.
pub const TOP_K: usize = 5;
/// Output budget for each generation.
pub const MAX_TOKENS: u32 = 1000;
/// Sampling temperature for each generation.
pub const TEMPERATURE: f32 = 0.7;

/// How retrieval went for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStatus {
    /// Search ran; sources may still be empty.
    Retrieved,
    /// Search failed and the turn continued with no sources.
    Unavailable {
        /// Description of the failure.
        error: String,
    },
}

/// How generation went for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    /// The model produced the answer.
    Generated,
    /// The model call failed and the fallback answer was used.
    Fallback {
        /// Description of the failure.
        error: String,
    },
}

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Answer text.
    pub answer: String,
    /// Documents retrieved for the question, best first.
    pub sources: Vec<DocumentSource>,
    /// Fresh identifier for this turn, also used as the log correlation id.
    pub turn_id: String,
    /// Retrieval path taken.
    pub retrieval: RetrievalStatus,
    /// Generation path taken.
    pub generation: GenerationStatus,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            response: outcome.answer,
            sources: outcome.sources,
            conversation_id: outcome.turn_id,
        }
    }
}

/// Answers questions from indexed job descriptions.
pub struct ChatEngine {
    index: Arc<dyn SearchIndex>,
    llm: Arc<dyn ChatCompletionClient>,
    metrics: Arc<PipelineMetrics>,
}

impl ChatEngine {
    /// Create an engine over an index and a completion client.
    pub fn new(
        index: Arc<dyn SearchIndex>,
        llm: Arc<dyn ChatCompletionClient>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            index,
            llm,
            metrics,
        }
    }

    /// Answer `question` in the context of `history`. Never fails.
    pub async fn chat(&self, question: &str, history: &[ChatTurn]) -> ChatOutcome {
        let turn_id = Uuid::new_v4().to_string();
        tracing::info!(correlation_id = %turn_id, "Processing chat request");

        let (sources, retrieval) = self.retrieve(question, &turn_id).await;
        let context = build_context(&sources);
        let request = CompletionRequest {
            messages: compose_messages(question, history, &context),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let (answer, generation) = match self.generate(request).await {
            Ok(answer) => {
                tracing::info!(correlation_id = %turn_id, "Generated chat response");
                (answer, GenerationStatus::Generated)
            }
            Err(error) => {
                tracing::error!(
                    correlation_id = %turn_id,
                    error = %error,
                    "Chat generation failed; using fallback answer"
                );
                (
                    FALLBACK_ANSWER.to_string(),
                    GenerationStatus::Fallback {
                        error: error.to_string(),
                    },
                )
            }
        };
        self.metrics
            .record_chat_turn(matches!(generation, GenerationStatus::Fallback { .. }));

        ChatOutcome {
            answer,
            sources,
            turn_id,
            retrieval,
            generation,
        }
    }

    async fn retrieve(&self, question: &str, turn_id: &str) -> (Vec<DocumentSource>, RetrievalStatus) {
        match self.index.search(SearchQuery::text(question, TOP_K)).await {
            Ok(results) => {
                let sources: Vec<_> = results
                    .hits
                    .into_iter()
                    .take(TOP_K)
                    .map(to_source)
                    .collect();
                tracing::info!(
                    correlation_id = %turn_id,
                    count = sources.len(),
                    "Found relevant job descriptions"
                );
                (sources, RetrievalStatus::Retrieved)
            }
            Err(error) => {
                tracing::error!(
                    correlation_id = %turn_id,
                    error = %error,
                    "Job description search failed; continuing without sources"
                );
                (
                    Vec::new(),
                    RetrievalStatus::Unavailable {
                        error: error.to_string(),
                    },
                )
            }
        }
    }

    async fn generate(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.llm
            .complete(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no completions returned".into()))
    }
}

fn to_source(hit: SearchHit) -> DocumentSource {
    let document = hit.document;
    DocumentSource {
        excerpt: truncate_excerpt(&document.description),
        id: document.id,
        title: document.title,
        company: document.company,
        location: document.location.unwrap_or_default(),
        score: hit.score,
    }
}
