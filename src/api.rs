//! HTTP surface for the job description service.
//!
//! - `POST /jobdescription` – Validate a submission and queue it for indexing. Returns `202` with
//!   the envelope id; indexing happens later in the worker.
//! - `GET /jobdescriptions` – Paged listing (`pageSize`, `pageNumber`, `search`), newest first.
//! - `DELETE /jobdescription/:id` – Remove one document.
//! - `POST /chat` – Ask a question answered from indexed postings.
//! - `GET /hello` – Liveness probe.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::chat::ChatEngine;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::models::{ChatRequest, ChatResponse, SubmissionRequest};
use crate::query::{ListQuery, PagedResult, QueryError, QueryService};
use crate::queue::QueuePublisher;
use crate::validation::{ValidationErrors, validate_chat_request, validate_submission};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handles used by the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Queue publisher for new submissions.
    pub publisher: Arc<QueuePublisher>,
    /// Listing and delete operations.
    pub queries: Arc<QueryService>,
    /// Chat engine.
    pub chat: Arc<ChatEngine>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
}

/// Build the HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/jobdescription", post(submit_job_description))
        .route("/jobdescriptions", get(list_job_descriptions))
        .route("/jobdescription/:id", delete(delete_job_description))
        .route("/chat", post(chat))
        .route("/hello", get(hello))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .with_state(state)
}

/// Response body for an accepted submission.
#[derive(Serialize)]
struct AcceptedResponse {
    id: Uuid,
    message: &'static str,
}

/// Validate a submission and hand it to the queue.
async fn submit_job_description(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    let request: SubmissionRequest = parse_body(&body)?;
    let submission = validate_submission(request).inspect_err(|errors| {
        tracing::warn!(errors = %errors, "Job description submission rejected");
    })?;

    let id = state.publisher.publish(submission).await.map_err(|error| {
        tracing::error!(error = %error, "Failed to queue job description");
        AppError::Internal
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            id,
            message: "Job description accepted for processing",
        }),
    ))
}

async fn list_job_descriptions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PagedResult>, AppError> {
    Ok(Json(state.queries.list(query).await?))
}

async fn delete_job_description(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.queries.delete(&id).await?;
    Ok(Json(json!({ "message": "Job description deleted successfully" })))
}

/// Answer a question. Once the request validates, this always returns `200`.
async fn chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, AppError> {
    let request: ChatRequest = parse_body(&body)?;
    let request = validate_chat_request(request)?;
    let outcome = state.chat.chat(&request.message, &request.history).await;
    Ok(Json(outcome.into()))
}

async fn hello() -> &'static str {
    "hello"
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "submit_job_description",
                method: "POST",
                path: "/jobdescription",
                description: "Validate a job description and queue it for indexing. Responds 202 with { \"id\": uuid, \"message\": string }.",
                request_example: Some(json!({
                    "title": "Senior Rust Engineer",
                    "company": "Contoso",
                    "description": "Build and operate ingestion services.",
                    "location": "Remote",
                    "postingDate": "2024-06-01T00:00:00Z",
                    "workdayId": "JR-1024"
                })),
            },
            CommandDescriptor {
                name: "list_job_descriptions",
                method: "GET",
                path: "/jobdescriptions",
                description: "Page through indexed job descriptions, newest first. Query parameters: pageSize (1-100), pageNumber, search.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_job_description",
                method: "DELETE",
                path: "/jobdescription/{id}",
                description: "Delete one indexed job description by id. Responds 404 when it does not exist.",
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat",
                description: "Ask a question answered from indexed job descriptions. Returns the answer, cited sources, and a conversation id.",
                request_example: Some(json!({
                    "message": "Which remote roles need Rust?",
                    "history": [
                        { "role": "user", "content": "Hi" },
                        { "role": "assistant", "content": "Hello! Ask me about open roles." }
                    ]
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and chat counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("Request body is required"));
    }
    serde_json::from_slice(body).map_err(|error| {
        tracing::warn!(error = %error, "Rejected malformed JSON body");
        AppError::BadRequest("Invalid JSON format")
    })
}

enum AppError {
    Validation(ValidationErrors),
    BadRequest(&'static str),
    NotFound,
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "errors": errors.into_messages() })),
            )
                .into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Job description not found" })),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<QueryError> for AppError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::InvalidId => Self::BadRequest("Valid job description ID is required"),
            QueryError::NotFound(_) => Self::NotFound,
            other => {
                tracing::error!(error = %other, "Query request failed");
                Self::Internal
            }
        }
    }
}
