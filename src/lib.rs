#![deny(missing_docs)]

//! Core library for the jobdesk ingestion pipeline and RAG chat service.

/// HTTP routing and REST handlers.
pub mod api;
/// Retrieval-augmented chat engine.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Queue worker, duplicate detection, and retrying indexer.
pub mod ingestion;
mod http;
/// Chat-completion provider clients.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Shared data types.
pub mod models;
/// Paged listing and delete-by-id.
pub mod query;
/// Queue publisher and broker transports.
pub mod queue;
/// Document index clients.
pub mod search;
/// Submission and chat request validation.
pub mod validation;
