//! Data types shared by the intake, ingestion, query, and chat paths.

/// Chat turns, requests, and cited sources.
pub mod chat;
/// Index record for a job description.
pub mod document;
pub mod envelope;
/// Raw and validated job submissions.
pub mod submission;

pub use chat::{ChatRequest, ChatResponse, ChatRole, ChatTurn, DocumentSource};
pub use document::SearchDocument;
pub use envelope::Envelope;
pub use submission::{Submission, SubmissionRequest};
