//! Result and error types for the ingestion pipeline.

use thiserror::Error;

use crate::search::SearchError;

/// Errors raised by the indexer.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// Every attempt failed.
    #[error("Failed to index document {document_id} after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Key of the document that could not be written.
        document_id: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },
}

/// Errors that end a delivery and hand it back to the broker.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Message body is not a readable envelope.
    #[error("Malformed envelope: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    /// Envelope arrived without required submission fields.
    #[error("Envelope {envelope_id} is missing required fields: {}", fields.join(", "))]
    MissingFields {
        /// Envelope that failed validation.
        envelope_id: String,
        /// Names of the blank fields.
        fields: Vec<&'static str>,
    },
    /// Indexer exhausted its retries.
    #[error(transparent)]
    Indexing(#[from] IndexingError),
}

/// Why a document was considered a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    /// A document with the same key already exists.
    ExistingId,
    /// A document with identical title and company exists.
    SameTitleAndCompany,
    /// A document with the same external-system id exists.
    SameExternalId,
}

impl DuplicateReason {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExistingId => "existing_id",
            Self::SameTitleAndCompany => "same_title_and_company",
            Self::SameExternalId => "same_external_id",
        }
    }
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// No equivalent document found.
    Unique,
    /// An equivalent document already exists.
    Duplicate(DuplicateReason),
    /// The check could not complete; the document is assumed to be new.
    CheckFailed {
        /// Description of the failure.
        error: String,
    },
}

impl DuplicateCheck {
    /// Whether indexing should be skipped.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub(crate) fn failed(error: &SearchError) -> Self {
        Self::CheckFailed {
            error: error.to_string(),
        }
    }
}

/// Proof of a successful index write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReceipt {
    /// Key of the written document.
    pub document_id: String,
    /// Attempt that succeeded, starting at 1.
    pub attempts: u32,
}

/// Terminal state of a delivery that processed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// The document was written to the index.
    Indexed(IndexReceipt),
    /// An equivalent document already existed; nothing was written.
    SkippedDuplicate(DuplicateReason),
}

/// Summary of one successfully processed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Envelope identifier, also the document key.
    pub envelope_id: String,
    /// Final state.
    pub state: WorkerState,
    /// Whether the duplicate check degraded to "assume new".
    pub dedup_degraded: bool,
}
