//! Queue envelope wrapping a submission with its identity.
//!
//! The envelope id is the idempotency anchor for the whole pipeline: it is the transport-level
//! message id, and downstream it becomes the search document's primary key, so every redelivery
//! of the same envelope resolves to the same document.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::submission::Submission;

/// Identity-and-timestamp wrapper around a submission in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Randomly generated identifier, reused as the document key.
    #[serde(alias = "Id")]
    pub id: Uuid,
    /// Creation time of the envelope.
    #[serde(alias = "Timestamp", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Submitted job posting.
    #[serde(default, alias = "Payload")]
    pub payload: Submission,
}

impl Envelope {
    /// Wrap a submission with a fresh v4 identifier and the current time.
    pub fn wrap(payload: Submission) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: OffsetDateTime::now_utc(),
            payload,
        }
    }

    /// Transport-level message id (string form of the envelope id).
    pub fn message_id(&self) -> String {
        self.id.to_string()
    }

    /// Serialize the envelope into the queue message body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a queue message body.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
