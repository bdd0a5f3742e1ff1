use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::envelope::Envelope;

/// Canonical denormalized record stored in the document index.
///
/// Field names follow the index schema (`Id`, `Title`, ...). Uniqueness per envelope id,
/// per (title, company) pair, and per external id is enforced by the duplicate checker, not by
/// the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchDocument {
    /// Primary key: string form of the envelope id.
    pub id: String,
    /// Job title (searchable, filterable).
    #[serde(default)]
    pub title: String,
    /// Company name (searchable, filterable).
    #[serde(default)]
    pub company: String,
    /// Full description (searchable).
    #[serde(default)]
    pub description: String,
    /// Location (searchable, filterable).
    #[serde(default)]
    pub location: Option<String>,
    /// Original posting date (filterable, sortable).
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub posting_date: Option<OffsetDateTime>,
    /// Identifier from the upstream HR system, used for cross-system dedup.
    #[serde(default)]
    pub workday_id: Option<String>,
    /// When the indexer built this document.
    #[serde(with = "time::serde::rfc3339")]
    pub ingestion_time: OffsetDateTime,
}

impl SearchDocument {
    /// Key field name in the index schema.
    pub const KEY_FIELD: &'static str = "Id";
    /// Title field name.
    pub const TITLE_FIELD: &'static str = "Title";
    /// Company field name.
    pub const COMPANY_FIELD: &'static str = "Company";
    /// External-system id field name.
    pub const WORKDAY_ID_FIELD: &'static str = "WorkdayId";
    /// Ingestion timestamp field name.
    pub const INGESTION_TIME_FIELD: &'static str = "IngestionTime";

    /// Build the document for an envelope, stamping the ingestion time now.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let payload = &envelope.payload;
        Self {
            id: envelope.message_id(),
            title: payload.title.clone(),
            company: payload.company.clone(),
            description: payload.description.clone(),
            location: payload.location.clone(),
            posting_date: payload.posting_date,
            workday_id: payload.workday_id.clone(),
            ingestion_time: OffsetDateTime::now_utc(),
        }
    }

    /// External id when present and non-blank.
    pub fn external_id(&self) -> Option<&str> {
        self.workday_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
    }
}
