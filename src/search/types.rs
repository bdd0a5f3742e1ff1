//! Shared types used by the index clients and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SearchDocument;

/// Errors returned while interacting with the document index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Endpoint failed to parse or normalize.
    #[error("Invalid search endpoint: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected search response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Document could not be encoded for the index.
    #[error("Failed to encode document: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Filter expression could not be interpreted.
    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),
}

/// Parameters for a relevance search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Free text; `*` matches everything.
    pub text: String,
    /// Optional filter expression (`Field eq 'value' and ...`).
    pub filter: Option<String>,
    /// Maximum number of hits to return.
    pub top: usize,
    /// Hits to skip before the first returned one.
    pub skip: usize,
    /// Whether the total match count should be computed.
    pub include_total_count: bool,
    /// Optional ordering clause, e.g. `IngestionTime desc`.
    pub order_by: Option<String>,
}

impl SearchQuery {
    /// Relevance search for `text`, returning at most `top` hits.
    pub fn text(text: impl Into<String>, top: usize) -> Self {
        Self {
            text: text.into(),
            filter: None,
            top,
            skip: 0,
            include_total_count: false,
            order_by: None,
        }
    }

    /// Match-all query narrowed by a filter, with total count requested.
    pub fn filtered(filter: impl Into<String>, top: usize) -> Self {
        Self {
            text: "*".into(),
            filter: Some(filter.into()),
            top,
            skip: 0,
            include_total_count: true,
            order_by: None,
        }
    }
}

/// A document returned by a search together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Relevance score; `0.0` when the index did not report one.
    pub score: f64,
    /// Stored document.
    pub document: SearchDocument,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Total matches across all pages, when requested.
    pub total_count: Option<u64>,
    /// Hits on this page, best first.
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// Whether the index reported at least one match.
    pub fn has_matches(&self) -> bool {
        match self.total_count {
            Some(count) => count > 0,
            None => !self.hits.is_empty(),
        }
    }
}

/// Per-document outcome of a batch write.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexActionResult {
    /// Key of the document the action targeted.
    pub key: String,
    /// Whether the action succeeded.
    pub status: bool,
    /// Error reported for a failed action.
    #[serde(default)]
    pub error_message: Option<String>,
    /// HTTP-like status code for the action.
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl IndexActionResult {
    /// Successful action for `key`.
    pub fn succeeded(key: impl Into<String>, status_code: u16) -> Self {
        Self {
            key: key.into(),
            status: true,
            error_message: None,
            status_code: Some(status_code),
        }
    }

    /// Failed action for `key`.
    pub fn failed(key: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: false,
            error_message: Some(message.into()),
            status_code: Some(status_code),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(rename = "@odata.count", default)]
    pub(crate) count: Option<u64>,
    #[serde(default)]
    pub(crate) value: Vec<RawHit>,
}

#[derive(Deserialize)]
pub(crate) struct RawHit {
    #[serde(rename = "@search.score", default)]
    pub(crate) score: Option<f64>,
    #[serde(flatten)]
    pub(crate) document: SearchDocument,
}

#[derive(Deserialize)]
pub(crate) struct IndexResponse {
    #[serde(default)]
    pub(crate) value: Vec<IndexActionResult>,
}
