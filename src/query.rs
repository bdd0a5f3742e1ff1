//! Paged listing and delete-by-id over the index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SearchDocument;
use crate::search::{SearchError, SearchIndex, SearchQuery};

/// Page size used when none (or an out-of-range one) is supplied.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 100;
/// Listing order.
pub const LIST_ORDER: &str = "IngestionTime desc";

/// Errors raised by the query service.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Delete was called with a blank id.
    #[error("Valid job description ID is required")]
    InvalidId,
    /// No document has the requested id.
    #[error("Job description not found: {0}")]
    NotFound(String),
    /// The index rejected the delete.
    #[error("Failed to delete job description {id}: {reason}")]
    DeleteFailed {
        /// Requested document id.
        id: String,
        /// Per-item error messages reported by the index.
        reason: String,
    },
    /// The index could not be reached or answered with an error.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Raw listing parameters as they arrive on the query string.
///
/// Values are parsed leniently: anything unparseable or out of range falls back to the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Requested page size, 1 to 100.
    #[serde(default)]
    pub page_size: Option<String>,
    /// Requested 1-based page number.
    #[serde(default)]
    pub page_number: Option<String>,
    /// Optional free-text search.
    #[serde(default)]
    pub search: Option<String>,
}

impl ListQuery {
    /// Effective page size.
    pub fn page_size(&self) -> usize {
        self.page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Effective page number.
    pub fn page_number(&self) -> usize {
        self.page_number
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|number| *number >= 1)
            .unwrap_or(1)
    }

    /// Effective search text; blank means everything.
    pub fn search_text(&self) -> &str {
        match self.search.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => "*",
        }
    }
}

/// One page of job descriptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult {
    /// Matches across all pages.
    pub total_count: u64,
    /// Effective page size.
    pub page_size: usize,
    /// Effective page number.
    pub page_number: usize,
    /// Documents on this page, newest first.
    pub items: Vec<SearchDocument>,
}

/// Read and delete operations over indexed job descriptions.
pub struct QueryService {
    index: Arc<dyn SearchIndex>,
}

impl QueryService {
    /// Create a service over `index`.
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// List documents ordered by ingestion time, newest first.
    pub async fn list(&self, query: ListQuery) -> Result<PagedResult, QueryError> {
        let page_size = query.page_size();
        let page_number = query.page_number();
        let search = SearchQuery {
            text: query.search_text().to_string(),
            filter: None,
            top: page_size,
            skip: (page_number - 1).saturating_mul(page_size),
            include_total_count: true,
            order_by: Some(LIST_ORDER.to_string()),
        };

        let results = self.index.search(search).await?;
        let items: Vec<SearchDocument> = results.hits.into_iter().map(|hit| hit.document).collect();
        tracing::debug!(page_size, page_number, returned = items.len(), "Listed job descriptions");

        Ok(PagedResult {
            total_count: results.total_count.unwrap_or(items.len() as u64),
            page_size,
            page_number,
            items,
        })
    }

    /// Delete a document by id.
    pub async fn delete(&self, id: &str) -> Result<(), QueryError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(QueryError::InvalidId);
        }
        if self.index.get_document(id).await?.is_none() {
            return Err(QueryError::NotFound(id.to_string()));
        }

        let results = self.index.delete(vec![id.to_string()]).await?;
        let failures: Vec<String> = results
            .into_iter()
            .filter(|result| !result.status)
            .map(|result| result.error_message.unwrap_or_default())
            .collect();
        if failures.is_empty() {
            tracing::info!(document_id = %id, "Job description deleted");
            return Ok(());
        }

        tracing::warn!(document_id = %id, errors = ?failures, "Delete rejected by index");
        if failures
            .iter()
            .any(|message| message.to_lowercase().contains("not found"))
        {
            return Err(QueryError::NotFound(id.to_string()));
        }
        Err(QueryError::DeleteFailed {
            id: id.to_string(),
            reason: failures.join(", "),
        })
    }
}
