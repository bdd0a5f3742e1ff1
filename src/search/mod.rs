//! Document index integration.
//!
//! [`SearchIndex`] is the seam between the pipeline and the store. [`SearchService`] speaks the
//! Azure AI Search REST protocol; [`InMemoryIndex`] keeps documents in process for local runs
//! and tests.

pub mod client;
pub mod filters;
pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::models::SearchDocument;

pub use client::SearchService;
pub use filters::{and_all, eq_clause, escape_literal};
pub use memory::InMemoryIndex;
pub use types::{IndexActionResult, SearchError, SearchHit, SearchQuery, SearchResults};

/// Operations the pipeline needs from the document index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Look up a document by key. A missing document is `Ok(None)`, not an error.
    async fn get_document(&self, id: &str) -> Result<Option<SearchDocument>, SearchError>;

    /// Run a relevance search.
    async fn search(&self, query: SearchQuery) -> Result<SearchResults, SearchError>;

    /// Upsert documents as one batch, reporting the outcome per document.
    async fn upload(
        &self,
        documents: Vec<SearchDocument>,
    ) -> Result<Vec<IndexActionResult>, SearchError>;

    /// Delete documents by key as one batch, reporting the outcome per key.
    async fn delete(&self, ids: Vec<String>) -> Result<Vec<IndexActionResult>, SearchError>;

    /// Create the index schema when it does not exist yet.
    async fn ensure_index(&self) -> Result<(), SearchError>;
}
