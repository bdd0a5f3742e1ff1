//! Duplicate detection across three identity dimensions.
//!
//! Checks run in order and stop at the first match: document key, then exact title and
//! company, then external-system id. Store failures never block indexing; they surface as
//! [`DuplicateCheck::CheckFailed`] and the document is treated as new.

use std::sync::Arc;

use super::types::{DuplicateCheck, DuplicateReason};
use crate::models::SearchDocument;
use crate::search::{SearchIndex, SearchQuery, and_all, eq_clause};

/// Runs the ordered duplicate checks against an index.
pub struct DuplicateChecker {
    index: Arc<dyn SearchIndex>,
}

impl DuplicateChecker {
    /// Create a checker over `index`.
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Decide whether `document` already exists in the index.
    pub async fn check(&self, document: &SearchDocument) -> DuplicateCheck {
        let mut inconclusive = None;

        match self.index.get_document(&document.id).await {
            Ok(Some(_)) => return DuplicateCheck::Duplicate(DuplicateReason::ExistingId),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    document_id = %document.id,
                    error = %error,
                    "Exact-key lookup failed; continuing with remaining checks"
                );
                inconclusive = Some(DuplicateCheck::failed(&error));
            }
        }

        let content_filter = and_all([
            eq_clause(SearchDocument::TITLE_FIELD, &document.title),
            eq_clause(SearchDocument::COMPANY_FIELD, &document.company),
        ]);
        match self.has_match(content_filter).await {
            Ok(true) => return DuplicateCheck::Duplicate(DuplicateReason::SameTitleAndCompany),
            Ok(false) => {}
            Err(check) => return check,
        }

        if let Some(external_id) = document.external_id() {
            let filter = eq_clause(SearchDocument::WORKDAY_ID_FIELD, external_id);
            match self.has_match(filter).await {
                Ok(true) => return DuplicateCheck::Duplicate(DuplicateReason::SameExternalId),
                Ok(false) => {}
                Err(check) => return check,
            }
        }

        inconclusive.unwrap_or(DuplicateCheck::Unique)
    }

    async fn has_match(&self, filter: String) -> Result<bool, DuplicateCheck> {
        match self.index.search(SearchQuery::filtered(filter.clone(), 1)).await {
            Ok(results) => Ok(results.has_matches()),
            Err(error) => {
                tracing::warn!(
                    filter = %filter,
                    error = %error,
                    "Duplicate check failed; assuming document is new"
                );
                Err(DuplicateCheck::failed(&error))
            }
        }
    }
}
