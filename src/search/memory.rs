//! Process-local document index.
//!
//! Mirrors the behavior the pipeline relies on from the hosted index: last-write-wins upsert on
//! `Id`, keyword relevance over the searchable fields, conjunctive equality filters, ordering by
//! ingestion time, paging, and total counts.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::SearchIndex;
use super::filters::{EqClause, parse_filter};
use super::types::{IndexActionResult, SearchError, SearchHit, SearchQuery, SearchResults};
use crate::models::SearchDocument;

const TITLE_WEIGHT: f64 = 3.0;
const COMPANY_WEIGHT: f64 = 2.0;
const LOCATION_WEIGHT: f64 = 1.5;
const DESCRIPTION_WEIGHT: f64 = 1.0;

/// In-memory implementation of [`SearchIndex`].
#[derive(Default)]
pub struct InMemoryIndex {
    documents: RwLock<BTreeMap<String, SearchDocument>>,
}

impl InMemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of every stored document, ordered by key.
    pub fn documents(&self) -> Vec<SearchDocument> {
        self.read().values().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, SearchDocument>> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, SearchDocument>> {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn get_document(&self, id: &str) -> Result<Option<SearchDocument>, SearchError> {
        Ok(self.read().get(id).cloned())
    }

    async fn search(&self, query: SearchQuery) -> Result<SearchResults, SearchError> {
        let clauses = match query.filter.as_deref() {
            Some(expression) => parse_filter(expression)?,
            None => Vec::new(),
        };
        let terms = query_terms(&query.text);

        let mut hits: Vec<SearchHit> = self
            .read()
            .values()
            .filter(|document| clauses.iter().all(|clause| matches_clause(document, clause)))
            .filter_map(|document| {
                let score = match &terms {
                    None => 1.0,
                    Some(terms) => relevance(document, terms),
                };
                (score > 0.0).then(|| SearchHit {
                    score,
                    document: document.clone(),
                })
            })
            .collect();

        match query.order_by.as_deref().map(str::trim) {
            Some(order) if order.eq_ignore_ascii_case("IngestionTime desc") => {
                hits.sort_by(|a, b| b.document.ingestion_time.cmp(&a.document.ingestion_time));
            }
            Some(order) if order.eq_ignore_ascii_case("IngestionTime asc") => {
                hits.sort_by(|a, b| a.document.ingestion_time.cmp(&b.document.ingestion_time));
            }
            Some(order) => {
                return Err(SearchError::InvalidFilter(format!(
                    "unsupported orderby clause `{order}`"
                )));
            }
            None => hits.sort_by(|a, b| b.score.total_cmp(&a.score)),
        }

        let total = hits.len() as u64;
        let hits = hits.into_iter().skip(query.skip).take(query.top).collect();
        Ok(SearchResults {
            total_count: query.include_total_count.then_some(total),
            hits,
        })
    }

    async fn upload(
        &self,
        documents: Vec<SearchDocument>,
    ) -> Result<Vec<IndexActionResult>, SearchError> {
        let mut stored = self.write();
        Ok(documents
            .into_iter()
            .map(|document| {
                let key = document.id.clone();
                let status = if stored.insert(key.clone(), document).is_some() {
                    200
                } else {
                    201
                };
                IndexActionResult::succeeded(key, status)
            })
            .collect())
    }

    async fn delete(&self, ids: Vec<String>) -> Result<Vec<IndexActionResult>, SearchError> {
        let mut stored = self.write();
        Ok(ids
            .into_iter()
            .map(|id| {
                if stored.remove(&id).is_some() {
                    IndexActionResult::succeeded(id, 200)
                } else {
                    IndexActionResult::failed(id, 404, "Document not found")
                }
            })
            .collect())
    }

    async fn ensure_index(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Lowercased query terms, or `None` for a match-all query.
fn query_terms(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return None;
    }
    Some(tokenize(trimmed))
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn relevance(document: &SearchDocument, terms: &[String]) -> f64 {
    let fields = [
        (document.title.as_str(), TITLE_WEIGHT),
        (document.company.as_str(), COMPANY_WEIGHT),
        (document.location.as_deref().unwrap_or(""), LOCATION_WEIGHT),
        (document.description.as_str(), DESCRIPTION_WEIGHT),
    ];

    fields
        .iter()
        .map(|(text, weight)| {
            let tokens = tokenize(text);
            let matches = tokens
                .iter()
                .filter(|token| terms.contains(token))
                .count();
            matches as f64 * weight
        })
        .sum()
}

fn matches_clause(document: &SearchDocument, clause: &EqClause) -> bool {
    let value = match clause.field.as_str() {
        "Id" => Some(document.id.as_str()),
        "Title" => Some(document.title.as_str()),
        "Company" => Some(document.company.as_str()),
        "Description" => Some(document.description.as_str()),
        "Location" => document.location.as_deref(),
        "WorkdayId" => document.workday_id.as_deref(),
        _ => None,
    };
    value == Some(clause.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::filters::{and_all, eq_clause};
    use time::macros::datetime;

    fn document(id: &str, title: &str, company: &str) -> SearchDocument {
        SearchDocument {
            id: id.into(),
            title: title.into(),
            company: company.into(),
            description: format!("{title} at {company}"),
            location: Some("Remote".into()),
            posting_date: None,
            workday_id: None,
            ingestion_time: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[tokio::test]
    async fn upload_is_last_write_wins_on_key() {
        let index = InMemoryIndex::new();
        let first = index
            .upload(vec![document("a", "Chef", "Bistro")])
            .await
            .expect("upload");
        let second = index
            .upload(vec![document("a", "Head Chef", "Bistro")])
            .await
            .expect("upload");

        assert_eq!(first[0].status_code, Some(201));
        assert_eq!(second[0].status_code, Some(200));
        assert_eq!(index.len(), 1);
        let stored = index.get_document("a").await.expect("get").expect("doc");
        assert_eq!(stored.title, "Head Chef");
    }

    #[tokio::test]
    async fn filters_match_exact_case_sensitive_values() {
        let index = InMemoryIndex::new();
        index
            .upload(vec![
                document("a", "Barista", "Joe's Coffee"),
                document("b", "barista", "Joe's Coffee"),
            ])
            .await
            .expect("upload");

        let filter = and_all([
            eq_clause("Title", "Barista"),
            eq_clause("Company", "Joe's Coffee"),
        ]);
        let results = index
            .search(SearchQuery::filtered(filter, 1))
            .await
            .expect("search");
        assert_eq!(results.total_count, Some(1));
        assert_eq!(results.hits[0].document.id, "a");
    }

    #[tokio::test]
    async fn keyword_search_ranks_title_matches_first() {
        let index = InMemoryIndex::new();
        let mut described = document("a", "Accountant", "Ledger Co");
        described.description = "Some rust experience is a plus".into();
        index
            .upload(vec![described, document("b", "Rust Developer", "Ferris Inc")])
            .await
            .expect("upload");

        let results = index
            .search(SearchQuery::text("rust", 5))
            .await
            .expect("search");
        let ids: Vec<_> = results.hits.iter().map(|hit| hit.document.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(results.hits[0].score > results.hits[1].score);
        assert!(results.total_count.is_none());
    }

    #[tokio::test]
    async fn paging_orders_by_ingestion_time() {
        let index = InMemoryIndex::new();
        let mut older = document("old", "One", "A");
        older.ingestion_time = datetime!(2024-01-01 0:00 UTC);
        let mut newer = document("new", "Two", "B");
        newer.ingestion_time = datetime!(2024-02-01 0:00 UTC);
        index.upload(vec![older, newer]).await.expect("upload");

        let query = SearchQuery {
            text: "*".into(),
            filter: None,
            top: 1,
            skip: 1,
            include_total_count: true,
            order_by: Some("IngestionTime desc".into()),
        };
        let results = index.search(query).await.expect("search");
        assert_eq!(results.total_count, Some(2));
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].document.id, "old");
    }

    #[tokio::test]
    async fn delete_reports_missing_documents() {
        let index = InMemoryIndex::new();
        index
            .upload(vec![document("a", "Chef", "Bistro")])
            .await
            .expect("upload");

        let results = index
            .delete(vec!["a".into(), "zzz".into()])
            .await
            .expect("delete");
        assert!(results[0].status);
        assert!(!results[1].status);
        assert!(index.is_empty());
    }
}
