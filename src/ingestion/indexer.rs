//! Single-document upsert with bounded retry.

use std::sync::Arc;

use super::types::{IndexReceipt, IndexingError};
use crate::config::RetryPolicy;
use crate::models::SearchDocument;
use crate::search::{IndexActionResult, SearchIndex};

/// Writes documents to the index, retrying failed batches with exponential backoff.
pub struct Indexer {
    index: Arc<dyn SearchIndex>,
    policy: RetryPolicy,
}

impl Indexer {
    /// Create an indexer with the given retry policy.
    pub fn new(index: Arc<dyn SearchIndex>, policy: RetryPolicy) -> Self {
        Self { index, policy }
    }

    /// Upsert `document`, succeeding only when every action in the batch reports success.
    ///
    /// Sleeps `initial_backoff * 2^(n-1)` after failed attempt `n`; no sleep follows the last
    /// attempt.
    pub async fn index(&self, document: &SearchDocument) -> Result<IndexReceipt, IndexingError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.index.upload(vec![document.clone()]).await {
                Ok(results) if all_succeeded(&results) => {
                    tracing::info!(document_id = %document.id, attempt, "Document indexed");
                    return Ok(IndexReceipt {
                        document_id: document.id.clone(),
                        attempts: attempt,
                    });
                }
                Ok(results) => {
                    last_error = describe_failures(&results);
                }
                Err(error) => {
                    last_error = error.to_string();
                }
            }

            tracing::warn!(
                document_id = %document.id,
                attempt,
                max_attempts,
                error = %last_error,
                "Index attempt failed"
            );
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff_for(attempt)).await;
            }
        }

        tracing::error!(
            document_id = %document.id,
            attempts = max_attempts,
            error = %last_error,
            "Indexing retries exhausted"
        );
        Err(IndexingError::Exhausted {
            document_id: document.id.clone(),
            attempts: max_attempts,
            last_error,
        })
    }
}

/// An empty result set is not success: the store acknowledged nothing.
fn all_succeeded(results: &[IndexActionResult]) -> bool {
    !results.is_empty() && results.iter().all(|result| result.status)
}

fn describe_failures(results: &[IndexActionResult]) -> String {
    if results.is_empty() {
        return "index returned no per-document results".to_string();
    }
    results
        .iter()
        .filter(|result| !result.status)
        .map(|result| {
            format!(
                "{}: {}",
                result.key,
                result.error_message.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{InMemoryIndex, SearchError, SearchQuery, SearchResults};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use time::macros::datetime;

    fn document() -> SearchDocument {
        SearchDocument {
            id: "doc-1".into(),
            title: "Welder".into(),
            company: "Forge".into(),
            description: "Join metal.".into(),
            location: None,
            posting_date: None,
            workday_id: None,
            ingestion_time: datetime!(2024-05-01 9:00 UTC),
        }
    }

    /// Fails the first `failures` uploads, alternating transport and per-item failures.
    struct FlakyIndex {
        failures: u32,
        calls: AtomicU32,
        inner: InMemoryIndex,
    }

    impl FlakyIndex {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                inner: InMemoryIndex::new(),
            }
        }
    }

    #[async_trait]
    impl SearchIndex for FlakyIndex {
        async fn get_document(&self, id: &str) -> Result<Option<SearchDocument>, SearchError> {
            self.inner.get_document(id).await
        }

        async fn search(&self, query: SearchQuery) -> Result<SearchResults, SearchError> {
            self.inner.search(query).await
        }

        async fn upload(
            &self,
            documents: Vec<SearchDocument>,
        ) -> Result<Vec<IndexActionResult>, SearchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                if call % 2 == 1 {
                    return Err(SearchError::InvalidUrl("connection reset".into()));
                }
                return Ok(documents
                    .into_iter()
                    .map(|document| IndexActionResult::failed(document.id, 503, "throttled"))
                    .collect());
            }
            self.inner.upload(documents).await
        }

        async fn delete(&self, ids: Vec<String>) -> Result<Vec<IndexActionResult>, SearchError> {
            self.inner.delete(ids).await
        }

        async fn ensure_index(&self) -> Result<(), SearchError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_backoff() {
        let index = Arc::new(FlakyIndex::new(2));
        let indexer = Indexer::new(index.clone(), RetryPolicy::default());

        let started = tokio::time::Instant::now();
        let receipt = indexer.index(&document()).await.expect("indexed");

        assert_eq!(receipt.attempts, 3);
        assert_eq!(receipt.document_id, "doc-1");
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(index.inner.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exactly_three_attempts() {
        let index = Arc::new(FlakyIndex::new(u32::MAX));
        let indexer = Indexer::new(index.clone(), RetryPolicy::default());

        let error = indexer.index(&document()).await.expect_err("exhausted");

        assert_eq!(index.calls.load(Ordering::SeqCst), 3);
        let IndexingError::Exhausted {
            document_id,
            attempts,
            ..
        } = error;
        assert_eq!(document_id, "doc-1");
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_does_not_sleep() {
        let index = Arc::new(FlakyIndex::new(0));
        let indexer = Indexer::new(index, RetryPolicy::default());

        let started = tokio::time::Instant::now();
        let receipt = indexer.index(&document()).await.expect("indexed");
        assert_eq!(receipt.attempts, 1);
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[test]
    fn empty_batch_results_are_failures() {
        assert!(!all_succeeded(&[]));
        assert!(all_succeeded(&[IndexActionResult::succeeded("a", 201)]));
        assert!(!all_succeeded(&[
            IndexActionResult::succeeded("a", 201),
            IndexActionResult::failed("b", 500, "boom"),
        ]));
    }
}
