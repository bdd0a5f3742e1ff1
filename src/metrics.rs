use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and chat activity.
///
/// Nothing in the pipeline reads these to make a decision; they exist for `GET /metrics`.
#[derive(Default)]
pub struct PipelineMetrics {
    submissions_accepted: AtomicU64,
    documents_indexed: AtomicU64,
    duplicates_skipped: AtomicU64,
    deliveries_failed: AtomicU64,
    dedup_checks_degraded: AtomicU64,
    chat_turns: AtomicU64,
    chat_fallbacks: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission handed to the queue.
    pub fn record_submission(&self) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document written to the index.
    pub fn record_indexed(&self) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivery acknowledged without indexing because it was a duplicate.
    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivery handed back to the broker for retry.
    pub fn record_failed_delivery(&self) {
        self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a duplicate check that failed and was assumed negative.
    pub fn record_degraded_dedup(&self) {
        self.dedup_checks_degraded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered chat turn, noting whether the fallback answer was used.
    pub fn record_chat_turn(&self, fallback: bool) {
        self.chat_turns.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.chat_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            dedup_checks_degraded: self.dedup_checks_degraded.load(Ordering::Relaxed),
            chat_turns: self.chat_turns.load(Ordering::Relaxed),
            chat_fallbacks: self.chat_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Submissions published to the queue since startup.
    pub submissions_accepted: u64,
    /// Documents written to the index.
    pub documents_indexed: u64,
    /// Deliveries skipped as duplicates.
    pub duplicates_skipped: u64,
    /// Deliveries returned to the broker with an error.
    pub deliveries_failed: u64,
    /// Duplicate checks that failed and were treated as "not a duplicate".
    pub dedup_checks_degraded: u64,
    /// Chat turns answered.
    pub chat_turns: u64,
    /// Chat turns answered with the fallback apology.
    pub chat_fallbacks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ingestion_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_submission();
        metrics.record_submission();
        metrics.record_indexed();
        metrics.record_duplicate();
        metrics.record_failed_delivery();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submissions_accepted, 2);
        assert_eq!(snapshot.documents_indexed, 1);
        assert_eq!(snapshot.duplicates_skipped, 1);
        assert_eq!(snapshot.deliveries_failed, 1);
    }

    #[test]
    fn chat_fallbacks_count_towards_turns() {
        let metrics = PipelineMetrics::new();
        metrics.record_chat_turn(false);
        metrics.record_chat_turn(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.chat_turns, 2);
        assert_eq!(snapshot.chat_fallbacks, 1);
    }
}
