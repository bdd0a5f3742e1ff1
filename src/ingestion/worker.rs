//! Queue consumer that turns envelopes into indexed documents.
//!
//! Each delivery moves through Received → PayloadValidated → DedupChecked and ends Indexed,
//! SkippedDuplicate, or Failed. Success completes the message; failure abandons it and leaves
//! attempt counting and dead-lettering to the broker. All per-delivery state lives on the stack
//! of [`IngestionWorker::process`], so one worker can serve many concurrent deliveries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use super::dedup::DuplicateChecker;
use super::indexer::Indexer;
use super::types::{DeliveryReport, DuplicateCheck, IngestionError, WorkerState};
use crate::config::RetryPolicy;
use crate::metrics::PipelineMetrics;
use crate::models::{Envelope, SearchDocument};
use crate::queue::{Delivery, QueueConsumer, Settlement};
use crate::search::SearchIndex;

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Processes queued envelopes into the index.
pub struct IngestionWorker {
    checker: DuplicateChecker,
    indexer: Indexer,
    metrics: Arc<PipelineMetrics>,
}

impl IngestionWorker {
    /// Build a worker over `index`.
    pub fn new(
        index: Arc<dyn SearchIndex>,
        retry: RetryPolicy,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            checker: DuplicateChecker::new(index.clone()),
            indexer: Indexer::new(index, retry),
            metrics,
        }
    }

    /// Run one message body through the pipeline.
    ///
    /// `Ok` means the delivery may be completed, whether the document was indexed or skipped.
    /// `Err` means the delivery must go back to the broker.
    pub async fn process(&self, body: &[u8]) -> Result<DeliveryReport, IngestionError> {
        let envelope = Envelope::from_json(body).inspect_err(|error| {
            tracing::error!(error = %error, "Envelope could not be deserialized");
        })?;
        let envelope_id = envelope.message_id();

        let missing = envelope.payload.missing_required_fields();
        if !missing.is_empty() {
            tracing::error!(
                envelope_id = %envelope_id,
                missing = ?missing,
                "Envelope payload is missing required fields"
            );
            return Err(IngestionError::MissingFields {
                envelope_id,
                fields: missing,
            });
        }

        let document = SearchDocument::from_envelope(&envelope);
        let check = self.checker.check(&document).await;
        let dedup_degraded = matches!(check, DuplicateCheck::CheckFailed { .. });
        if dedup_degraded {
            self.metrics.record_degraded_dedup();
        }

        let state = match check {
            DuplicateCheck::Duplicate(reason) => {
                tracing::info!(
                    envelope_id = %envelope_id,
                    reason = reason.as_str(),
                    "Duplicate job description skipped"
                );
                self.metrics.record_duplicate();
                WorkerState::SkippedDuplicate(reason)
            }
            DuplicateCheck::Unique | DuplicateCheck::CheckFailed { .. } => {
                let receipt = self.indexer.index(&document).await?;
                self.metrics.record_indexed();
                WorkerState::Indexed(receipt)
            }
        };

        Ok(DeliveryReport {
            envelope_id,
            state,
            dedup_degraded,
        })
    }

    /// Process a delivery and decide how to settle it.
    pub async fn handle(&self, delivery: &Delivery) -> Settlement {
        let span = tracing::info_span!(
            "delivery",
            message_id = %delivery.message_id,
            delivery_count = delivery.delivery_count
        );
        match self.process(&delivery.body).instrument(span).await {
            Ok(_) => Settlement::Complete,
            Err(error) => {
                tracing::error!(
                    message_id = %delivery.message_id,
                    delivery_count = delivery.delivery_count,
                    error = %error,
                    "Delivery failed; returning to broker"
                );
                self.metrics.record_failed_delivery();
                Settlement::Abandon
            }
        }
    }

    /// Receive and settle messages until `shutdown` flips to `true`.
    pub async fn run(&self, consumer: Arc<dyn QueueConsumer>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Ingestion worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = consumer.receive() => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(error = %error, "Queue receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let settlement = self.handle(&delivery).await;
            if let Err(error) = consumer.settle(&delivery, settlement).await {
                tracing::warn!(
                    message_id = %delivery.message_id,
                    settlement = ?settlement,
                    error = %error,
                    "Failed to settle delivery"
                );
            }
        }
        tracing::info!("Ingestion worker stopped");
    }
}
