use std::sync::Arc;
use std::time::Duration;

use jobdesk::config::RetryPolicy;
use jobdesk::ingestion::{DuplicateReason, IngestionWorker, WorkerState};
use jobdesk::metrics::PipelineMetrics;
use jobdesk::models::{Envelope, Submission};
use jobdesk::queue::{
    InMemoryQueue, OutboundMessage, QueueConsumer, QueuePublisher, QueueTransport, Settlement,
};
use jobdesk::search::{InMemoryIndex, SearchIndex};

struct Pipeline {
    queue: Arc<InMemoryQueue>,
    index: Arc<InMemoryIndex>,
    publisher: QueuePublisher,
    worker: IngestionWorker,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    fn new(max_delivery_count: u32) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        let queue = Arc::new(InMemoryQueue::new(
            max_delivery_count,
            Duration::from_millis(10),
        ));
        let index = Arc::new(InMemoryIndex::new());
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        };
        Self {
            publisher: QueuePublisher::new(queue.clone(), metrics.clone()),
            worker: IngestionWorker::new(index.clone(), retry, metrics.clone()),
            queue,
            index,
            metrics,
        }
    }

    /// Receive and settle until the queue is idle, returning each settlement in order.
    async fn drain(&self) -> Vec<Settlement> {
        let mut settlements = Vec::new();
        while let Some(delivery) = self.queue.receive().await.expect("receive") {
            let settlement = self.worker.handle(&delivery).await;
            self.queue
                .settle(&delivery, settlement)
                .await
                .expect("settle");
            settlements.push(settlement);
        }
        settlements
    }
}

fn submission(title: &str, company: &str, workday_id: Option<&str>) -> Submission {
    Submission {
        title: title.into(),
        company: company.into(),
        description: format!("{title} wanted at {company}."),
        location: Some("Lisbon".into()),
        posting_date: None,
        workday_id: workday_id.map(str::to_string),
    }
}

#[tokio::test]
async fn published_submission_becomes_one_document_keyed_by_envelope_id() {
    let pipeline = Pipeline::new(5);
    let id = pipeline
        .publisher
        .publish(submission("Site Engineer", "Bridgeworks", None))
        .await
        .expect("publish");

    assert_eq!(pipeline.drain().await, vec![Settlement::Complete]);

    let documents = pipeline.index.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, id.to_string());
    assert_eq!(documents[0].location.as_deref(), Some("Lisbon"));
    assert_eq!(pipeline.metrics.snapshot().documents_indexed, 1);
}

#[tokio::test]
async fn redelivered_envelope_is_skipped_by_key() {
    let pipeline = Pipeline::new(5);
    let envelope = Envelope::wrap(submission("Site Engineer", "Bridgeworks", None));
    let body = envelope.to_json().expect("json");

    let first = pipeline.worker.process(body.as_bytes()).await.expect("first");
    assert!(matches!(first.state, WorkerState::Indexed(_)));

    pipeline.queue.redeliver(OutboundMessage {
        message_id: envelope.message_id(),
        content_type: "application/json".into(),
        body: body.clone(),
    });
    assert_eq!(pipeline.drain().await, vec![Settlement::Complete]);

    let second = pipeline.worker.process(body.as_bytes()).await.expect("second");
    assert_eq!(
        second.state,
        WorkerState::SkippedDuplicate(DuplicateReason::ExistingId)
    );
    assert_eq!(pipeline.index.len(), 1);
}

#[tokio::test]
async fn same_title_and_company_is_suppressed() {
    let pipeline = Pipeline::new(5);
    pipeline
        .publisher
        .publish(submission("Barista", "Joe's Coffee", None))
        .await
        .expect("publish");
    pipeline.drain().await;

    let second = Envelope::wrap(submission("Barista", "Joe's Coffee", None));
    let report = pipeline
        .worker
        .process(second.to_json().expect("json").as_bytes())
        .await
        .expect("processed");

    assert_eq!(
        report.state,
        WorkerState::SkippedDuplicate(DuplicateReason::SameTitleAndCompany)
    );
    assert_eq!(pipeline.index.len(), 1);
    assert!(
        pipeline
            .index
            .get_document(&second.id.to_string())
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn same_external_id_is_suppressed() {
    let pipeline = Pipeline::new(5);
    pipeline
        .publisher
        .publish(submission("Barista", "Joe's Coffee", Some("JR-77")))
        .await
        .expect("publish");
    pipeline
        .publisher
        .publish(submission("Roaster", "Bean Co", Some("JR-77")))
        .await
        .expect("publish");

    assert_eq!(
        pipeline.drain().await,
        vec![Settlement::Complete, Settlement::Complete]
    );
    assert_eq!(pipeline.index.len(), 1);
    assert_eq!(pipeline.metrics.snapshot().duplicates_skipped, 1);
}

#[tokio::test]
async fn malformed_message_is_dead_lettered_after_max_deliveries() {
    let pipeline = Pipeline::new(3);
    pipeline
        .queue
        .send(OutboundMessage {
            message_id: "broken".into(),
            content_type: "application/json".into(),
            body: "{\"id\": 42".into(),
        })
        .await
        .expect("send");

    assert_eq!(
        pipeline.drain().await,
        vec![Settlement::Abandon, Settlement::Abandon, Settlement::Abandon]
    );
    let dead = pipeline.queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message_id, "broken");
    assert_eq!(dead[0].delivery_count, 3);
    assert!(pipeline.index.is_empty());
    assert_eq!(pipeline.metrics.snapshot().deliveries_failed, 3);
}

#[tokio::test]
async fn envelope_missing_fields_is_abandoned_not_swallowed() {
    let pipeline = Pipeline::new(2);
    let envelope = Envelope::wrap(Submission {
        title: "Only a title".into(),
        ..Default::default()
    });
    pipeline
        .queue
        .send(OutboundMessage {
            message_id: envelope.message_id(),
            content_type: "application/json".into(),
            body: envelope.to_json().expect("json"),
        })
        .await
        .expect("send");

    assert_eq!(
        pipeline.drain().await,
        vec![Settlement::Abandon, Settlement::Abandon]
    );
    assert_eq!(pipeline.queue.dead_letters().len(), 1);
}

#[tokio::test]
async fn pascal_case_envelopes_from_other_producers_are_accepted() {
    let pipeline = Pipeline::new(5);
    let body = r#"{
        "Id": "6f1c1f0e-2a7b-4d8e-9a57-3f0f9f7b1c11",
        "Timestamp": "2024-05-01T10:00:00Z",
        "Payload": {
            "Title": "Ops Analyst",
            "Company": "Northwind",
            "Description": "Keep things running.",
            "WorkdayId": "WD-5"
        }
    }"#;

    let report = pipeline
        .worker
        .process(body.as_bytes())
        .await
        .expect("processed");
    assert_eq!(report.envelope_id, "6f1c1f0e-2a7b-4d8e-9a57-3f0f9f7b1c11");
    let stored = pipeline
        .index
        .get_document("6f1c1f0e-2a7b-4d8e-9a57-3f0f9f7b1c11")
        .await
        .expect("lookup")
        .expect("document");
    assert_eq!(stored.workday_id.as_deref(), Some("WD-5"));
}
