//! Durable queue boundary between synchronous intake and asynchronous ingestion.
//!
//! Delivery is at-least-once. The broker owns attempt counting and dead-lettering; consumers only
//! report each delivery as completed or abandoned.

pub mod memory;
pub mod service_bus;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::PipelineMetrics;
use crate::models::{Envelope, Submission};

pub use memory::InMemoryQueue;
pub use service_bus::ServiceBusQueue;

/// Content type attached to every envelope.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/json";

/// Errors raised by queue transports.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Namespace URL failed to parse or normalize.
    #[error("Invalid queue URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The broker responded with an unexpected status code.
    #[error("Unexpected broker response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the broker.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Envelope could not be serialized.
    #[error("Failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Broker metadata on a received message was missing or unreadable.
    #[error("Malformed broker properties: {0}")]
    BrokerProperties(String),
    /// Settlement referenced a lock the broker no longer holds.
    #[error("Message lock lost: {0}")]
    LockLost(String),
}

/// Message handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Transport-level message id, used by the broker for duplicate detection.
    pub message_id: String,
    /// MIME type of the body.
    pub content_type: String,
    /// Serialized body.
    pub body: String,
}

/// Message received under a peek-lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-level message id.
    pub message_id: String,
    /// Raw message body.
    pub body: Vec<u8>,
    /// How many times the broker has handed this message out, including this time.
    pub delivery_count: u32,
    /// Token identifying this lock for settlement.
    pub lock_token: String,
}

/// How a consumer settles a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processing finished (indexed or skipped as duplicate); remove the message.
    Complete,
    /// Processing failed; return the message so the broker's retry policy applies.
    Abandon,
}

/// Sending half of a broker.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Hand a message to the broker.
    async fn send(&self, message: OutboundMessage) -> Result<(), QueueError>;
}

/// Receiving half of a broker with peek-lock semantics.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Wait for the next message. `Ok(None)` means the poll timed out with nothing to do.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Remove a successfully processed message.
    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Release a failed message back to the broker for redelivery.
    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Apply a settlement decision.
    async fn settle(&self, delivery: &Delivery, settlement: Settlement) -> Result<(), QueueError> {
        match settlement {
            Settlement::Complete => self.complete(delivery).await,
            Settlement::Abandon => self.abandon(delivery).await,
        }
    }
}

/// Wraps submissions in envelopes and pushes them onto the queue.
pub struct QueuePublisher {
    transport: Arc<dyn QueueTransport>,
    metrics: Arc<PipelineMetrics>,
}

impl QueuePublisher {
    /// Build a publisher over the given transport.
    pub fn new(transport: Arc<dyn QueueTransport>, metrics: Arc<PipelineMetrics>) -> Self {
        Self { transport, metrics }
    }

    /// Publish a validated submission and return the envelope id.
    ///
    /// Transport failures propagate unchanged; there is no retry at this layer.
    pub async fn publish(&self, submission: Submission) -> Result<Uuid, QueueError> {
        let envelope = Envelope::wrap(submission);
        let message = OutboundMessage {
            message_id: envelope.message_id(),
            content_type: ENVELOPE_CONTENT_TYPE.to_string(),
            body: envelope.to_json()?,
        };

        self.transport.send(message).await?;
        self.metrics.record_submission();
        tracing::info!(envelope_id = %envelope.id, "Job description message sent to queue");
        Ok(envelope.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl QueueTransport for RecordingTransport {
        async fn send(&self, message: OutboundMessage) -> Result<(), QueueError> {
            if self.fail {
                return Err(QueueError::BrokerProperties("offline".into()));
            }
            self.sent.lock().expect("lock").push(message);
            Ok(())
        }
    }

    fn submission() -> Submission {
        Submission {
            title: "QA Lead".into(),
            company: "Northwind".into(),
            description: "Own quality.".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn publish_uses_envelope_id_as_message_id() {
        let transport = Arc::new(RecordingTransport::default());
        let metrics = Arc::new(PipelineMetrics::new());
        let publisher = QueuePublisher::new(transport.clone(), metrics.clone());

        let id = publisher.publish(submission()).await.expect("published");

        let sent = transport.sent.lock().expect("lock").clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_id, id.to_string());
        assert_eq!(sent[0].content_type, "application/json");
        let envelope = Envelope::from_json(sent[0].body.as_bytes()).expect("envelope");
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.payload, submission());
        assert_eq!(metrics.snapshot().submissions_accepted, 1);
    }

    #[tokio::test]
    async fn publish_propagates_transport_errors() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let metrics = Arc::new(PipelineMetrics::new());
        let publisher = QueuePublisher::new(transport, metrics.clone());

        let error = publisher.publish(submission()).await.expect_err("offline");
        assert!(matches!(error, QueueError::BrokerProperties(_)));
        assert_eq!(metrics.snapshot().submissions_accepted, 0);
    }
}
