//! Asynchronous ingestion: duplicate detection, retrying index writes, and the queue worker.

pub mod dedup;
pub mod indexer;
pub mod types;
pub mod worker;

pub use dedup::DuplicateChecker;
pub use indexer::Indexer;
pub use types::{
    DeliveryReport, DuplicateCheck, DuplicateReason, IndexReceipt, IndexingError, IngestionError,
    WorkerState,
};
pub use worker::IngestionWorker;
