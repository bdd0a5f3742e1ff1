//! Retrieval-augmented chat over indexed job descriptions.
//!
//! A turn searches the index, renders the hits as a grounding block, and asks the language
//! model to answer from it. Search and generation failures are absorbed: the caller always gets
//! an answer, and [`ChatOutcome`] records which degraded path was taken.

pub mod engine;
pub mod prompt;

pub use engine::{ChatEngine, ChatOutcome, GenerationStatus, RetrievalStatus};
