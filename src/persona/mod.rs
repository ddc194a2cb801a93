//! Persona lifecycle
//!
//! `ingest` turns an uploaded PDF into bounded persona text; `dialogue`
//! answers questions against the stored persona and applies model-proposed
//! updates.

pub mod dialogue;
pub mod ingest;

pub use dialogue::{Answer, DialogueEngine};
pub use ingest::{IngestReport, IngestionPipeline};
