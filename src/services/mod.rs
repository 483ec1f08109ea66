//! Pipeline services

pub mod ingest;
pub mod queue;
pub mod registry;

pub use ingest::IngestService;
pub use queue::{NackOutcome, TranscodeQueue};
pub use registry::{ProcessingProgress, VariantRegistry};
