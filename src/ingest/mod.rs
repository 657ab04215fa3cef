//! Ingestion: classify history rows, extract dependencies, materialize
//! edges, advance the cursor.

pub mod classifier;
pub mod materialize;
pub mod pipeline;

pub use classifier::{classify, Classification};
pub use materialize::{materialize, materialize_with_cap, MaterializeReport};
pub use pipeline::{
    processing_status, BatchReport, IngestError, IngestResult, Pipeline, ProcessingStatus,
    DEFAULT_BATCH_SIZE,
};
