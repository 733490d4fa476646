//! Error types for the pipeline substrate

use biosamples_common::BioSamplesError;
use thiserror::Error;

use crate::pipeline::RunSummary;

/// Adaptive worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool is closed and accepts no new work")]
    Closed,

    #[error("Invalid pool sizes: core {core} must be between 1 and max {max}")]
    InvalidPoolSizes { core: usize, max: usize },

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Task was abandoned before producing a result")]
    Abandoned,
}

/// Accession allocator errors
#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("Accession allocator is stopped and has no candidates left")]
    Stopped,

    #[error("Backing store error: {0}")]
    Store(#[from] BioSamplesError),

    #[error("Failed to spawn refill thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Pipeline run errors.
///
/// Individual task failures never surface here; they are counted in the
/// run summary instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Record source failed: {0}")]
    Source(#[source] anyhow::Error),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Pipeline run cancelled after {} records", .0.records_processed)]
    Cancelled(Box<RunSummary>),

    #[error("Invalid pipeline configuration: {0}")]
    Config(String),
}

/// Result type alias for pipeline runs
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
