//! BioSamples Pipelines
//!
//! Execution substrate shared by the BioSamples batch pipelines.
//!
//! # Components
//!
//! - **Curation** ([`curation`]): folds amendments over a sample to produce
//!   its curated view
//! - **Accession** ([`accession`]): optimistic allocator handing out unique
//!   accessions against a [`SampleStore`](accession::SampleStore)
//! - **Executor** ([`executor`]): thread pool that retunes its own size from
//!   measured throughput
//! - **Pipeline** ([`pipeline`]): runner turning a record source into pool
//!   tasks and an aggregated [`RunSummary`](pipeline::RunSummary)
//! - **Tasks** ([`tasks`]): the curated-view and accession pipelines
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use biosamples_pipelines::accession::InMemorySampleStore;
//! use biosamples_pipelines::config::PipelinesConfig;
//! use biosamples_pipelines::pipeline::PipelineRunner;
//! use biosamples_pipelines::tasks::{CuratedViewTask, InMemoryAmendmentSource};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PipelinesConfig::from_env()?;
//!     let store = Arc::new(InMemorySampleStore::new());
//!     let view = CuratedViewTask::new(Arc::new(InMemoryAmendmentSource::default()), store);
//!
//!     let runner = PipelineRunner::from_config(&config, "curated-view")?;
//!     let summary = runner.run(Vec::new().into_iter().map(Ok), |s| view.task(s))?;
//!     println!("{} changes", summary.total_changes);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod accession;
pub mod config;
pub mod curation;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod tasks;

pub use error::{AllocatorError, PipelineError, PipelineResult, PoolError};
