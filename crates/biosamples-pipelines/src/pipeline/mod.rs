//! Pipeline orchestration: records in, tasks out, results aggregated

pub mod callback;
pub mod result;
pub mod runner;

pub use callback::{PipelineCallback, PipelineFutureCallback};
pub use result::{RunSummary, TaskResult};
pub use runner::{PipelineRecord, PipelineRunner, RunnerConfig, Task, DEFAULT_PROGRESS_INTERVAL};
