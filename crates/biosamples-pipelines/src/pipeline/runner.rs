//! Pipeline runner
//!
//! Pulls records from a source, submits one task per record to an
//! [`AdaptivePool`], and consumes results in completion order from a channel
//! fed by the tasks themselves. Counters live on the runner's thread only.
//!
//! Task failures (errors or panics) become `success = false` results and the
//! run carries on. A failing source aborts the run.

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use biosamples_common::types::Sample;

use super::callback::{PipelineCallback, PipelineFutureCallback};
use super::result::{RunSummary, TaskResult};
use crate::config::PipelinesConfig;
use crate::error::{PipelineError, PipelineResult, PoolError};
use crate::executor::pool::panic_message;
use crate::executor::{AdaptivePool, ShutdownOutcome};

/// Progress is logged every this many scheduled records.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// A per-record unit of work. Shared so a failed task can be resubmitted.
pub type Task = Arc<dyn Fn(&CancellationToken) -> anyhow::Result<TaskResult> + Send + Sync>;

/// Anything a runner can key in-flight work by
pub trait PipelineRecord {
    fn identifier(&self) -> String;
}

impl PipelineRecord for Sample {
    fn identifier(&self) -> String {
        Sample::identifier(self).to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub pipeline_name: String,
    /// Most tasks allowed in flight before the runner waits for completions;
    /// 0 submits the whole source first
    pub max_in_flight: usize,
    pub progress_interval: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "pipeline".to_string(),
            max_in_flight: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

struct Completion {
    ticket: u64,
    result: TaskResult,
}

struct InFlight {
    identifier: String,
    task: Task,
    attempts: u32,
}

/// Bookkeeping for one run
struct RunState<'a, C: ?Sized> {
    pool: &'a AdaptivePool,
    cancel: &'a CancellationToken,
    pipeline: &'a str,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    in_flight: HashMap<u64, InFlight>,
    totals: PipelineFutureCallback,
    callback: &'a mut C,
    max_attempts: u32,
    retries: u64,
}

impl<C: PipelineCallback + ?Sized> RunState<'_, C> {
    fn submit(&mut self, ticket: u64, identifier: String, task: Task) -> Result<(), PoolError> {
        // registered first: a full queue runs the task before dispatch returns
        self.in_flight.insert(
            ticket,
            InFlight {
                identifier: identifier.clone(),
                task: Arc::clone(&task),
                attempts: 1,
            },
        );
        let dispatched = self.dispatch(ticket, identifier, task);
        if dispatched.is_err() {
            self.in_flight.remove(&ticket);
        }
        dispatched
    }

    fn dispatch(&self, ticket: u64, identifier: String, task: Task) -> Result<(), PoolError> {
        let tx = self.tx.clone();
        let token = self.cancel.clone();
        self.pool.execute(move || {
            let result = run_task(&identifier, &task, &token);
            let _ = tx.send(Completion { ticket, result });
        })
    }

    /// Wait for one task to finish and record it, resubmitting it instead if
    /// it failed and has attempts left.
    fn complete_one(&mut self) -> Result<(), PoolError> {
        let Completion { ticket, result } = self.rx.recv().map_err(|_| PoolError::Abandoned)?;
        let Some(entry) = self.in_flight.remove(&ticket) else {
            warn!(pipeline = %self.pipeline, ticket, "Completion for unknown task");
            return Ok(());
        };

        if !result.success && entry.attempts < self.max_attempts && !self.cancel.is_cancelled() {
            debug!(
                pipeline = %self.pipeline,
                identifier = %entry.identifier,
                attempt = entry.attempts + 1,
                "Resubmitting failed task"
            );
            self.retries += 1;
            let identifier = entry.identifier.clone();
            let task = Arc::clone(&entry.task);
            self.in_flight.insert(
                ticket,
                InFlight {
                    attempts: entry.attempts + 1,
                    ..entry
                },
            );
            return self.dispatch(ticket, identifier, task);
        }

        self.totals.call(&result);
        C::call(self.callback, &result);
        Ok(())
    }

    fn drain_to(&mut self, limit: usize) -> Result<(), PoolError> {
        while self.in_flight.len() > limit {
            self.complete_one()?;
        }
        Ok(())
    }
}

fn run_task(identifier: &str, task: &Task, token: &CancellationToken) -> TaskResult {
    // still drained through the pool, but the body never runs
    if token.is_cancelled() {
        debug!(identifier, "Run cancelled, skipping task");
        return TaskResult::failure(identifier);
    }
    match catch_unwind(AssertUnwindSafe(|| task(token))) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(identifier, error = %format!("{e:#}"), "Task failed");
            TaskResult::failure(identifier)
        },
        Err(payload) => {
            error!(identifier, panic = %panic_message(payload.as_ref()), "Task panicked");
            TaskResult::failure(identifier)
        },
    }
}

/// Drives one pipeline run over an [`AdaptivePool`]
pub struct PipelineRunner {
    pool: AdaptivePool,
    config: RunnerConfig,
    cancel: CancellationToken,
}

impl PipelineRunner {
    pub fn new(pool: AdaptivePool, config: RunnerConfig) -> Self {
        let cancel = pool.cancellation_token().child_token();
        Self {
            pool,
            config,
            cancel,
        }
    }

    /// Build the pool and runner described by `config`.
    pub fn from_config(config: &PipelinesConfig, pipeline_name: &str) -> PipelineResult<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let pool = AdaptivePool::new(pipeline_name, config.pool_config())?;
        Ok(Self::new(pool, config.runner_config(pipeline_name)))
    }

    /// Token handed to every task. Cancelling it stops intake. Tasks already
    /// running finish normally; submitted tasks that have not started yet
    /// are not run and complete as `success = false`. The run then returns
    /// [`PipelineError::Cancelled`] with the partial summary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn pool(&self) -> &AdaptivePool {
        &self.pool
    }

    pub fn run<R, I, F>(self, source: I, factory: F) -> PipelineResult<RunSummary>
    where
        R: PipelineRecord,
        I: IntoIterator<Item = anyhow::Result<R>>,
        F: FnMut(R) -> Task,
    {
        self.execute(source, factory, &mut |_: &TaskResult| {}, 1)
    }

    pub fn run_with_callback<R, I, F, C>(
        self,
        source: I,
        factory: F,
        callback: &mut C,
    ) -> PipelineResult<RunSummary>
    where
        R: PipelineRecord,
        I: IntoIterator<Item = anyhow::Result<R>>,
        F: FnMut(R) -> Task,
        C: PipelineCallback + ?Sized,
    {
        self.execute(source, factory, callback, 1)
    }

    /// Like [`run`](Self::run), but a failed task is resubmitted until it
    /// succeeds or has been attempted `max_attempts` times.
    pub fn run_with_retry<R, I, F>(
        self,
        source: I,
        factory: F,
        max_attempts: u32,
    ) -> PipelineResult<RunSummary>
    where
        R: PipelineRecord,
        I: IntoIterator<Item = anyhow::Result<R>>,
        F: FnMut(R) -> Task,
    {
        self.execute(source, factory, &mut |_: &TaskResult| {}, max_attempts.max(1))
    }

    fn execute<R, I, F, C>(
        mut self,
        source: I,
        mut factory: F,
        callback: &mut C,
        max_attempts: u32,
    ) -> PipelineResult<RunSummary>
    where
        R: PipelineRecord,
        I: IntoIterator<Item = anyhow::Result<R>>,
        F: FnMut(R) -> Task,
        C: PipelineCallback + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let pipeline = self.config.pipeline_name.clone();
        let progress_interval = self.config.progress_interval.max(1);
        let max_in_flight = self.config.max_in_flight;

        info!(pipeline = %pipeline, run_id = %run_id, "Pipeline run started");

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut state = RunState {
            pool: &self.pool,
            cancel: &self.cancel,
            pipeline: &pipeline,
            tx,
            rx,
            in_flight: HashMap::new(),
            totals: PipelineFutureCallback::new(),
            callback,
            max_attempts,
            retries: 0,
        };

        let mut scheduled: u64 = 0;
        let mut records = source.into_iter();
        let mut source_error = None;

        let outcome: Result<(), PoolError> = (|| {
            loop {
                if state.cancel.is_cancelled() {
                    info!(pipeline = %pipeline, scheduled, "Run cancelled, no further records taken");
                    break;
                }
                let Some(item) = records.next() else {
                    break;
                };
                let record = match item {
                    Ok(record) => record,
                    Err(e) => {
                        source_error = Some(e);
                        break;
                    },
                };

                let identifier = record.identifier();
                let task = factory(record);
                state.submit(scheduled, identifier, task)?;
                scheduled += 1;

                if scheduled % progress_interval == 0 {
                    info!(
                        pipeline = %pipeline,
                        scheduled,
                        completed = state.totals.completed(),
                        workers = state.pool.worker_count(),
                        "Scheduled records"
                    );
                }
                if max_in_flight > 0 {
                    state.drain_to(max_in_flight - 1)?;
                }
            }
            if source_error.is_none() {
                state.drain_to(0)?;
            }
            Ok(())
        })();

        let RunState { totals, retries, .. } = state;
        let summary = RunSummary {
            run_id,
            pipeline: pipeline.clone(),
            started_at,
            finished_at: Utc::now(),
            records_processed: scheduled,
            total_changes: totals.total_changes(),
            failed: totals.failed_count(),
            retries,
            failed_identifiers: totals.into_failed_identifiers(),
        };

        if let Some(e) = source_error {
            error!(
                pipeline = %pipeline,
                scheduled,
                changes = summary.total_changes,
                failed = summary.failed,
                error = %format!("{e:#}"),
                "Record source failed, aborting run"
            );
            self.pool.close();
            return Err(PipelineError::Source(e));
        }
        outcome?;

        if let ShutdownOutcome::TimedOut { running, queued } = self.pool.close() {
            warn!(pipeline = %pipeline, running, queued, "Pool did not drain before shutdown timeout");
        }

        info!(
            pipeline = %pipeline,
            run_id = %run_id,
            processed = summary.records_processed,
            changes = summary.total_changes,
            failed = summary.failed,
            retries = summary.retries,
            elapsed_secs = summary.elapsed_secs(),
            "Pipeline run finished"
        );

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(Box::new(summary)));
        }
        Ok(summary)
    }
}
