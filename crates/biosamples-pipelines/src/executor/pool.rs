//! Adaptive worker pool
//!
//! A fixed-size thread pool whose size is retuned by a monitor thread (see
//! [`super::monitor`]). Core and maximum sizes are always moved together, so
//! the live worker count simply follows the core size: growing spawns
//! threads, shrinking lets surplus workers retire after their current task.
//!
//! A full queue is backpressure, not an error: the submitting thread runs the
//! task itself.

use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::monitor::MonitorHandle;
use super::queue::{Job, Pop, Push, WorkQueue};
use crate::error::PoolError;

/// How long an idle worker waits for a job before re-checking whether it
/// should retire.
const WORKER_IDLE_WAIT: Duration = Duration::from_millis(250);

/// Pool creation parameters
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub fair: bool,
    pub initial_workers: usize,
    pub max_workers: usize,
    /// Bounded wait applied by [`AdaptivePool::close`]
    pub shutdown_timeout: Duration,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.initial_workers == 0 || self.initial_workers > self.max_workers {
            return Err(PoolError::InvalidPoolSizes {
                core: self.initial_workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }
}

/// How a [`AdaptivePool::close`] call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued and running task finished
    Completed,
    /// The wait elapsed. The remaining work keeps running on its own
    /// threads but nobody waits for it, so its side effects may never land.
    TimedOut { running: usize, queued: usize },
}

#[derive(Debug)]
struct Sizes {
    core: usize,
    max: usize,
    live: usize,
}

/// State shared between the pool handle, its workers and its monitor
pub(crate) struct PoolShared {
    name: String,
    queue: WorkQueue,
    sizes: Mutex<Sizes>,
    exited: Condvar,
    completed: AtomicU64,
    next_worker_id: AtomicUsize,
    cancel: CancellationToken,
}

impl PoolShared {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn completed_jobs(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn core_size(&self) -> usize {
        self.sizes.lock().core
    }

    fn set_max(&self, max: usize) -> Result<(), PoolError> {
        let mut sizes = self.sizes.lock();
        if max == 0 || max < sizes.core {
            return Err(PoolError::InvalidPoolSizes {
                core: sizes.core,
                max,
            });
        }
        sizes.max = max;
        Ok(())
    }

    fn set_core(&self, core: usize) -> Result<(), PoolError> {
        let mut sizes = self.sizes.lock();
        if core == 0 || core > sizes.max {
            return Err(PoolError::InvalidPoolSizes {
                core,
                max: sizes.max,
            });
        }
        sizes.core = core;
        Ok(())
    }

    /// Move core and max to `target`, or by one worker towards it if the
    /// sizes reject the move. Returns the resulting core size.
    pub fn resize(self: &Arc<Self>, target: usize) -> Result<usize, PoolError> {
        let current = self.core_size();
        let resized = if target > current {
            self.set_max(target).and_then(|()| self.set_core(target))
        } else {
            self.set_core(target).and_then(|()| self.set_max(target))
        };

        if let Err(e) = resized {
            debug!(pool = %self.name, target, error = %e, "Resize rejected, nudging by one worker");
            let core = self.core_size();
            if target > core {
                self.set_max(core + 1)?;
                self.set_core(core + 1)?;
            } else if target < core && core > 1 {
                self.set_core(core - 1)?;
                self.set_max(core - 1)?;
            }
        }

        self.spawn_workers()?;
        self.queue.wake_all();
        Ok(self.core_size())
    }

    /// Start workers until the live count reaches the core size.
    fn spawn_workers(self: &Arc<Self>) -> Result<(), PoolError> {
        loop {
            {
                let mut sizes = self.sizes.lock();
                if sizes.live >= sizes.core || self.queue.is_closed() {
                    return Ok(());
                }
                sizes.live += 1;
            }

            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let shared = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{}", self.name, id))
                .spawn(move || shared.work(id));

            if let Err(e) = spawned {
                self.leave();
                return Err(PoolError::Spawn(e));
            }
        }
    }

    fn work(&self, id: usize) {
        trace!(pool = %self.name, worker = id, "Worker started");
        loop {
            if self.try_retire() {
                trace!(pool = %self.name, worker = id, "Worker retired");
                return;
            }
            match self.queue.pop_timeout(WORKER_IDLE_WAIT) {
                Pop::Job(job) => {
                    if job() {
                        self.completed.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Pop::Idle => {},
                Pop::Closed => {
                    self.leave();
                    trace!(pool = %self.name, worker = id, "Worker exited on close");
                    return;
                },
            }
        }
    }

    fn try_retire(&self) -> bool {
        let mut sizes = self.sizes.lock();
        if sizes.live > sizes.core {
            sizes.live -= 1;
            self.exited.notify_all();
            true
        } else {
            false
        }
    }

    fn leave(&self) {
        let mut sizes = self.sizes.lock();
        sizes.live = sizes.live.saturating_sub(1);
        self.exited.notify_all();
    }
}

/// Result of a task submitted with [`AdaptivePool::submit`]
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T, PoolError>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run.
    pub fn join(self) -> Result<T, PoolError> {
        self.receiver.recv().map_err(|_| PoolError::Abandoned)?
    }

    pub fn join_timeout(&self, timeout: Duration) -> Option<Result<T, PoolError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Some(Err(PoolError::Abandoned)),
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Thread pool that retunes its own size from measured throughput
pub struct AdaptivePool {
    shared: Arc<PoolShared>,
    monitor: MonitorHandle,
    config: PoolConfig,
}

impl AdaptivePool {
    /// Create a pool and start its workers and monitor.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let name = name.into();

        let shared = Arc::new(PoolShared {
            name: name.clone(),
            queue: WorkQueue::new(config.queue_capacity.max(1), config.fair),
            sizes: Mutex::new(Sizes {
                core: config.initial_workers,
                max: config.initial_workers,
                live: 0,
            }),
            exited: Condvar::new(),
            completed: AtomicU64::new(0),
            next_worker_id: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        });
        let monitor = shared.spawn_workers().and_then(|()| {
            MonitorHandle::spawn(Arc::clone(&shared), config.poll_interval, config.max_workers)
        });
        let monitor = match monitor {
            Ok(monitor) => monitor,
            Err(e) => {
                shared.queue.close();
                return Err(e);
            },
        };

        info!(
            pool = %name,
            workers = config.initial_workers,
            max_workers = config.max_workers,
            queue_capacity = config.queue_capacity,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            fair = config.fair,
            "Adaptive pool started"
        );

        Ok(Self {
            shared,
            monitor,
            config,
        })
    }

    /// Run `task` on the pool and return a handle to its result.
    ///
    /// Blocks only when the queue is full, in which case the task runs on the
    /// calling thread before this returns.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| PoolError::TaskPanicked(panic_message(payload.as_ref())));
            let completed = outcome.is_ok();
            let _ = tx.send(outcome);
            completed
        });
        self.enqueue(job)?;
        Ok(TaskHandle { receiver: rx })
    }

    /// Run `task` on the pool without a result handle.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.shared.name.clone();
        let job: Job = Box::new(move || match catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => true,
            Err(payload) => {
                error!(pool = %pool, panic = %panic_message(payload.as_ref()), "Pool task panicked");
                false
            },
        });
        self.enqueue(job)
    }

    fn enqueue(&self, job: Job) -> Result<(), PoolError> {
        match self.shared.queue.push(job) {
            Push::Queued => Ok(()),
            Push::Full(job) => {
                trace!(pool = %self.shared.name, "Queue full, running task on caller thread");
                job();
                Ok(())
            },
            Push::Closed => Err(PoolError::Closed),
        }
    }

    /// Current target worker count
    pub fn worker_count(&self) -> usize {
        self.shared.core_size()
    }

    /// Worker threads currently alive; lags `worker_count` while surplus
    /// workers finish their current task.
    pub fn live_workers(&self) -> usize {
        self.shared.sizes.lock().live
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Tasks that ran to completion on a worker thread. Tasks run on a
    /// caller thread and tasks that panicked are not counted.
    pub fn completed_jobs(&self) -> u64 {
        self.shared.completed_jobs()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Token cancelled when a close times out with work still running.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Set the worker count directly, bypassing the monitor's policy.
    pub fn resize(&self, workers: usize) -> Result<usize, PoolError> {
        self.shared.resize(workers.min(self.config.max_workers))
    }

    /// Stop the monitor, freezing the worker count where it is.
    pub fn stop_monitor(&mut self) {
        self.monitor.stop();
    }

    /// Close with the configured shutdown timeout.
    pub fn close(&mut self) -> ShutdownOutcome {
        self.close_with_timeout(self.config.shutdown_timeout)
    }

    /// Stop accepting work and wait up to `timeout` for queued and running
    /// tasks to finish.
    ///
    /// On timeout the pool's cancellation token is cancelled and nobody
    /// waits any longer. Workers keep running and keep taking jobs until
    /// the queue is empty, so queued tasks still run, just unobserved.
    pub fn close_with_timeout(&mut self, timeout: Duration) -> ShutdownOutcome {
        self.monitor.stop();
        if self.shared.queue.close() {
            debug!(pool = %self.shared.name, "Pool closed to new work");
        }

        let deadline = Instant::now() + timeout;
        let mut sizes = self.shared.sizes.lock();
        while sizes.live > 0 {
            if self.shared.exited.wait_until(&mut sizes, deadline).timed_out() {
                break;
            }
        }
        let running = sizes.live;
        drop(sizes);

        if running == 0 {
            info!(
                pool = %self.shared.name,
                completed_jobs = self.completed_jobs(),
                "Adaptive pool shut down"
            );
            return ShutdownOutcome::Completed;
        }

        let queued = self.shared.queue.len();
        self.shared.cancel.cancel();
        warn!(
            pool = %self.shared.name,
            running,
            queued,
            timeout_secs = timeout.as_secs(),
            "Pool shutdown timed out; remaining work is abandoned"
        );
        ShutdownOutcome::TimedOut { running, queued }
    }
}

impl Drop for AdaptivePool {
    fn drop(&mut self) {
        if !self.shared.queue.is_closed() {
            self.close();
        }
    }
}

impl std::fmt::Debug for AdaptivePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptivePool")
            .field("name", &self.shared.name)
            .field("workers", &self.worker_count())
            .field("queued", &self.queued())
            .finish()
    }
}
