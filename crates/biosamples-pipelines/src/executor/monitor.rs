//! Throughput monitor for the adaptive pool
//!
//! One monitor thread per pool. Every poll interval it measures completed
//! jobs per second at the current worker count, records the score, and moves
//! the worker count towards whichever count has recently scored best. The
//! score history is owned by the monitor thread alone; the pool only sees
//! the resize calls it makes.

use crossbeam_channel::{RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::pool::PoolShared;
use crate::error::PoolError;

/// Scores older than this many poll intervals are forgotten.
pub const SCORE_WINDOW_POLLS: u32 = 25;

/// A remembered count must beat the current score by this factor to be
/// jumped to directly.
pub const JUMP_MARGIN: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct Score {
    jobs_per_sec: f64,
    recorded: Instant,
}

/// What the monitor should do with the worker count this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Jump(usize),
    Grow(usize),
    Shrink(usize),
}

impl Decision {
    pub fn target(&self) -> Option<usize> {
        match self {
            Decision::Hold => None,
            Decision::Jump(n) | Decision::Grow(n) | Decision::Shrink(n) => Some(*n),
        }
    }
}

/// Recent throughput keyed by worker count
#[derive(Debug)]
pub struct ScoreBoard {
    scores: HashMap<usize, Score>,
    window: Duration,
}

impl ScoreBoard {
    pub fn new(window: Duration) -> Self {
        Self {
            scores: HashMap::new(),
            window,
        }
    }

    pub fn record(&mut self, workers: usize, jobs_per_sec: f64, now: Instant) {
        self.scores.insert(
            workers,
            Score {
                jobs_per_sec,
                recorded: now,
            },
        );
    }

    pub fn evict_stale(&mut self, now: Instant) {
        let window = self.window;
        self.scores
            .retain(|_, score| now.saturating_duration_since(score.recorded) <= window);
    }

    pub fn score(&self, workers: usize) -> Option<f64> {
        self.scores.get(&workers).map(|s| s.jobs_per_sec)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Pick the next worker count. Never returns a target below 1 or above
    /// `max_workers`.
    pub fn decide(&self, current: usize, max_workers: usize) -> Decision {
        let Some(current_score) = self.score(current) else {
            return Decision::Hold;
        };

        let best = self
            .scores
            .iter()
            .filter(|&(&workers, _)| workers != current && (1..=max_workers).contains(&workers))
            .filter(|(_, score)| score.jobs_per_sec > JUMP_MARGIN * current_score)
            .max_by(|a, b| {
                a.1.jobs_per_sec
                    .total_cmp(&b.1.jobs_per_sec)
                    .then_with(|| b.0.cmp(a.0))
            })
            .map(|(&workers, _)| workers);
        if let Some(best) = best {
            return Decision::Jump(best);
        }

        let at_least_as_good = |workers: usize| {
            self.score(workers)
                .map_or(true, |score| score >= current_score)
        };

        if current < max_workers && at_least_as_good(current + 1) {
            Decision::Grow(current + 1)
        } else if current > 1 && at_least_as_good(current - 1) {
            Decision::Shrink(current - 1)
        } else {
            Decision::Hold
        }
    }
}

/// Handle to a running monitor thread
pub(crate) struct MonitorHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn spawn(
        shared: Arc<PoolShared>,
        poll_interval: Duration,
        max_workers: usize,
    ) -> Result<Self, PoolError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let thread = thread::Builder::new()
            .name(format!("{}-monitor", shared.name()))
            .spawn(move || {
                let mut board = ScoreBoard::new(poll_interval * SCORE_WINDOW_POLLS);
                let mut last_completed = shared.completed_jobs();
                let mut last_tick = Instant::now();

                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => {},
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                            debug!(
                                pool = %shared.name(),
                                workers = shared.core_size(),
                                "Pool monitor stopped, worker count frozen"
                            );
                            break;
                        },
                    }

                    let now = Instant::now();
                    let completed = shared.completed_jobs();
                    let elapsed = now.duration_since(last_tick).as_secs_f64().max(f64::EPSILON);
                    let score = completed.saturating_sub(last_completed) as f64 / elapsed;
                    last_completed = completed;
                    last_tick = now;

                    let current = shared.core_size();
                    board.record(current, score, now);
                    board.evict_stale(now);
                    trace!(
                        pool = %shared.name(),
                        workers = current,
                        jobs_per_sec = score,
                        remembered = board.len(),
                        "Recorded pool throughput"
                    );

                    let decision = board.decide(current, max_workers);
                    let Some(target) = decision.target() else {
                        continue;
                    };
                    match shared.resize(target) {
                        Ok(size) => match decision {
                            Decision::Jump(_) => info!(
                                pool = %shared.name(),
                                from = current,
                                to = size,
                                "Jumped to best scoring worker count"
                            ),
                            _ => debug!(
                                pool = %shared.name(),
                                from = current,
                                to = size,
                                "Exploring worker count"
                            ),
                        },
                        Err(e) => warn!(
                            pool = %shared.name(),
                            target,
                            error = %e,
                            "Failed to resize pool"
                        ),
                    }
                }
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the monitor and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Pool monitor thread panicked");
            }
        }
    }
}
