//! Bounded task queue shared by the pool's workers

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::time::Duration;

/// A queued unit of work. Returns `true` when the task ran to completion
/// without panicking, which is what the throughput monitor counts.
pub(crate) type Job = Box<dyn FnOnce() -> bool + Send + 'static>;

pub(crate) enum Push {
    Queued,
    Full(Job),
    Closed,
}

pub(crate) enum Pop {
    Job(Job),
    Idle,
    /// Closed and fully drained
    Closed,
}

struct State {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// FIFO queue with a hard capacity.
///
/// With `fair` set the lock is handed over in arrival order on release, so
/// no worker or submitter is starved by a thread that keeps re-acquiring it.
pub(crate) struct WorkQueue {
    state: Mutex<State>,
    available: Condvar,
    capacity: usize,
    fair: bool,
}

impl WorkQueue {
    pub fn new(capacity: usize, fair: bool) -> Self {
        Self {
            state: Mutex::new(State {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            fair,
        }
    }

    pub fn push(&self, job: Job) -> Push {
        let mut state = self.state.lock();
        if state.closed {
            return Push::Closed;
        }
        if state.jobs.len() >= self.capacity {
            return Push::Full(job);
        }
        state.jobs.push_back(job);
        self.release(state);
        self.available.notify_one();
        Push::Queued
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let mut state = self.state.lock();
        if state.jobs.is_empty() && !state.closed {
            self.available.wait_for(&mut state, timeout);
        }
        let popped = match state.jobs.pop_front() {
            Some(job) => Pop::Job(job),
            None if state.closed => Pop::Closed,
            None => Pop::Idle,
        };
        self.release(state);
        popped
    }

    /// Stop accepting jobs. Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = !state.closed;
        state.closed = true;
        drop(state);
        self.available.notify_all();
        was_open
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Wake every idle worker so it re-checks whether it should retire.
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    fn release(&self, guard: MutexGuard<'_, State>) {
        if self.fair {
            MutexGuard::unlock_fair(guard);
        } else {
            drop(guard);
        }
    }
}
