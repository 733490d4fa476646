//! Self-tuning thread pool
//!
//! [`AdaptivePool`] runs tasks on OS threads behind a bounded queue. A
//! monitor thread samples throughput every poll interval and moves the
//! worker count up, down, or straight to the best recently observed count.

pub mod monitor;
pub mod pool;
mod queue;

pub use monitor::{Decision, ScoreBoard, JUMP_MARGIN, SCORE_WINDOW_POLLS};
pub use pool::{AdaptivePool, PoolConfig, ShutdownOutcome, TaskHandle};
