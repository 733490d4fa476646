//! Pipeline configuration
//!
//! Every pipeline binary reads the same `BIOSAMPLES_*` environment variables
//! (a `.env` file is honoured) and derives the worker pool, runner and
//! accession allocator settings from them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::accession::AllocatorConfig;
use crate::executor::PoolConfig;
use crate::pipeline::RunnerConfig;

// ============================================================================
// Worker Pool Defaults
// ============================================================================

/// Initial number of worker threads.
pub const DEFAULT_THREAD_COUNT: usize = 1;

/// Upper bound the pool monitor may grow to.
pub const DEFAULT_THREAD_COUNT_MAX: usize = 60;

/// Capacity of the bounded task queue before callers run tasks themselves.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Interval between throughput measurements (10 seconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Bounded wait for in-flight work when a pool is closed.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Runner Defaults
// ============================================================================

/// In-flight ceiling; 0 means the source is fully submitted before draining.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 0;

// ============================================================================
// Accession Defaults
// ============================================================================

pub const DEFAULT_ACCESSION_PREFIX: &str = "SAMEA";

pub const DEFAULT_ACCESSION_MINIMUM: u64 = 1;

pub const DEFAULT_ACCESSION_QUEUE_SIZE: usize = 100;

pub const DEFAULT_ACCESSION_REFILL_INTERVAL_MS: u64 = 100;

/// Pipelines configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinesConfig {
    pub thread_count: usize,
    pub thread_count_max: usize,
    pub queue_size: usize,
    pub poll_interval_ms: u64,
    pub fair_queue: bool,
    pub shutdown_timeout_secs: u64,
    pub max_in_flight: usize,
    /// Restrict curation to these domains; `None` applies every domain
    pub curation_domains: Option<Vec<String>>,
    pub accession: AccessionSettings,
}

/// Accession allocator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessionSettings {
    pub prefix: String,
    pub minimum: u64,
    pub queue_size: usize,
    pub refill_interval_ms: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PipelinesConfig {
    /// Load configuration from environment and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let curation_domains = std::env::var("BIOSAMPLES_PIPELINES_CURATION_DOMAINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect()
            });

        let config = Self {
            thread_count: env_or("BIOSAMPLES_PIPELINES_THREADCOUNT", DEFAULT_THREAD_COUNT),
            thread_count_max: env_or(
                "BIOSAMPLES_PIPELINES_THREADCOUNT_MAX",
                DEFAULT_THREAD_COUNT_MAX,
            ),
            queue_size: env_or("BIOSAMPLES_PIPELINES_QUEUE_SIZE", DEFAULT_QUEUE_SIZE),
            poll_interval_ms: env_or(
                "BIOSAMPLES_PIPELINES_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            ),
            fair_queue: env_or("BIOSAMPLES_PIPELINES_FAIR_QUEUE", true),
            shutdown_timeout_secs: env_or(
                "BIOSAMPLES_PIPELINES_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            ),
            max_in_flight: env_or("BIOSAMPLES_PIPELINES_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT),
            curation_domains,
            accession: AccessionSettings {
                prefix: std::env::var("BIOSAMPLES_ACCESSION_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_ACCESSION_PREFIX.to_string()),
                minimum: env_or("BIOSAMPLES_ACCESSION_MINIMUM", DEFAULT_ACCESSION_MINIMUM),
                queue_size: env_or(
                    "BIOSAMPLES_ACCESSION_QUEUE_SIZE",
                    DEFAULT_ACCESSION_QUEUE_SIZE,
                ),
                refill_interval_ms: env_or(
                    "BIOSAMPLES_ACCESSION_REFILL_INTERVAL_MS",
                    DEFAULT_ACCESSION_REFILL_INTERVAL_MS,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.thread_count == 0 {
            anyhow::bail!("BIOSAMPLES_PIPELINES_THREADCOUNT must be greater than 0");
        }
        if self.thread_count_max < self.thread_count {
            anyhow::bail!(
                "BIOSAMPLES_PIPELINES_THREADCOUNT_MAX ({}) cannot be less than BIOSAMPLES_PIPELINES_THREADCOUNT ({})",
                self.thread_count_max,
                self.thread_count
            );
        }
        if self.queue_size == 0 {
            anyhow::bail!("BIOSAMPLES_PIPELINES_QUEUE_SIZE must be greater than 0");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("BIOSAMPLES_PIPELINES_POLL_INTERVAL_MS must be greater than 0");
        }
        if self.accession.prefix.trim().is_empty() {
            anyhow::bail!("BIOSAMPLES_ACCESSION_PREFIX cannot be empty");
        }
        if self.accession.queue_size == 0 {
            anyhow::bail!("BIOSAMPLES_ACCESSION_QUEUE_SIZE must be greater than 0");
        }
        if let Some(domains) = &self.curation_domains {
            if domains.is_empty() {
                tracing::warn!("Curation domain list is empty - no amendments will be applied");
            }
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            queue_capacity: self.queue_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fair: self.fair_queue,
            initial_workers: self.thread_count,
            max_workers: self.thread_count_max,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }

    pub fn runner_config(&self, pipeline_name: impl Into<String>) -> RunnerConfig {
        RunnerConfig {
            pipeline_name: pipeline_name.into(),
            max_in_flight: self.max_in_flight,
            ..RunnerConfig::default()
        }
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            prefix: self.accession.prefix.clone(),
            minimum: self.accession.minimum,
            queue_size: self.accession.queue_size,
            refill_interval: Duration::from_millis(self.accession.refill_interval_ms),
        }
    }
}

impl Default for PipelinesConfig {
    fn default() -> Self {
        Self {
            thread_count: DEFAULT_THREAD_COUNT,
            thread_count_max: DEFAULT_THREAD_COUNT_MAX,
            queue_size: DEFAULT_QUEUE_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fair_queue: true,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            curation_domains: None,
            accession: AccessionSettings {
                prefix: DEFAULT_ACCESSION_PREFIX.to_string(),
                minimum: DEFAULT_ACCESSION_MINIMUM,
                queue_size: DEFAULT_ACCESSION_QUEUE_SIZE,
                refill_interval_ms: DEFAULT_ACCESSION_REFILL_INTERVAL_MS,
            },
        }
    }
}
