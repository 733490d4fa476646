//! Optimistic accession allocator
//!
//! A background refill thread walks a counter from the configured minimum
//! and keeps a bounded queue of candidates that the store does not know
//! about yet. Allocation pops a candidate and tries a unique insert; the
//! store's uniqueness constraint arbitrates races with other allocators and
//! with out-of-band inserts, and a losing candidate is simply discarded.
//!
//! Only the refill thread touches the counter.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use biosamples_common::types::Sample;

use super::store::{InsertOutcome, SampleStore};
use crate::config::{
    DEFAULT_ACCESSION_MINIMUM, DEFAULT_ACCESSION_PREFIX, DEFAULT_ACCESSION_QUEUE_SIZE,
    DEFAULT_ACCESSION_REFILL_INTERVAL_MS,
};
use crate::error::AllocatorError;

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub prefix: String,
    /// First counter value tried
    pub minimum: u64,
    /// Candidates kept ready ahead of consumers
    pub queue_size: usize,
    pub refill_interval: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ACCESSION_PREFIX.to_string(),
            minimum: DEFAULT_ACCESSION_MINIMUM,
            queue_size: DEFAULT_ACCESSION_QUEUE_SIZE,
            refill_interval: Duration::from_millis(DEFAULT_ACCESSION_REFILL_INTERVAL_MS),
        }
    }
}

enum Refill {
    Offered(usize),
    /// Every consumer is gone
    Disconnected,
}

struct CandidateRefiller {
    store: Arc<dyn SampleStore>,
    prefix: String,
    counter: u64,
    queue: Sender<String>,
}

impl CandidateRefiller {
    /// Offer unused candidates until the queue is full.
    fn refill(&mut self) -> biosamples_common::Result<Refill> {
        let mut offered = 0;
        loop {
            let candidate = format!("{}{}", self.prefix, self.counter);
            if self.store.exists(&candidate)? {
                self.counter += 1;
                continue;
            }
            match self.queue.try_send(candidate) {
                Ok(()) => {
                    self.counter += 1;
                    offered += 1;
                },
                Err(TrySendError::Full(_)) => return Ok(Refill::Offered(offered)),
                Err(TrySendError::Disconnected(_)) => return Ok(Refill::Disconnected),
            }
        }
    }
}

struct RefillHandle {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Issues unique accessions backed by a [`SampleStore`]
pub struct AccessionAllocator {
    store: Arc<dyn SampleStore>,
    candidates: Receiver<String>,
    refill: Mutex<Option<RefillHandle>>,
}

impl AccessionAllocator {
    /// Start the refill thread and return the allocator.
    pub fn start(
        store: Arc<dyn SampleStore>,
        config: AllocatorConfig,
    ) -> Result<Self, AllocatorError> {
        let (queue, candidates) = crossbeam_channel::bounded(config.queue_size.max(1));
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let mut refiller = CandidateRefiller {
            store: Arc::clone(&store),
            prefix: config.prefix.clone(),
            counter: config.minimum,
            queue,
        };
        let interval = config.refill_interval;

        let thread = thread::Builder::new()
            .name("accession-refill".to_string())
            .spawn(move || loop {
                match refiller.refill() {
                    Ok(Refill::Offered(0)) => {},
                    Ok(Refill::Offered(offered)) => trace!(
                        offered,
                        next = refiller.counter,
                        "Queued accession candidates"
                    ),
                    Ok(Refill::Disconnected) => break,
                    Err(e) => warn!(error = %e, "Accession refill failed, retrying next tick"),
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {},
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(AllocatorError::Spawn)?;

        info!(
            prefix = %config.prefix,
            minimum = config.minimum,
            queue_size = config.queue_size,
            "Accession allocator started"
        );

        Ok(Self {
            store,
            candidates,
            refill: Mutex::new(Some(RefillHandle { stop, thread })),
        })
    }

    /// Claim a fresh accession for `sample`, inserting it into the store.
    ///
    /// Blocks while the candidate queue is empty.
    pub fn allocate(&self, sample: &Sample) -> Result<String, AllocatorError> {
        self.claim(sample).map(|(accession, _)| accession)
    }

    /// Claim a fresh accession and return the sample carrying it. Relationships
    /// without a source are pointed at the new accession.
    pub fn generate_accession(&self, sample: &Sample) -> Result<Sample, AllocatorError> {
        self.claim(sample).map(|(_, sample)| sample)
    }

    fn claim(&self, sample: &Sample) -> Result<(String, Sample), AllocatorError> {
        loop {
            let candidate = self
                .candidates
                .recv()
                .map_err(|_| AllocatorError::Stopped)?;
            let accessioned = with_accession(sample, &candidate);

            match self.store.insert_new(&accessioned)? {
                InsertOutcome::Inserted => {
                    debug!(accession = %candidate, name = %sample.name, "Assigned accession");
                    return Ok((candidate, accessioned));
                },
                InsertOutcome::Collision => {
                    debug!(accession = %candidate, "Accession already taken, discarding candidate");
                },
            }
        }
    }

    /// Record a sample that already carries an accession so that accession is
    /// never handed out. A `Collision` means the store already knew it.
    pub fn register(&self, sample: &Sample) -> Result<InsertOutcome, AllocatorError> {
        let outcome = self.store.insert_new(sample)?;
        trace!(accession = sample.identifier(), ?outcome, "Registered existing accession");
        Ok(outcome)
    }

    /// Candidates currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.candidates.len()
    }

    /// Stop the refill thread. Candidates already queued can still be
    /// allocated; once they run out `allocate` returns
    /// [`AllocatorError::Stopped`].
    pub fn shutdown(&self) {
        let Some(handle) = self.refill.lock().take() else {
            return;
        };
        drop(handle.stop);
        if handle.thread.join().is_err() {
            warn!("Accession refill thread panicked");
        }
        debug!("Accession allocator stopped");
    }
}

impl Drop for AccessionAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn with_accession(sample: &Sample, accession: &str) -> Sample {
    let mut accessioned = sample.clone();
    accessioned.accession = Some(accession.to_string());
    accessioned.relationships = sample
        .relationships
        .iter()
        .cloned()
        .map(|mut r| {
            if r.source.is_empty() {
                r.source = accession.to_string();
            }
            r
        })
        .collect();
    accessioned
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::accession::InMemorySampleStore;
    use biosamples_common::types::Relationship;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::time::Instant;

    fn config(queue_size: usize) -> AllocatorConfig {
        AllocatorConfig {
            prefix: "SAMEA".to_string(),
            minimum: 1,
            queue_size,
            refill_interval: Duration::from_millis(5),
        }
    }

    fn wait_for_queue(allocator: &AccessionAllocator, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while allocator.queued() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_allocates_in_counter_order() {
        let store = Arc::new(InMemorySampleStore::new());
        let allocator = AccessionAllocator::start(store.clone(), config(4)).unwrap();
        let draft = Sample::new("draft", Utc::now());

        assert_eq!(allocator.allocate(&draft).unwrap(), "SAMEA1");
        assert_eq!(allocator.allocate(&draft).unwrap(), "SAMEA2");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_skips_existing_accessions() {
        let existing = (1..=3).map(|i| Sample::new("old", Utc::now()).with_accession(format!("SAMEA{i}")));
        let store = Arc::new(InMemorySampleStore::with_samples(existing).unwrap());
        let allocator = AccessionAllocator::start(store, config(4)).unwrap();

        assert_eq!(
            allocator.allocate(&Sample::new("new", Utc::now())).unwrap(),
            "SAMEA4"
        );
    }

    #[test]
    fn test_collision_discards_candidate() {
        let store = Arc::new(InMemorySampleStore::new());
        let allocator = AccessionAllocator::start(store.clone(), config(3)).unwrap();
        wait_for_queue(&allocator, 3);

        // claimed behind the allocator's back after it was queued
        store
            .persist(&Sample::new("intruder", Utc::now()).with_accession("SAMEA1"))
            .unwrap();

        let accession = allocator.allocate(&Sample::new("mine", Utc::now())).unwrap();
        assert_eq!(accession, "SAMEA2");
        assert_eq!(store.get("SAMEA1").unwrap().unwrap().name, "intruder");
    }

    #[test]
    fn test_generate_accession_fills_relationship_source() {
        let store = Arc::new(InMemorySampleStore::new());
        let allocator = AccessionAllocator::start(store, config(2)).unwrap();
        let draft = Sample::new("child", Utc::now())
            .with_relationship(Relationship::new("", "derived from", "SAMEA99"));

        let sample = allocator.generate_accession(&draft).unwrap();
        assert_eq!(sample.accession.as_deref(), Some("SAMEA1"));
        let relationship = sample.relationships.iter().next().unwrap();
        assert_eq!(relationship.source, "SAMEA1");
        assert_eq!(relationship.target, "SAMEA99");
    }

    #[test]
    fn test_stopped_allocator_drains_then_errors() {
        let store = Arc::new(InMemorySampleStore::new());
        let allocator = AccessionAllocator::start(store, config(2)).unwrap();
        wait_for_queue(&allocator, 2);
        allocator.shutdown();

        let draft = Sample::new("draft", Utc::now());
        assert!(allocator.allocate(&draft).is_ok());
        assert!(allocator.allocate(&draft).is_ok());
        assert!(matches!(
            allocator.allocate(&draft),
            Err(AllocatorError::Stopped)
        ));
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let store = Arc::new(InMemorySampleStore::new());
        let allocator = Arc::new(AccessionAllocator::start(store.clone(), config(8)).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            allocator
                                .allocate(&Sample::new(format!("s{t}-{i}"), Utc::now()))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
        assert_eq!(store.len(), 200);
    }
}
