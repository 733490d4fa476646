//! Accessioning pipeline: give every unaccessioned sample an accession.
//!
//! Accessions already present in the input must be in the store before the
//! allocator starts handing out new ones, see [`register_existing`].

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use biosamples_common::types::Sample;

use crate::accession::{AccessionAllocator, InsertOutcome, SampleStore};
use crate::pipeline::{Task, TaskResult};

/// Insert every accessioned sample from `samples` into `store`; drafts are
/// skipped. Returns how many accessions were registered. A repeated
/// accession keeps the first sample seen.
pub fn register_existing<I>(store: &dyn SampleStore, samples: I) -> anyhow::Result<usize>
where
    I: IntoIterator<Item = anyhow::Result<Sample>>,
{
    let mut registered = 0;
    for sample in samples {
        let sample = sample.context("Failed to scan samples for existing accessions")?;
        let Some(accession) = sample.accession.as_deref() else {
            continue;
        };
        match store.insert_new(&sample)? {
            InsertOutcome::Inserted => registered += 1,
            InsertOutcome::Collision => {
                warn!(accession, name = %sample.name, "Accession repeated in input, keeping the first sample");
            },
        }
    }
    info!(registered, "Registered existing accessions");
    Ok(registered)
}

#[derive(Clone)]
pub struct AccessionTask {
    allocator: Arc<AccessionAllocator>,
}

impl AccessionTask {
    pub fn new(allocator: Arc<AccessionAllocator>) -> Self {
        Self { allocator }
    }

    pub fn task(&self, sample: Sample) -> Task {
        let this = self.clone();
        Arc::new(move |token: &CancellationToken| this.process(&sample, token))
    }

    /// Already accessioned samples are registered with the store and count
    /// no change.
    pub fn process(&self, sample: &Sample, token: &CancellationToken) -> anyhow::Result<TaskResult> {
        if let Some(accession) = &sample.accession {
            let outcome = self.allocator.register(sample)?;
            debug!(accession = %accession, ?outcome, "Sample already accessioned");
            return Ok(TaskResult::success(accession.as_str(), 0));
        }
        if token.is_cancelled() {
            anyhow::bail!("run cancelled before '{}' was accessioned", sample.name);
        }

        let accessioned = self.allocator.generate_accession(sample)?;
        debug!(
            name = %sample.name,
            accession = accessioned.accession.as_deref().unwrap_or_default(),
            "Accessioned sample"
        );
        Ok(TaskResult::success(sample.identifier(), 1))
    }
}
