//! Backing store seam used by the allocator and by pipeline tasks

use biosamples_common::types::Sample;
use biosamples_common::{BioSamplesError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Outcome of a unique insert.
///
/// A collision is an expected outcome of optimistic allocation, not a
/// storage failure, so it is kept out of the error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Collision,
}

/// Storage collaborator for samples keyed by accession
pub trait SampleStore: Send + Sync {
    /// Whether a sample with this accession already exists
    fn exists(&self, accession: &str) -> Result<bool>;

    /// Insert a sample whose accession must not exist yet
    fn insert_new(&self, sample: &Sample) -> Result<InsertOutcome>;

    /// Insert or overwrite a sample
    fn persist(&self, sample: &Sample) -> Result<()>;

    fn get(&self, accession: &str) -> Result<Option<Sample>>;
}

fn accession_of(sample: &Sample) -> Result<&str> {
    sample.accession.as_deref().ok_or_else(|| {
        BioSamplesError::Storage(format!("sample '{}' has no accession", sample.name))
    })
}

/// Process-local [`SampleStore`]
#[derive(Debug, Default)]
pub struct InMemorySampleStore {
    samples: RwLock<BTreeMap<String, Sample>>,
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samples(samples: impl IntoIterator<Item = Sample>) -> Result<Self> {
        let store = Self::new();
        for sample in samples {
            store.persist(&sample)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Snapshot of every stored sample in accession order
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.read().values().cloned().collect()
    }
}

impl SampleStore for InMemorySampleStore {
    fn exists(&self, accession: &str) -> Result<bool> {
        Ok(self.samples.read().contains_key(accession))
    }

    fn insert_new(&self, sample: &Sample) -> Result<InsertOutcome> {
        let accession = accession_of(sample)?;
        let mut samples = self.samples.write();
        if samples.contains_key(accession) {
            return Ok(InsertOutcome::Collision);
        }
        samples.insert(accession.to_string(), sample.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn persist(&self, sample: &Sample) -> Result<()> {
        let accession = accession_of(sample)?;
        self.samples
            .write()
            .insert(accession.to_string(), sample.clone());
        Ok(())
    }

    fn get(&self, accession: &str) -> Result<Option<Sample>> {
        Ok(self.samples.read().get(accession).cloned())
    }
}
