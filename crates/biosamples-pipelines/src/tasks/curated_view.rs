//! Curated view pipeline: resolve each sample against its amendments and
//! store the result when it changed.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use biosamples_common::types::Sample;

use super::source::AmendmentSource;
use crate::accession::SampleStore;
use crate::curation::resolve_with_changes;
use crate::pipeline::{Task, TaskResult};

#[derive(Clone)]
pub struct CuratedViewTask {
    amendments: Arc<dyn AmendmentSource>,
    store: Arc<dyn SampleStore>,
    domains: Option<Arc<[String]>>,
}

impl CuratedViewTask {
    pub fn new(amendments: Arc<dyn AmendmentSource>, store: Arc<dyn SampleStore>) -> Self {
        Self {
            amendments,
            store,
            domains: None,
        }
    }

    /// Only apply amendments owned by these domains.
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = Some(domains.into());
        self
    }

    /// Runner task for one sample
    pub fn task(&self, sample: Sample) -> Task {
        let view = self.clone();
        Arc::new(move |token: &CancellationToken| view.process(&sample, token))
    }

    pub fn process(&self, sample: &Sample, token: &CancellationToken) -> anyhow::Result<TaskResult> {
        let Some(accession) = sample.accession.as_deref() else {
            anyhow::bail!("sample '{}' has no accession", sample.name);
        };

        let amendments = self
            .amendments
            .amendments_for(accession)
            .with_context(|| format!("failed to load amendments for {accession}"))?;
        if amendments.is_empty() {
            return Ok(TaskResult::success(accession, 0));
        }

        let resolution = resolve_with_changes(sample, &amendments, self.domains.as_deref());

        if token.is_cancelled() {
            anyhow::bail!("run cancelled before {accession} was stored");
        }
        if resolution.changes > 0 {
            self.store
                .persist(&resolution.sample)
                .with_context(|| format!("failed to store curated {accession}"))?;
        }
        Ok(TaskResult::success(accession, resolution.changes))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::accession::InMemorySampleStore;
    use crate::tasks::InMemoryAmendmentSource;
    use biosamples_common::types::{Amendment, Attribute, Patch};
    use chrono::Utc;

    fn fixture() -> (CuratedViewTask, Arc<InMemorySampleStore>, Sample) {
        let sample = Sample::new("blood", Utc::now())
            .with_accession("SAMEA7")
            .with_attribute(Attribute::new("Organism", "9606"));
        let amendments = InMemoryAmendmentSource::new(vec![Amendment::new(
            "SAMEA7",
            Patch::attribute(
                Some(Attribute::new("Organism", "9606")),
                Some(Attribute::new("Organism", "Homo sapiens")),
            )
            .unwrap(),
            "self.curation",
            Utc::now(),
        )]);
        let store = Arc::new(InMemorySampleStore::new());
        let task = CuratedViewTask::new(Arc::new(amendments), store.clone());
        (task, store, sample)
    }

    #[test]
    fn test_persists_changed_sample() {
        let (view, store, sample) = fixture();
        let result = view.process(&sample, &CancellationToken::new()).unwrap();
        assert_eq!(result, TaskResult::success("SAMEA7", 1));

        let stored = store.get("SAMEA7").unwrap().unwrap();
        assert!(stored
            .attributes
            .contains(&Attribute::new("Organism", "Homo sapiens")));
        assert!(stored.reviewed.is_some());
    }

    #[test]
    fn test_other_domains_filtered_out() {
        let (view, store, sample) = fixture();
        let view = view.with_domains(vec!["self.other".to_string()]);
        let result = view.process(&sample, &CancellationToken::new()).unwrap();
        assert_eq!(result.change_count, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unaccessioned_sample_fails() {
        let (view, _, _) = fixture();
        let draft = Sample::new("draft", Utc::now());
        assert!(view.process(&draft, &CancellationToken::new()).is_err());
    }

    #[test]
    fn test_cancelled_task_does_not_persist() {
        let (view, store, sample) = fixture();
        let token = CancellationToken::new();
        token.cancel();
        assert!(view.process(&sample, &token).is_err());
        assert!(store.is_empty());
    }
}
