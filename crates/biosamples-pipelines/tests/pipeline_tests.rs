//! Runner, pool and allocator working together

mod common;

use biosamples_common::types::Sample;
use biosamples_pipelines::accession::{
    AccessionAllocator, AllocatorConfig, InMemorySampleStore, SampleStore,
};
use biosamples_pipelines::executor::{AdaptivePool, PoolConfig, ShutdownOutcome};
use biosamples_pipelines::pipeline::{PipelineRunner, RunnerConfig, Task, TaskResult};
use biosamples_pipelines::tasks::{AccessionTask, CuratedViewTask, InMemoryAmendmentSource};
use biosamples_pipelines::PipelineError;
use chrono::Utc;
use common::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn runner(name: &str, workers: usize, max_in_flight: usize) -> PipelineRunner {
    let pool = AdaptivePool::new(name, quiet_pool_config(workers)).unwrap();
    PipelineRunner::new(
        pool,
        RunnerConfig {
            pipeline_name: name.to_string(),
            max_in_flight,
            ..RunnerConfig::default()
        },
    )
}

fn allocator_config() -> AllocatorConfig {
    AllocatorConfig {
        prefix: "SAMEA".to_string(),
        minimum: 1000,
        queue_size: 16,
        refill_interval: Duration::from_millis(2),
    }
}

#[test]
fn test_curated_view_pipeline_over_many_samples() {
    init_tracing();

    let samples: Vec<Sample> = (0..50)
        .map(|i| {
            let mut sample = scenario_sample();
            sample.accession = Some(format!("SAMEA{i}"));
            sample
        })
        .collect();
    // every even sample carries the scenario's amendments
    let amendments = (0..50).step_by(2).flat_map(|i| {
        scenario_amendments().into_iter().map(move |mut a| {
            a.sample = format!("SAMEA{i}");
            a
        })
    });

    let store = Arc::new(InMemorySampleStore::new());
    let view = CuratedViewTask::new(
        Arc::new(InMemoryAmendmentSource::new(amendments)),
        store.clone(),
    );

    let summary = runner("curated-view", 4, 0)
        .run(samples.into_iter().map(Ok), |s| view.task(s))
        .unwrap();

    assert_eq!(summary.records_processed, 50);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total_changes, 25 * 6);
    assert_eq!(store.len(), 25);

    let curated = store.get("SAMEA10").unwrap().unwrap();
    assert_eq!(values_of(&curated, "A"), vec!["Bos taurus"]);
    assert_eq!(values_of(&curated, "Domain"), vec!["domain-c"]);
    assert!(store.get("SAMEA11").unwrap().is_none());
}

#[test]
fn test_accession_pipeline_assigns_unique_accessions() {
    init_tracing();

    let store = Arc::new(InMemorySampleStore::new());
    let allocator = Arc::new(AccessionAllocator::start(store.clone(), allocator_config()).unwrap());
    let task = AccessionTask::new(allocator.clone());

    let drafts = (0..120).map(|i| Ok(Sample::new(format!("draft-{i}"), Utc::now())));
    let summary = runner("accession", 6, 32)
        .run(drafts, |s| task.task(s))
        .unwrap();
    allocator.shutdown();

    assert_eq!(summary.records_processed, 120);
    assert_eq!(summary.total_changes, 120);
    assert_eq!(summary.failed, 0);

    let accessions: HashSet<String> = store
        .samples()
        .into_iter()
        .filter_map(|s| s.accession)
        .collect();
    assert_eq!(accessions.len(), 120);
    assert!(accessions.iter().all(|a| a.starts_with("SAMEA")));
}

#[test]
fn test_competing_allocators_never_duplicate() {
    init_tracing();

    // two allocators walking the same counter range against one store
    let store = Arc::new(InMemorySampleStore::new());
    let first = Arc::new(AccessionAllocator::start(store.clone(), allocator_config()).unwrap());
    let second = Arc::new(AccessionAllocator::start(store.clone(), allocator_config()).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let allocator = if t % 2 == 0 {
                Arc::clone(&first)
            } else {
                Arc::clone(&second)
            };
            thread::spawn(move || {
                (0..40)
                    .map(|i| {
                        allocator
                            .allocate(&Sample::new(format!("t{t}-{i}"), Utc::now()))
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
    let unique: HashSet<&String> = all.iter().collect();

    assert_eq!(all.len(), 240);
    assert_eq!(unique.len(), 240);
    assert_eq!(store.len(), 240);
    assert!(all.iter().all(|a| store.exists(a).unwrap()));
}

#[test]
fn test_source_failure_after_partial_progress() {
    init_tracing();

    let source = (0..30).map(|i| {
        if i == 20 {
            Err(anyhow::anyhow!("connection reset while paging samples"))
        } else {
            Ok(Sample::new(format!("s{i}"), Utc::now()).with_accession(format!("SAMEA{i}")))
        }
    });
    let result = runner("broken-source", 2, 0).run(source, |s: Sample| -> Task {
        Arc::new(move |_: &CancellationToken| -> anyhow::Result<TaskResult> {
            Ok(TaskResult::success(s.identifier(), 1))
        })
    });

    assert!(matches!(result, Err(PipelineError::Source(_))));
}

#[test]
fn test_failed_tasks_reported_in_summary() {
    init_tracing();

    let samples = (0..40).map(|i| Ok(Sample::new(format!("s{i}"), Utc::now())));
    let summary = runner("flaky", 3, 8)
        .run(samples, |s: Sample| -> Task {
            Arc::new(move |_: &CancellationToken| -> anyhow::Result<TaskResult> {
                if s.name.ends_with('7') {
                    anyhow::bail!("cannot process {}", s.name);
                }
                Ok(TaskResult::success(s.identifier(), 1))
            })
        })
        .unwrap();

    assert_eq!(summary.records_processed, 40);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.succeeded(), 36);
    assert_eq!(summary.total_changes, 36);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["failed"], 4);
    assert_eq!(json["pipeline"], "flaky");
}

#[test]
fn test_monitored_pool_keeps_a_worker_under_load() {
    init_tracing();

    let mut pool = AdaptivePool::new(
        "monitored",
        PoolConfig {
            queue_capacity: 4,
            poll_interval: Duration::from_millis(10),
            fair: false,
            initial_workers: 1,
            max_workers: 4,
            shutdown_timeout: Duration::from_secs(10),
        },
    )
    .unwrap();

    let mut handles = Vec::new();
    for i in 0..200u64 {
        handles.push(
            pool.submit(move || {
                thread::sleep(Duration::from_micros(200));
                i
            })
            .unwrap(),
        );
        let workers = pool.worker_count();
        assert!((1..=4).contains(&workers), "worker count {workers} out of bounds");
    }

    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, (0..200u64).sum::<u64>());
    assert_eq!(pool.close(), ShutdownOutcome::Completed);
    assert!(pool.worker_count() >= 1);
}
