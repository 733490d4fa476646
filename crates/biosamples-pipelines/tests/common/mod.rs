//! Shared fixtures for the pipeline integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use biosamples_common::types::{Amendment, Attribute, Patch, Sample};
use biosamples_pipelines::executor::PoolConfig;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Route tracing output through the test harness so it only shows for
/// failing tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 10, 0, 0).unwrap()
}

pub fn attr(key: &str, value: &str) -> Attribute {
    Attribute::new(key, value)
}

pub fn amend(
    accession: &str,
    pre: Option<Attribute>,
    post: Option<Attribute>,
    domain: &str,
    offset_secs: i64,
) -> Amendment {
    Amendment::new(
        accession,
        Patch::attribute(pre, post).unwrap(),
        domain,
        t0() + Duration::seconds(offset_secs),
    )
}

/// Base sample of the end-to-end curation scenario
pub fn scenario_sample() -> Sample {
    Sample::new("scenario", t0() - Duration::days(30))
        .with_accession("SAMEA1")
        .with_attribute(attr("A", "9606"))
        .with_attribute(attr("Weird", "weird value"))
        .with_attribute(attr("Domain", "domain-a"))
}

/// Amendment chain of the end-to-end curation scenario, in time order
pub fn scenario_amendments() -> Vec<Amendment> {
    vec![
        amend("SAMEA1", Some(attr("A", "9606")), Some(attr("A", "Homo sapiens")), "self.a", 0),
        amend(
            "SAMEA1",
            Some(attr("A", "Homo sapiens")),
            Some(attr("A", "Bos taurus")),
            "self.b",
            5,
        ),
        amend("SAMEA1", Some(attr("Weird", "weird value")), None, "self.a", 10),
        amend("SAMEA1", None, Some(attr("NewField", "new value")), "self.c", 15),
        amend(
            "SAMEA1",
            Some(attr("Domain", "domain-a")),
            Some(attr("Domain", "domain-b")),
            "self.a",
            20,
        ),
        amend(
            "SAMEA1",
            Some(attr("Domain", "domain-a")),
            Some(attr("Domain", "domain-c")),
            "self.b",
            25,
        ),
    ]
}

/// Small pool whose monitor never fires during a test
pub fn quiet_pool_config(workers: usize) -> PoolConfig {
    PoolConfig {
        queue_capacity: 8,
        poll_interval: std::time::Duration::from_secs(3600),
        fair: true,
        initial_workers: workers,
        max_workers: workers,
        shutdown_timeout: std::time::Duration::from_secs(10),
    }
}

pub fn values_of<'a>(sample: &'a Sample, key: &'a str) -> Vec<&'a str> {
    sample
        .attributes_of_type(key)
        .map(|a| a.value.as_str())
        .collect()
}
