//! BioSamples Pipelines - batch pipeline runner

use anyhow::{Context, Result};
use biosamples_common::logging::{init_logging, LogConfig, LogLevel};
use biosamples_common::types::{Amendment, Sample};
use biosamples_pipelines::accession::{AccessionAllocator, InMemorySampleStore};
use biosamples_pipelines::config::PipelinesConfig;
use biosamples_pipelines::pipeline::{PipelineRunner, RunSummary};
use biosamples_pipelines::tasks::{
    register_existing, AccessionTask, CuratedViewTask, InMemoryAmendmentSource, JsonLines,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "biosamples-pipelines")]
#[command(author, version, about = "BioSamples batch pipelines")]
struct Cli {
    #[command(subcommand)]
    pipeline: Pipeline,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Pipeline {
    /// Resolve samples against their amendments and write the curated view
    CuratedView {
        /// Samples, one JSON document per line
        #[arg(short, long)]
        samples: PathBuf,

        /// Amendments, one JSON document per line
        #[arg(short, long)]
        amendments: PathBuf,

        /// Where to write curated samples (JSON lines)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only apply amendments from this domain (repeatable)
        #[arg(short, long = "domain")]
        domains: Vec<String>,
    },

    /// Assign accessions to samples that lack one
    Accession {
        /// Samples, one JSON document per line
        #[arg(short, long)]
        samples: PathBuf,

        /// Where to write accessioned samples (JSON lines)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("biosamples-pipelines")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let config = PipelinesConfig::from_env()?;

    let summary = match cli.pipeline {
        Pipeline::CuratedView {
            samples,
            amendments,
            output,
            domains,
        } => curated_view(&config, &samples, &amendments, output.as_deref(), domains)?,
        Pipeline::Accession { samples, output } => {
            accession(&config, &samples, output.as_deref())?
        },
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn read_samples(path: &Path) -> Result<JsonLines<impl BufRead, Sample>> {
    Ok(JsonLines::new(open(path)?))
}

fn write_samples(path: &Path, samples: &[Sample]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!(path = %path.display(), samples = samples.len(), "Wrote samples");
    Ok(())
}

fn curated_view(
    config: &PipelinesConfig,
    samples: &Path,
    amendments: &Path,
    output: Option<&Path>,
    domains: Vec<String>,
) -> Result<RunSummary> {
    let amendments: Vec<Amendment> = JsonLines::new(open(amendments)?)
        .collect::<Result<_>>()
        .context("Failed to load amendments")?;
    info!(amendments = amendments.len(), "Loaded amendments");

    let store = Arc::new(InMemorySampleStore::new());
    let mut view = CuratedViewTask::new(
        Arc::new(InMemoryAmendmentSource::new(amendments)),
        store.clone(),
    );
    let domains = if domains.is_empty() {
        config.curation_domains.clone()
    } else {
        Some(domains)
    };
    if let Some(domains) = domains {
        view = view.with_domains(domains);
    }

    let runner = PipelineRunner::from_config(config, "curated-view")?;
    let summary = runner.run(read_samples(samples)?, |sample| view.task(sample))?;

    if let Some(output) = output {
        write_samples(output, &store.samples())?;
    }
    Ok(summary)
}

fn accession(config: &PipelinesConfig, samples: &Path, output: Option<&Path>) -> Result<RunSummary> {
    // existing accessions go in first so the allocator can never reissue them
    let store = Arc::new(InMemorySampleStore::new());
    register_existing(store.as_ref(), read_samples(samples)?)?;

    let allocator = Arc::new(AccessionAllocator::start(
        store.clone(),
        config.allocator_config(),
    )?);
    let task = AccessionTask::new(Arc::clone(&allocator));

    let runner = PipelineRunner::from_config(config, "accession")?;
    let summary = runner.run(read_samples(samples)?, |sample| task.task(sample))?;
    allocator.shutdown();

    if let Some(output) = output {
        write_samples(output, &store.samples())?;
    }
    Ok(summary)
}
