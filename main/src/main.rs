mod args;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use common::{
    storage::{
        store::StorageManager,
        types::{
            discovered_files::DiscoveredFiles, ingestion_summary::IngestionSummary,
            load_artifact, persist_artifact, StageArtifact,
        },
    },
    utils::config::{get_config, AppConfig},
};
use ingestion_pipeline::IngestionPipeline;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{mask_secret, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    // Get config
    let config = get_config().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    run_command(&config, cli.command()).await
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<IngestionPipeline> {
    IngestionPipeline::new(config).context("failed to set up ingestion pipeline")
}

async fn run_command(config: &AppConfig, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Probe => probe(config).await,
        Command::Run => {
            let pipeline = build_pipeline(config)?;
            let outcome = pipeline.run().await.context("ingestion pipeline failed")?;
            if outcome.summary.failed > 0 {
                warn!(
                    failed = outcome.summary.failed,
                    "some documents were not ingested; see the ingestion summary"
                );
            }
            print_json(&outcome.verification)
        }
        Command::Sync => {
            let pipeline = build_pipeline(config)?;
            match pipeline.sync_source().await.context("object sync failed")? {
                Some(report) => print_json(&report),
                None => Ok(()),
            }
        }
        Command::Discover { output } => {
            let pipeline = &build_pipeline(config)?;
            let discovered = pipeline.discover().await.context("discovery failed")?;
            write_output(pipeline, output, &discovered).await?;
            print_json(&discovered)
        }
        Command::Ingest { input, output } => {
            let pipeline = &build_pipeline(config)?;
            let input = artifact_path::<DiscoveredFiles>(pipeline, input)?;
            let discovered: DiscoveredFiles = load_artifact(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let summary = pipeline.ingest(&discovered).await;
            write_output(pipeline, output, &summary).await?;
            print_json(&summary)
        }
        Command::Verify { input } => {
            let pipeline = &build_pipeline(config)?;
            let input = artifact_path::<IngestionSummary>(pipeline, input)?;
            let summary: IngestionSummary = load_artifact(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let report = pipeline
                .verify(&summary)
                .await
                .context("verification failed")?;
            write_output(pipeline, None, &report).await?;
            print_json(&report)
        }
    }
}

/// `explicit` wins; otherwise the artifact's file inside `artifacts_dir`.
fn artifact_path<T: StageArtifact>(
    pipeline: &IngestionPipeline,
    explicit: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(|| pipeline.artifact_path::<T>())
        .with_context(|| {
            format!(
                "no path given for {} and no artifacts_dir configured",
                T::FILE_NAME
            )
        })
}

async fn write_output<T: StageArtifact>(
    pipeline: &IngestionPipeline,
    explicit: Option<PathBuf>,
    artifact: &T,
) -> anyhow::Result<()> {
    let Some(path) = explicit.or_else(|| pipeline.artifact_path::<T>()) else {
        return Ok(());
    };
    persist(&path, artifact).await
}

async fn persist<T: StageArtifact>(path: &Path, artifact: &T) -> anyhow::Result<()> {
    persist_artifact(artifact, path)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "artifact written");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn probe(config: &AppConfig) -> anyhow::Result<()> {
    info!(
        endpoint = %config.s3_endpoint,
        bucket = %config.s3_bucket,
        prefix = %config.s3_prefix,
        access_key = %mask_secret(&config.s3_access_key),
        "probing object storage"
    );

    let storage = StorageManager::new(config).context("failed to configure object storage")?;
    let report = storage
        .probe(&config.s3_prefix)
        .await
        .context("object storage probe failed")?;

    print_json(&report)?;

    if report.objects == 0 {
        bail!(
            "no objects found under prefix {:?} in bucket {:?}",
            config.s3_prefix,
            config.s3_bucket
        );
    }

    info!(
        objects = report.objects,
        bytes = report.bytes,
        "object storage is readable"
    );
    Ok(())
}
