use std::time::Instant;

use common::{error::AppError, storage::types::discovered_files::DiscoveredFiles};
use tracing::{info, instrument};

use super::super::{
    config::IngestionConfig,
    context::PipelineContext,
    state::{Discovered, IngestionMachine, Synced},
};
use super::{map_guard_error, StageResult};
use crate::utils::discovery::discover_files;

/// Walk the documents path on the blocking pool and collect matching files.
#[instrument(skip_all, fields(root = %config.documents_path.display()))]
pub async fn discover_documents(config: &IngestionConfig) -> Result<DiscoveredFiles, AppError> {
    let root = config.documents_path.clone();
    let extensions = config.file_extensions.clone();

    let paths = tokio::task::spawn_blocking(move || discover_files(&root, &extensions)).await??;

    info!(
        files = paths.len(),
        extensions = ?config.file_extensions,
        "discovered files"
    );

    Ok(DiscoveredFiles::new(paths))
}

pub async fn discover(
    machine: IngestionMachine<(), Synced>,
    ctx: &mut PipelineContext<'_>,
) -> StageResult<Discovered> {
    let started = Instant::now();

    let discovered = discover_documents(ctx.pipeline_config).await?;
    ctx.persist(&discovered).await?;
    ctx.discovered = Some(discovered);

    ctx.record_stage_duration("discover", started.elapsed());

    machine
        .discover()
        .map_err(|(_, guard)| map_guard_error("discover", &guard))
}
