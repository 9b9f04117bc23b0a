use std::{path::Path, time::Instant};

use common::{
    error::AppError,
    storage::types::{
        discovered_files::DiscoveredFiles,
        ingestion_summary::{FileResult, IngestionSummary},
    },
    utils::indexing::{DocumentMetadata, DocumentPayload},
};
use futures::{stream, StreamExt};
use tracing::{info, instrument, warn};

use super::super::{
    config::IngestionConfig,
    context::PipelineContext,
    services::PipelineServices,
    state::{Discovered, IngestionMachine, Ingested},
};
use super::{map_guard_error, StageResult};

/// Submit every discovered file, batch by batch, and summarise the outcome.
///
/// Never fails as a whole: a file that cannot be read, is not UTF-8, or is
/// rejected by the service becomes a failed [`FileResult`] and the run moves
/// on. Nothing is retried.
#[instrument(
    skip_all,
    fields(
        files = files.len(),
        batch_size = config.batch_size.get(),
        collection = %config.collection_name
    )
)]
pub async fn ingest_files(
    services: &dyn PipelineServices,
    config: &IngestionConfig,
    files: &DiscoveredFiles,
) -> IngestionSummary {
    let batches = files.batch_count(config.batch_size);
    info!(
        files = files.len(),
        batches,
        collection = %config.collection_name,
        "processing files in batches"
    );

    let mut results = Vec::with_capacity(files.len());
    for (index, batch) in files.batches(config.batch_size).enumerate() {
        info!(
            batch = index.saturating_add(1),
            batches,
            files = batch.len(),
            "processing batch"
        );

        // `buffered` yields in input order, so results stay in discovery order.
        let outcomes: Vec<FileResult> = stream::iter(
            batch
                .iter()
                .map(|path| ingest_file(services, config, path)),
        )
        .buffered(config.tuning.ingest_concurrency.get())
        .collect()
        .await;

        results.extend(outcomes);
    }

    let summary = IngestionSummary::from_results(results);
    info!(
        successful = summary.successful,
        failed = summary.failed,
        total = summary.total,
        "ingestion finished"
    );

    summary
}

async fn ingest_file(
    services: &dyn PipelineServices,
    config: &IngestionConfig,
    path: &Path,
) -> FileResult {
    let file = path.display().to_string();

    match submit_file(services, config, path).await {
        Ok(document_id) => {
            info!(file = %file, document_id = %document_id, "document ingested");
            FileResult::succeeded(file, document_id)
        }
        Err(err) => {
            warn!(file = %file, error = %err, "document ingestion failed");
            FileResult::failed(file, err.to_string())
        }
    }
}

async fn submit_file(
    services: &dyn PipelineServices,
    config: &IngestionConfig,
    path: &Path,
) -> Result<String, AppError> {
    let raw = tokio::fs::read(path).await?;
    let content = String::from_utf8(raw)?;

    let payload = DocumentPayload {
        content,
        metadata: DocumentMetadata {
            source: config.source_tag.clone(),
            file_path: path.display().to_string(),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        },
    };

    services
        .submit_document(&config.collection_name, &payload)
        .await
}

pub async fn ingest(
    machine: IngestionMachine<(), Discovered>,
    ctx: &mut PipelineContext<'_>,
) -> StageResult<Ingested> {
    let started = Instant::now();

    let summary = ingest_files(ctx.services, ctx.pipeline_config, ctx.discovered()?).await;
    ctx.persist(&summary).await?;
    ctx.summary = Some(summary);

    ctx.record_stage_duration("ingest", started.elapsed());

    machine
        .ingest()
        .map_err(|(_, guard)| map_guard_error("ingest", &guard))
}
