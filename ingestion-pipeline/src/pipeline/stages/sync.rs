use std::{path::Path, time::Instant};

use common::{
    error::AppError, storage::store::partition_directory_markers, utils::config::SourceKind,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::super::{
    context::PipelineContext,
    services::PipelineServices,
    state::{IngestionMachine, Ready, Synced},
};
use super::{map_guard_error, StageResult};
use crate::utils::object_keys::relative_key;

/// What a bucket sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Non-empty listing pages consumed.
    pub pages: usize,
    pub listed: usize,
    pub downloaded: usize,
    /// Directory markers and keys that cannot be mapped under the destination.
    pub skipped: usize,
    pub bytes: u64,
}

/// Mirror every object under `prefix` into `destination`.
///
/// The listing is consumed to its last page before anything is downloaded.
/// Any listing or download error aborts the sync; local files that no longer
/// exist remotely are left alone.
#[instrument(skip_all, fields(prefix = %prefix, destination = %destination.display()))]
pub async fn sync_objects(
    services: &dyn PipelineServices,
    prefix: &str,
    destination: &Path,
) -> Result<SyncReport, AppError> {
    tokio::fs::create_dir_all(destination).await?;

    let mut report = SyncReport::default();
    let mut listed = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = services.list_objects(prefix, token.as_deref()).await?;
        if !page.objects.is_empty() {
            report.pages = report.pages.saturating_add(1);
        }
        debug!(
            page = report.pages,
            objects = page.objects.len(),
            "received listing page"
        );
        listed.extend(page.objects);

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    report.listed = listed.len();
    if listed.is_empty() {
        info!("no objects found under prefix");
        return Ok(report);
    }

    let (objects, markers) = partition_directory_markers(listed);
    report.skipped = markers.len();

    for object in objects {
        let Some(relative) = relative_key(&object.key, prefix) else {
            warn!(key = %object.key, "skipping key that does not map below the destination");
            report.skipped = report.skipped.saturating_add(1);
            continue;
        };

        let local = destination.join(relative);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(key = %object.key, path = %local.display(), "downloading object");
        let written = services.download_object(&object.key, &local).await?;

        report.downloaded = report.downloaded.saturating_add(1);
        report.bytes = report.bytes.saturating_add(written);
    }

    info!(
        pages = report.pages,
        downloaded = report.downloaded,
        skipped = report.skipped,
        bytes = report.bytes,
        "object sync finished"
    );

    Ok(report)
}

pub async fn synchronize(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> StageResult<Synced> {
    let started = Instant::now();

    if ctx.pipeline_config.source == SourceKind::Local {
        info!(
            documents_path = %ctx.pipeline_config.documents_path.display(),
            "local source configured; skipping object sync"
        );
    } else {
        let report = sync_objects(
            ctx.services,
            &ctx.pipeline_config.s3_prefix,
            &ctx.pipeline_config.documents_path,
        )
        .await?;
        ctx.sync_report = Some(report);
    }

    ctx.record_stage_duration("sync", started.elapsed());

    machine
        .synchronize()
        .map_err(|(_, guard)| map_guard_error("synchronize", &guard))
}
