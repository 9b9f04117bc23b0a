use std::time::Instant;

use chrono::Utc;
use common::{
    error::AppError,
    storage::types::{ingestion_summary::IngestionSummary, verification::VerificationReport},
};
use tracing::{info, instrument, warn};

use super::super::{
    context::PipelineContext,
    services::PipelineServices,
    state::{Ingested, IngestionMachine, Verified},
};
use super::{map_guard_error, StageResult};

/// Read the database totals and report them next to the run's own counts.
///
/// The totals are global, so this can only catch a gross shortfall, never
/// which document went missing.
#[instrument(skip_all, fields(total = summary.total))]
pub async fn verify_summary(
    services: &dyn PipelineServices,
    summary: &IngestionSummary,
) -> Result<VerificationReport, AppError> {
    info!(
        successful = summary.successful,
        failed = summary.failed,
        "ingestion results"
    );

    let snapshot = services.verification_snapshot().await?;
    let report = VerificationReport::new(summary, snapshot, Utc::now());

    info!(
        total_documents = snapshot.total_documents,
        total_collections = snapshot.total_collections,
        total_embeddings = snapshot.total_embeddings,
        "database statistics"
    );

    if report.count_anomaly {
        warn!(
            total_documents = snapshot.total_documents,
            successful = summary.successful,
            "database holds fewer documents than were ingested in this run"
        );
    }

    Ok(report)
}

pub async fn verify(
    machine: IngestionMachine<(), Ingested>,
    ctx: &mut PipelineContext<'_>,
) -> StageResult<Verified> {
    let started = Instant::now();

    let report = verify_summary(ctx.services, ctx.summary()?).await?;
    ctx.persist(&report).await?;
    ctx.verification = Some(report);

    ctx.record_stage_duration("verify", started.elapsed());

    machine
        .verify()
        .map_err(|(_, guard)| map_guard_error("verify", &guard))
}
