mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
pub use context::PipelineOutcome;
pub use services::{DefaultPipelineServices, PipelineServices};
pub use stages::SyncReport;

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::types::{
        discovered_files::DiscoveredFiles, ingestion_summary::IngestionSummary,
        verification::VerificationReport, StageArtifact,
    },
    utils::config::{AppConfig, SourceKind},
};
use tracing::info;

use self::{
    context::PipelineContext,
    stages::{
        discover, discover_documents, ingest, ingest_files, sync_objects, synchronize, verify,
        verify_summary,
    },
    state::ready,
};

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    pipeline_config: IngestionConfig,
    services: Arc<dyn PipelineServices>,
}

impl IngestionPipeline {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let pipeline_config = IngestionConfig::from_app_config(config)?;
        let services = DefaultPipelineServices::new(config)?;

        Ok(Self::with_services(pipeline_config, Arc::new(services)))
    }

    pub fn with_services(
        pipeline_config: IngestionConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            pipeline_config,
            services,
        }
    }

    /// Where the artifact of type `T` lives inside the artifacts directory.
    pub fn artifact_path<T: StageArtifact>(&self) -> Option<PathBuf> {
        self.pipeline_config
            .artifacts_dir
            .as_ref()
            .map(|dir| dir.join(T::FILE_NAME))
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Run sync, discovery, ingestion and verification back to back.
    ///
    /// Per-file failures end up in the summary; only sync, artifact and
    /// database errors abort the run.
    #[tracing::instrument(
        skip_all,
        fields(
            source = ?self.pipeline_config.source,
            collection = %self.pipeline_config.collection_name
        )
    )]
    pub async fn run(&self) -> Result<PipelineOutcome, AppError> {
        let mut ctx = PipelineContext::new(&self.pipeline_config, self.services.as_ref());

        let machine = ready();
        let pipeline_started = Instant::now();

        let machine = synchronize(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let machine = discover(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let machine = ingest(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let _machine = verify(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;

        info!(
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            sync_ms = ctx.stage_millis("sync"),
            discover_ms = ctx.stage_millis("discover"),
            ingest_ms = ctx.stage_millis("ingest"),
            verify_ms = ctx.stage_millis("verify"),
            "ingestion pipeline finished"
        );

        ctx.into_outcome()
    }

    /// Sync the bucket into the documents path. Returns `None` for local sources.
    pub async fn sync_source(&self) -> Result<Option<SyncReport>, AppError> {
        if self.pipeline_config.source == SourceKind::Local {
            info!("local source configured; nothing to sync");
            return Ok(None);
        }

        sync_objects(
            self.services.as_ref(),
            &self.pipeline_config.s3_prefix,
            &self.pipeline_config.documents_path,
        )
        .await
        .map(Some)
    }

    pub async fn discover(&self) -> Result<DiscoveredFiles, AppError> {
        discover_documents(&self.pipeline_config).await
    }

    pub async fn ingest(&self, files: &DiscoveredFiles) -> IngestionSummary {
        ingest_files(self.services.as_ref(), &self.pipeline_config, files).await
    }

    /// Summaries read back from disk are checked for consistent counts first.
    pub async fn verify(&self, summary: &IngestionSummary) -> Result<VerificationReport, AppError> {
        if !summary.is_consistent() {
            return Err(AppError::Validation(format!(
                "ingestion summary counts do not add up: total={} successful={} failed={} results={}",
                summary.total,
                summary.successful,
                summary.failed,
                summary.results.len()
            )));
        }

        verify_summary(self.services.as_ref(), summary).await
    }
}
