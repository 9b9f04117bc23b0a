use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::types::{
        discovered_files::DiscoveredFiles, ingestion_summary::IngestionSummary, persist_artifact,
        verification::VerificationReport, StageArtifact,
    },
};
use tracing::{debug, error};

use super::{config::IngestionConfig, services::PipelineServices, stages::SyncReport};

/// Every artifact a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// `None` when the run ingested a local source.
    pub sync: Option<SyncReport>,
    pub discovered: DiscoveredFiles,
    pub summary: IngestionSummary,
    pub verification: VerificationReport,
}

pub struct PipelineContext<'a> {
    pub started_at: DateTime<Utc>,
    pub pipeline_config: &'a IngestionConfig,
    pub services: &'a dyn PipelineServices,
    pub sync_report: Option<SyncReport>,
    pub discovered: Option<DiscoveredFiles>,
    pub summary: Option<IngestionSummary>,
    pub verification: Option<VerificationReport>,
    stage_durations: Vec<(&'static str, Duration)>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(pipeline_config: &'a IngestionConfig, services: &'a dyn PipelineServices) -> Self {
        Self {
            started_at: Utc::now(),
            pipeline_config,
            services,
            sync_report: None,
            discovered: None,
            summary: None,
            verification: None,
            stage_durations: Vec::new(),
        }
    }

    pub fn discovered(&self) -> Result<&DiscoveredFiles, AppError> {
        self.discovered.as_ref().ok_or_else(|| {
            AppError::InternalError("discovered files expected to be available".into())
        })
    }

    pub fn summary(&self) -> Result<&IngestionSummary, AppError> {
        self.summary.as_ref().ok_or_else(|| {
            AppError::InternalError("ingestion summary expected to be available".into())
        })
    }

    pub fn record_stage_duration(&mut self, stage: &'static str, elapsed: Duration) {
        self.stage_durations.push((stage, elapsed));
    }

    pub fn stage_millis(&self, stage: &str) -> u64 {
        self.stage_durations
            .iter()
            .find(|(name, _)| *name == stage)
            .map_or(0, |(_, elapsed)| {
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            })
    }

    /// Write `artifact` into the artifacts directory, if one is configured.
    pub async fn persist<T: StageArtifact>(&self, artifact: &T) -> Result<Option<PathBuf>, AppError> {
        let Some(dir) = self.pipeline_config.artifacts_dir.as_ref() else {
            return Ok(None);
        };
        let path = dir.join(T::FILE_NAME);
        persist_artifact(artifact, &path).await?;
        debug!(path = %path.display(), "stage artifact written");
        Ok(Some(path))
    }

    pub fn abort(&self, err: AppError) -> AppError {
        error!(
            started_at = %self.started_at,
            completed_stages = self.stage_durations.len(),
            error = %err,
            "ingestion pipeline aborted"
        );
        err
    }

    pub fn into_outcome(self) -> Result<PipelineOutcome, AppError> {
        let missing =
            |what: &str| AppError::InternalError(format!("{what} expected to be available"));

        Ok(PipelineOutcome {
            sync: self.sync_report,
            discovered: self.discovered.ok_or_else(|| missing("discovered files"))?,
            summary: self.summary.ok_or_else(|| missing("ingestion summary"))?,
            verification: self
                .verification
                .ok_or_else(|| missing("verification report"))?,
        })
    }
}
