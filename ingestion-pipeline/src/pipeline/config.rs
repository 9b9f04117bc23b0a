use std::{num::NonZeroUsize, path::PathBuf};

use common::{
    error::AppError,
    utils::config::{AppConfig, SourceKind},
};

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    /// Files of one batch submitted at the same time. Results keep discovery
    /// order whatever the value.
    pub ingest_concurrency: NonZeroUsize,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            ingest_concurrency: NonZeroUsize::MIN,
        }
    }
}

/// Immutable settings handed to every stage of a run.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub source: SourceKind,
    pub s3_prefix: String,
    pub documents_path: PathBuf,
    pub file_extensions: Vec<String>,
    pub collection_name: String,
    pub batch_size: NonZeroUsize,
    pub source_tag: String,
    pub artifacts_dir: Option<PathBuf>,
    pub tuning: IngestionTuning,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Local,
            s3_prefix: String::new(),
            documents_path: PathBuf::from("/tmp/documents"),
            file_extensions: vec![".md".into(), ".txt".into(), ".html".into()],
            collection_name: "default".into(),
            batch_size: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            source_tag: "document-ingestion-pipeline".into(),
            artifacts_dir: None,
            tuning: IngestionTuning::default(),
        }
    }
}

impl IngestionConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Result<Self, AppError> {
        cfg.validate()?;

        let batch_size = NonZeroUsize::new(cfg.batch_size)
            .ok_or_else(|| AppError::Validation("batch_size must be greater than 0".into()))?;
        let ingest_concurrency = NonZeroUsize::new(cfg.ingest_concurrency).ok_or_else(|| {
            AppError::Validation("ingest_concurrency must be greater than 0".into())
        })?;
        let artifacts_dir = (!cfg.artifacts_dir.trim().is_empty())
            .then(|| PathBuf::from(&cfg.artifacts_dir));

        Ok(Self {
            source: cfg.source,
            s3_prefix: cfg.s3_prefix.clone(),
            documents_path: PathBuf::from(&cfg.documents_path),
            file_extensions: cfg
                .file_extensions
                .iter()
                .filter(|ext| !ext.is_empty())
                .cloned()
                .collect(),
            collection_name: cfg.collection_name.clone(),
            batch_size,
            source_tag: cfg.source_tag.clone(),
            artifacts_dir,
            tuning: IngestionTuning { ingest_concurrency },
        })
    }
}
