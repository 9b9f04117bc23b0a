use std::path::Path;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::{DbSettings, PostgresClient},
        store::{ObjectPage, StorageManager},
        types::verification::VerificationSnapshot,
    },
    utils::{
        config::{AppConfig, SourceKind},
        indexing::{DocumentPayload, IndexingClient},
    },
};

/// Everything the pipeline does outside its own process.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    /// One page of the bucket listing under `prefix`, resuming after `after`.
    async fn list_objects(&self, prefix: &str, after: Option<&str>)
        -> Result<ObjectPage, AppError>;

    /// Copy one object to `destination`, returning the number of bytes written.
    async fn download_object(&self, key: &str, destination: &Path) -> Result<u64, AppError>;

    /// Hand one document to the indexing service, returning its document id.
    async fn submit_document(
        &self,
        collection: &str,
        payload: &DocumentPayload,
    ) -> Result<String, AppError>;

    async fn verification_snapshot(&self) -> Result<VerificationSnapshot, AppError>;
}

pub struct DefaultPipelineServices {
    storage: Option<StorageManager>,
    indexing: IndexingClient,
    db: DbSettings,
}

impl DefaultPipelineServices {
    /// Object storage is only set up when the run reads from S3.
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let storage = match config.source {
            SourceKind::S3 => Some(StorageManager::new(config)?),
            SourceKind::Local => None,
        };

        Ok(Self::with_parts(
            storage,
            IndexingClient::from_config(config)?,
            DbSettings::from_config(config),
        ))
    }

    pub fn with_parts(
        storage: Option<StorageManager>,
        indexing: IndexingClient,
        db: DbSettings,
    ) -> Self {
        Self {
            storage,
            indexing,
            db,
        }
    }

    fn storage(&self) -> Result<&StorageManager, AppError> {
        self.storage.as_ref().ok_or_else(|| {
            AppError::InternalError("object storage is not configured for a local source".into())
        })
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn list_objects(
        &self,
        prefix: &str,
        after: Option<&str>,
    ) -> Result<ObjectPage, AppError> {
        self.storage()?.list_page(prefix, after).await
    }

    async fn download_object(&self, key: &str, destination: &Path) -> Result<u64, AppError> {
        self.storage()?.download_to(key, destination).await
    }

    async fn submit_document(
        &self,
        collection: &str,
        payload: &DocumentPayload,
    ) -> Result<String, AppError> {
        self.indexing.submit(collection, payload).await
    }

    async fn verification_snapshot(&self) -> Result<VerificationSnapshot, AppError> {
        let client = PostgresClient::connect(&self.db).await?;
        client.snapshot().await
    }
}
