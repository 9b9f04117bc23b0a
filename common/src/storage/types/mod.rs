use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

pub mod discovered_files;
pub mod ingestion_summary;
pub mod verification;

/// A document one pipeline stage writes to disk for the next stage to read.
pub trait StageArtifact: Serialize + DeserializeOwned {
    /// File name used inside the artifacts directory.
    const FILE_NAME: &'static str;
}

/// Write an artifact as pretty JSON, creating parent directories as needed.
pub async fn persist_artifact<T: StageArtifact>(artifact: &T, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec_pretty(artifact)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub async fn load_artifact<T: StageArtifact>(path: &Path) -> Result<T, AppError> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}
