use std::{
    num::NonZeroUsize,
    path::PathBuf,
    slice::Chunks,
};

use serde::{Deserialize, Serialize};

use super::StageArtifact;

/// Files found by discovery, in discovery order. Serialized as a plain JSON
/// list of path strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveredFiles {
    paths: Vec<PathBuf>,
}

impl DiscoveredFiles {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Contiguous, non-overlapping slices of at most `batch_size` paths. Only
    /// the last batch may be short.
    pub fn batches(&self, batch_size: NonZeroUsize) -> Chunks<'_, PathBuf> {
        self.paths.chunks(batch_size.get())
    }

    pub fn batch_count(&self, batch_size: NonZeroUsize) -> usize {
        self.paths.len().div_ceil(batch_size.get())
    }
}

impl StageArtifact for DiscoveredFiles {
    const FILE_NAME: &'static str = "discovered_files.json";
}
