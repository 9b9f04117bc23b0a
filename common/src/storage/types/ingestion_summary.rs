use serde::{Deserialize, Serialize};

use super::StageArtifact;

/// Outcome of ingesting a single file.
///
/// Exactly one of `document_id` and `error` is set, matching `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub file: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    pub fn succeeded(file: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            success: true,
            document_id: Some(document_id.into()),
            error: None,
        }
    }

    pub fn failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            success: false,
            document_id: None,
            error: Some(error.into()),
        }
    }

    fn is_well_formed(&self) -> bool {
        if self.success {
            self.document_id.is_some() && self.error.is_none()
        } else {
            self.document_id.is_none() && self.error.is_some()
        }
    }
}

/// Aggregate of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<FileResult>,
}

impl IngestionSummary {
    /// Build the summary from per-file results, deriving every count from the list.
    pub fn from_results(results: Vec<FileResult>) -> Self {
        let successful = results.iter().filter(|result| result.success).count();
        let total = results.len();
        Self {
            total,
            successful,
            failed: total.saturating_sub(successful),
            results,
        }
    }

    /// `successful + failed == total == results.len()` and every result is
    /// either a success with an id or a failure with an error.
    ///
    /// Summaries read back from disk are checked with this before use.
    pub fn is_consistent(&self) -> bool {
        let successful = self.results.iter().filter(|result| result.success).count();
        self.total == self.results.len()
            && self.successful == successful
            && self.successful.checked_add(self.failed) == Some(self.total)
            && self.results.iter().all(FileResult::is_well_formed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|result| !result.success)
    }
}

impl StageArtifact for IngestionSummary {
    const FILE_NAME: &'static str = "ingestion_results.json";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_are_derived_from_results() {
        let summary = IngestionSummary::from_results(vec![
            FileResult::succeeded("/docs/a.md", "doc-1"),
            FileResult::failed("/docs/b.md", "HTTP 500: boom"),
            FileResult::succeeded("/docs/c.md", "doc-3"),
        ]);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.is_consistent());
        assert_eq!(
            summary.failures().map(|r| r.file.as_str()).collect::<Vec<_>>(),
            vec!["/docs/b.md"]
        );
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = IngestionSummary::from_results(Vec::new());
        assert_eq!(summary, IngestionSummary::default());
        assert!(summary.is_consistent());
    }

    #[test]
    fn tampered_counts_are_detected() {
        let mut summary = IngestionSummary::from_results(vec![
            FileResult::succeeded("/docs/a.md", "doc-1"),
            FileResult::failed("/docs/b.md", "boom"),
        ]);
        summary.failed = 0;
        assert!(!summary.is_consistent());

        let mut summary = IngestionSummary::from_results(vec![FileResult::succeeded(
            "/docs/a.md",
            "doc-1",
        )]);
        if let Some(result) = summary.results.first_mut() {
            result.error = Some("also failed?".into());
        }
        assert!(!summary.is_consistent());
    }

    #[test]
    fn serialized_shape_omits_absent_fields() {
        let summary = IngestionSummary::from_results(vec![
            FileResult::succeeded("/docs/a.md", "doc-1"),
            FileResult::failed("/docs/b.md", "boom"),
        ]);

        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(
            value,
            json!({
                "total": 2,
                "successful": 1,
                "failed": 1,
                "results": [
                    {"file": "/docs/a.md", "success": true, "document_id": "doc-1"},
                    {"file": "/docs/b.md", "success": false, "error": "boom"}
                ]
            })
        );
    }
}
