use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ingestion_summary::IngestionSummary, StageArtifact};

/// Global counts read from the indexing database. Not scoped to any run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub total_documents: i64,
    pub total_collections: i64,
    pub total_embeddings: i64,
}

/// The database snapshot reported next to the run's own counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub snapshot: VerificationSnapshot,
    pub checked_at: DateTime<Utc>,
    /// The database holds fewer documents than this run reported as ingested.
    pub count_anomaly: bool,
}

impl VerificationReport {
    pub fn new(
        summary: &IngestionSummary,
        snapshot: VerificationSnapshot,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let successful = i64::try_from(summary.successful).unwrap_or(i64::MAX);
        Self {
            total: summary.total,
            successful: summary.successful,
            failed: summary.failed,
            snapshot,
            checked_at,
            count_anomaly: snapshot.total_documents < successful,
        }
    }
}

impl StageArtifact for VerificationReport {
    const FILE_NAME: &'static str = "verification.json";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::ingestion_summary::FileResult;

    fn summary(successes: usize, failures: usize) -> IngestionSummary {
        let results = (0..successes)
            .map(|i| FileResult::succeeded(format!("/docs/ok-{i}.md"), format!("doc-{i}")))
            .chain((0..failures).map(|i| FileResult::failed(format!("/docs/bad-{i}.md"), "boom")))
            .collect();
        IngestionSummary::from_results(results)
    }

    #[test]
    fn report_carries_summary_counts_and_snapshot() {
        let snapshot = VerificationSnapshot {
            total_documents: 120,
            total_collections: 3,
            total_embeddings: 4_800,
        };
        let report = VerificationReport::new(&summary(2, 1), snapshot, Utc::now());

        assert_eq!(report.total, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.snapshot, snapshot);
        assert!(!report.count_anomaly);
    }

    #[test]
    fn fewer_documents_than_successes_is_flagged() {
        let snapshot = VerificationSnapshot {
            total_documents: 1,
            total_collections: 1,
            total_embeddings: 10,
        };
        let report = VerificationReport::new(&summary(2, 0), snapshot, Utc::now());
        assert!(report.count_anomaly);
    }

    #[test]
    fn empty_run_against_empty_database_is_not_anomalous() {
        let report =
            VerificationReport::new(&summary(0, 0), VerificationSnapshot::default(), Utc::now());
        assert!(!report.count_anomaly);
        assert_eq!(report.total, 0);
    }
}
