use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::ledger::JobId;
use crate::transform::TransformSummary;

/// Contents of `<filename>.report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(flatten)]
    pub summary: TransformSummary,
    pub job_id: JobId,
    pub filename: String,
    pub transform: String,
    pub processed_at: DateTime<Utc>,
}

impl Report {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// How a single job ended.
#[derive(Debug)]
pub enum JobOutcome {
    Done(Report),
    Failed(JobError),
}

impl JobOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, JobOutcome::Done(_))
    }
}

/// What `Worker::run_once` did with the job it dequeued.
#[derive(Debug)]
pub struct JobReport {
    pub job_id: JobId,
    pub filename: String,
    pub outcome: JobOutcome,
    /// False when the ledger write failed and the outcome is held for retry.
    pub recorded: bool,
}

/// A decided outcome whose ledger write has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Finalize {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingFinalize {
    pub job_id: JobId,
    pub finalize: Finalize,
}

impl From<&JobOutcome> for Finalize {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Done(_) => Finalize::Success,
            JobOutcome::Failed(err) => Finalize::Failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn sample_report() -> Report {
        Report {
            summary: TransformSummary {
                input_rows: 3,
                output_rows: 2,
                dropped_rows: 1,
                columns: 2,
            },
            job_id: 7,
            filename: "sales.csv".to_string(),
            transform: "clean-rows".to_string(),
            processed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_report_fields_are_flat() {
        let bytes = sample_report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["input_rows"], 3);
        assert_eq!(value["output_rows"], 2);
        assert_eq!(value["dropped_rows"], 1);
        assert_eq!(value["columns"], 2);
        assert_eq!(value["job_id"], 7);
        assert_eq!(value["filename"], "sales.csv");
        assert_eq!(value["transform"], "clean-rows");
        assert_eq!(value["processed_at"], "2024-05-01T12:00:00Z");
        assert!(bytes.ends_with(b"\n"));
    }

    #[test]
    fn test_report_reads_back() {
        let report = sample_report();
        let parsed: Report = serde_json::from_slice(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_finalize_from_outcome() {
        let done = JobOutcome::Done(sample_report());
        assert!(done.is_done());
        assert_eq!(Finalize::from(&done), Finalize::Success);

        let failed = JobOutcome::Failed(JobError::SourceMissing(PathBuf::from("inbox/a.csv")));
        assert!(!failed.is_done());
        match Finalize::from(&failed) {
            Finalize::Failure(text) => assert!(text.contains("missing")),
            other => panic!("Expected failure, got {:?}", other),
        }
    }
}
