use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ScrapeError;
use crate::extract::ExtractedRecord;
use crate::job::{JobState, ScrapeType};

/// Outcome of one target URL within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub url: String,
    /// Records the strategy produced, before validation.
    pub records: usize,
    /// Records that passed validation.
    pub accepted: usize,
    /// SHA-256 of the fetched body, for change detection downstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Fetch or extraction failure for this target, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScrapeError>,
}

impl TargetReport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            records: 0,
            accepted: 0,
            content_hash: None,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// What the engine emits to the result sink for every job, exactly once.
///
/// A `Completed` job may still carry errors (rejected records, failed
/// independent targets); a `Failed` job carries exactly one error and no
/// accepted records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub scrape_type: ScrapeType,
    pub state: JobState,
    pub accepted: Vec<ExtractedRecord>,
    pub errors: Vec<ScrapeError>,
    pub targets: Vec<TargetReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    /// The classified error that failed the job, if it failed.
    pub fn failure(&self) -> Option<&ScrapeError> {
        match self.state {
            JobState::Failed => self.errors.first(),
            _ => None,
        }
    }

    /// True if the job failed with an error the scheduler may retry.
    pub fn is_retryable(&self) -> bool {
        self.failure().is_some_and(ScrapeError::is_retryable)
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
