use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::summary::SummaryRequest;

/// Type tag of the summary generation job.
pub const ASSET_SUMMARY: &str = "asset-summary";

/// Tracks the lifecycle status of a job.
///
/// Transitions only move forward: `Pending → Processing → Completed | Failed`,
/// with `Cancelled` reachable from `Pending` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Work carried by a job. Known kinds get a typed variant; `Custom` covers
/// handler types registered at runtime that the core knows nothing about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobPayload {
    AssetSummary(SummaryRequest),
    Custom {
        job_type: String,
        data: serde_json::Value,
    },
}

impl JobPayload {
    pub fn custom(job_type: impl Into<String>, data: serde_json::Value) -> Self {
        JobPayload::Custom {
            job_type: job_type.into(),
            data,
        }
    }

    /// The tag used to look up the handler for this payload.
    pub fn job_type(&self) -> &str {
        match self {
            JobPayload::AssetSummary(_) => ASSET_SUMMARY,
            JobPayload::Custom { job_type, .. } => job_type,
        }
    }

    /// The external asset this job is correlated with, if any.
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            JobPayload::AssetSummary(req) => Some(&req.asset_id),
            JobPayload::Custom { data, .. } => data.get("asset_id").and_then(|v| v.as_str()),
        }
    }
}

/// A single unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_type: payload.job_type().to_string(),
            payload,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Wall-clock processing time, once the job has finished.
    pub fn duration_ms(&self) -> Option<i64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        Some((completed - started).num_milliseconds())
    }

    pub(crate) fn mark_processing(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        true
    }

    pub(crate) fn mark_finished(&mut self, result: Result<(), String>) {
        if self.status != JobStatus::Processing {
            return;
        }
        match result {
            Ok(()) => self.status = JobStatus::Completed,
            Err(message) => {
                self.status = JobStatus::Failed;
                self.error = Some(message);
            }
        }
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_cancelled(&mut self, reason: &str) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.error = Some(reason.to_string());
        self.completed_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::AssetType;
    use serde_json::json;

    fn summary_payload() -> JobPayload {
        JobPayload::AssetSummary(SummaryRequest::new(
            "test.example.com",
            AssetType::Web,
            json!({"id": "test.example.com"}),
        ))
    }

    #[test]
    fn job_creation_defaults() {
        let job = Job::new(summary_payload());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, ASSET_SUMMARY);
        assert!(job.started_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn job_ids_are_unique() {
        let a = Job::new(summary_payload());
        let b = Job::new(summary_payload());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let mut job = Job::new(summary_payload());
        assert!(job.mark_processing());
        assert!(!job.mark_processing());
        assert!(!job.mark_cancelled("too late"));

        job.mark_finished(Err("backend down".into()));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("backend down"));

        // Terminal states are final.
        job.mark_finished(Ok(()));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.duration_ms().is_some());
    }

    #[test]
    fn cancelled_job_never_starts() {
        let mut job = Job::new(summary_payload());
        assert!(job.mark_cancelled("cancelled by caller"));
        assert!(!job.mark_processing());
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn payload_exposes_type_and_asset() {
        let payload = summary_payload();
        assert_eq!(payload.job_type(), "asset-summary");
        assert_eq!(payload.asset_id(), Some("test.example.com"));

        let custom = JobPayload::custom("foo", json!({"asset_id": "a-1"}));
        assert_eq!(custom.job_type(), "foo");
        assert_eq!(custom.asset_id(), Some("a-1"));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let value = serde_json::to_value(summary_payload()).unwrap();
        assert_eq!(value["kind"], "asset-summary");
        assert_eq!(value["asset_type"], "web");
    }

    #[test]
    fn status_display() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Pending.is_active());
    }
}
