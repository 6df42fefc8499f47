//! Server-side job structures (sync and classification)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of server job a descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    Classification,
}

/// Opaque handle for one running server job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub kind: JobKind,
}

impl JobDescriptor {
    pub fn classification(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: JobKind::Classification,
        }
    }

    pub fn sync(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: JobKind::Sync,
        }
    }
}

impl std::fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

/// State reported by a job status poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job has run (sync only)
    Idle,
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// No further transition happens from a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// The server is still working on the job
    pub fn is_running(self) -> bool {
        matches!(self, JobState::Pending | JobState::InProgress)
    }
}

/// Per-batch classification counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub success: u64,

    #[serde(default)]
    pub failed: u64,

    #[serde(default)]
    pub new_folders_created: u64,
}

/// Response data of `POST /classification/classify-unclassified/`
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationStarted {
    pub classification_id: String,

    #[serde(default)]
    pub mail_count: u64,
}

/// Snapshot returned by `GET /classification/{id}/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationStatus {
    pub classification_id: String,

    pub state: JobState,

    #[serde(default)]
    pub summary: JobSummary,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whether a sync fetches the whole mailbox or only new mail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Initial,
    Incremental,
}

/// Sync counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub synced: u64,

    #[serde(default)]
    pub classified: u64,

    #[serde(default)]
    pub percentage: f64,
}

/// Snapshot returned by `GET /sync/status/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    #[serde(default)]
    pub sync_id: Option<String>,

    pub state: JobState,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub sync_type: Option<SyncType>,

    #[serde(default)]
    pub progress: SyncProgress,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Server estimate of seconds remaining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining: Option<u64>,
}

impl SyncStatus {
    /// Idle placeholder used before the first status fetch
    pub fn idle() -> Self {
        Self {
            sync_id: None,
            state: JobState::Idle,
            sync_type: None,
            progress: SyncProgress::default(),
            started_at: None,
            completed_at: None,
            estimated_remaining: None,
        }
    }

    pub fn descriptor(&self) -> Option<JobDescriptor> {
        self.sync_id.as_ref().map(|id| JobDescriptor::sync(id.clone()))
    }
}

/// Format a remaining-seconds estimate for display ("about 2m 5s")
pub fn format_remaining(seconds: Option<u64>) -> String {
    match seconds {
        None | Some(0) => "-".to_string(),
        Some(s) if s < 60 => format!("about {}s", s),
        Some(s) if s % 60 == 0 => format!("about {}m", s / 60),
        Some(s) => format!("about {}m {}s", s / 60, s % 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
        assert!(!JobState::Idle.is_terminal());
        assert!(JobState::Pending.is_running());
        assert!(!JobState::Idle.is_running());
    }

    #[test]
    fn test_classification_status_wire_format() {
        let json = r#"{
            "classification_id": "c-1",
            "state": "in_progress",
            "summary": {"total": 50, "success": 12, "failed": 1, "new_folders_created": 2},
            "started_at": "2024-05-01T09:30:00Z",
            "completed_at": null,
            "error": null
        }"#;
        let status: ClassificationStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.state, JobState::InProgress);
        assert_eq!(status.summary.success, 12);
        assert!(status.completed_at.is_none());
    }

    #[test]
    fn test_sync_status_wire_format() {
        let json = r#"{
            "sync_id": "s-9",
            "state": "in_progress",
            "type": "incremental",
            "progress": {"total": 200, "synced": 50, "classified": 10, "percentage": 25.0},
            "started_at": null,
            "completed_at": null,
            "estimated_remaining": 95
        }"#;
        let status: SyncStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.sync_type, Some(SyncType::Incremental));
        assert_eq!(status.descriptor(), Some(JobDescriptor::sync("s-9")));
        assert_eq!(format_remaining(status.estimated_remaining), "about 1m 35s");
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(None), "-");
        assert_eq!(format_remaining(Some(42)), "about 42s");
        assert_eq!(format_remaining(Some(120)), "about 2m");
    }
}
