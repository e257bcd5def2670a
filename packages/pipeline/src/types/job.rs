use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ScheduleId;

/// Unique identifier for a job execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The pipeline stage a job drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Crawl,
    Process,
    Notify,
    Report,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Crawl => "crawl",
            JobKind::Process => "process",
            JobKind::Notify => "notify",
            JobKind::Report => "report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "crawl" => Some(JobKind::Crawl),
            "process" => Some(JobKind::Process),
            "notify" => Some(JobKind::Notify),
            "report" => Some(JobKind::Report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Audit record of one coordinator-driven run. Opened when the job starts,
/// closed with final counters and status when it exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: JobId,
    pub schedule_id: Option<ScheduleId>,
    pub job_kind: JobKind,
    pub status: JobStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_collected: i64,
    pub items_saved: i64,
    pub items_notified: i64,

    pub error_message: Option<String>,
    pub retry_count: i32,

    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl JobExecution {
    /// Open a running record for a job that starts now.
    pub fn start(job_kind: JobKind, schedule_id: Option<ScheduleId>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            schedule_id,
            job_kind,
            status: JobStatus::Running,
            started_at: Some(now),
            finished_at: None,
            items_collected: 0,
            items_saved: 0,
            items_notified: 0,
            error_message: None,
            retry_count: 0,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: now,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_timestamps_are_ordered() {
        let mut job = JobExecution::start(JobKind::Crawl, None);
        assert_eq!(job.status, JobStatus::Running);
        job.complete();
        assert!(job.finished_at.unwrap() >= job.started_at.unwrap());
    }

    #[test]
    fn failure_records_message() {
        let mut job = JobExecution::start(JobKind::Process, None);
        job.fail("boom");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }
}
