use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{JobKind, SourceId};

/// Unique identifier for a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub Uuid);

impl ScheduleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A cron-driven trigger binding a task kind to a set of sources.
///
/// Cron expressions are admitted in standard 5-field form. The stored
/// timezone is informational; evaluation runs in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    pub description: Option<String>,

    pub cron_expression: String,
    pub timezone: String,
    pub is_active: bool,

    pub task_kind: JobKind,
    pub source_ids: Vec<SourceId>,

    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(name: impl Into<String>, cron_expression: impl Into<String>, task_kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: ScheduleId::new(),
            name: name.into(),
            description: None,
            cron_expression: cron_expression.into(),
            timezone: "UTC".to_string(),
            is_active: true,
            task_kind,
            source_ids: Vec::new(),
            next_run_at: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sources(mut self, source_ids: Vec<SourceId>) -> Self {
        self.source_ids = source_ids;
        self
    }

    /// Shallow admission check; the scheduler rejects anything the cron
    /// engine itself cannot parse when the job is registered.
    pub fn validate(&self) -> Result<(), String> {
        let fields = self.cron_expression.split_whitespace().count();
        if !(5..=7).contains(&fields) {
            return Err(format!(
                "cron expression `{}` has {} fields, expected 5-7",
                self.cron_expression, fields
            ));
        }
        Ok(())
    }

    /// The scheduler engine wants a seconds field; standard 5-field
    /// expressions fire at second zero.
    pub fn normalized_cron(&self) -> String {
        if self.cron_expression.split_whitespace().count() == 5 {
            format!("0 {}", self.cron_expression)
        } else {
            self.cron_expression.clone()
        }
    }
}
