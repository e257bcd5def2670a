//! Abstract repository used by the pipeline, plus its two implementations.
//!
//! Content-hash uniqueness at insert is the only dedup mechanism in the
//! system; every status transition is a row-local update guarded by the
//! current status, so no cross-row locking is needed.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::matcher::MatchResult;
use crate::types::{
    Content, ContentId, ContentStatus, Enrichment, JobExecution, JobId, KeywordGroup, Schedule,
    Source, SourceId,
};

#[async_trait]
pub trait Storage: Send + Sync {
    // Sources
    async fn insert_source(&self, source: &Source) -> Result<()>;
    async fn get_source(&self, id: SourceId) -> Result<Option<Source>>;
    async fn list_active_sources(&self) -> Result<Vec<Source>>;
    async fn update_source(&self, source: &Source) -> Result<()>;

    // Contents
    /// Insert unless the content hash already exists. Returns whether a
    /// row was written; a duplicate is not an error.
    async fn insert_content_if_new(&self, content: &Content) -> Result<bool>;
    async fn get_content(&self, id: ContentId) -> Result<Option<Content>>;
    /// Same-source rows come back in insertion (fetch) order.
    async fn list_contents_by_status(
        &self,
        status: ContentStatus,
        limit: usize,
    ) -> Result<Vec<Content>>;
    /// Processed rows whose importance clears the bar, oldest first.
    async fn list_notifiable_contents(
        &self,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<Content>>;
    /// Processed/notified rows collected in the window, by importance
    /// descending.
    async fn list_contents_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Content>>;
    /// Attach enrichment and matches, advancing new → processed. A row
    /// already past `new` is left untouched.
    async fn mark_content_processed(
        &self,
        id: ContentId,
        enrichment: &Enrichment,
        matches: &[MatchResult],
    ) -> Result<()>;
    /// Advance processed → notified. Returns false (and changes nothing)
    /// when the row is not currently `processed`.
    async fn mark_content_notified(&self, id: ContentId) -> Result<bool>;

    // Job executions
    async fn insert_job(&self, job: &JobExecution) -> Result<()>;
    async fn update_job(&self, job: &JobExecution) -> Result<()>;
    async fn get_job(&self, id: JobId) -> Result<Option<JobExecution>>;

    // Taxonomy and schedules
    async fn list_keyword_groups(&self) -> Result<Vec<KeywordGroup>>;
    async fn list_active_schedules(&self) -> Result<Vec<Schedule>>;
}

/// Keyword/group name lists derived from match results, stored on the row.
pub(crate) fn match_columns(matches: &[MatchResult]) -> (Vec<String>, Vec<String>) {
    let keywords: Vec<String> = matches.iter().map(|m| m.keyword.clone()).collect();
    let mut groups: Vec<String> = Vec::new();
    for m in matches {
        if !groups.contains(&m.keyword_group) {
            groups.push(m.keyword_group.clone());
        }
    }
    (keywords, groups)
}
