//! Postgres storage implementation.
//!
//! Runtime queries only; enums travel as text, structured fields as
//! jsonb. `insert_content_if_new` leans on the unique index over
//! `content_hash` with `ON CONFLICT DO NOTHING` as the dedup gate, and
//! both status transitions guard on the current status in the WHERE
//! clause so they stay row-local and monotonic.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::matcher::MatchResult;
use crate::types::{
    Content, ContentId, ContentStatus, Enrichment, JobExecution, JobId, JobKind, JobStatus,
    KeywordGroup, Schedule, ScheduleId, Source, SourceId, SourceKind, SourceStatus,
};

use super::{match_columns, Storage};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn source_from_row(row: &PgRow) -> Result<Source> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(Source {
        id: SourceId(row.get("id")),
        name: row.get("name"),
        url: row.get("url"),
        kind: SourceKind::parse(&kind).ok_or_else(|| anyhow!("unknown source kind: {kind}"))?,
        status: SourceStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown source status: {status}"))?,
        config: serde_json::from_value(row.get("config")).unwrap_or_default(),
        crawl_interval_minutes: row.get("crawl_interval_minutes"),
        last_crawled_at: row.get("last_crawled_at"),
        last_success_at: row.get("last_success_at"),
        error_count: row.get("error_count"),
        last_error: row.get("last_error"),
        ai_generated_config: row
            .get::<Option<serde_json::Value>, _>("ai_generated_config")
            .and_then(|v| serde_json::from_value(v).ok()),
        config_version: row.get("config_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn content_from_row(row: &PgRow) -> Result<Content> {
    let status: String = row.get("status");
    Ok(Content {
        id: ContentId(row.get("id")),
        source_id: SourceId(row.get("source_id")),
        url: row.get("url"),
        title: row.get("title"),
        body: row.get("body"),
        content_hash: row.get("content_hash"),
        enrichment: row
            .get::<Option<serde_json::Value>, _>("enrichment")
            .and_then(|v| serde_json::from_value(v).ok()),
        matched_keywords: serde_json::from_value(row.get("matched_keywords")).unwrap_or_default(),
        matched_keyword_groups: serde_json::from_value(row.get("matched_keyword_groups"))
            .unwrap_or_default(),
        status: ContentStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown content status: {status}"))?,
        published_at: row.get("published_at"),
        collected_at: row.get("collected_at"),
        processed_at: row.get("processed_at"),
        notified_at: row.get("notified_at"),
    })
}

fn job_from_row(row: &PgRow) -> Result<JobExecution> {
    let kind: String = row.get("job_kind");
    let status: String = row.get("status");
    Ok(JobExecution {
        id: JobId(row.get("id")),
        schedule_id: row.get::<Option<uuid::Uuid>, _>("schedule_id").map(ScheduleId),
        job_kind: JobKind::parse(&kind).ok_or_else(|| anyhow!("unknown job kind: {kind}"))?,
        status: JobStatus::parse(&status).ok_or_else(|| anyhow!("unknown job status: {status}"))?,
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        items_collected: row.get("items_collected"),
        items_saved: row.get("items_saved"),
        items_notified: row.get("items_notified"),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

const CONTENT_COLUMNS: &str = "id, source_id, url, title, body, content_hash, enrichment, \
matched_keywords, matched_keyword_groups, status, published_at, collected_at, processed_at, notified_at";

const SOURCE_COLUMNS: &str = "id, name, url, kind, status, config, crawl_interval_minutes, \
last_crawled_at, last_success_at, error_count, last_error, ai_generated_config, config_version, \
created_at, updated_at";

#[async_trait]
impl Storage for PostgresStore {
    async fn insert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (
                id, name, url, kind, status, config, crawl_interval_minutes,
                last_crawled_at, last_success_at, error_count, last_error,
                ai_generated_config, config_version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(source.id.0)
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.kind.as_str())
        .bind(source.status.as_str())
        .bind(serde_json::to_value(&source.config)?)
        .bind(source.crawl_interval_minutes)
        .bind(source.last_crawled_at)
        .bind(source.last_success_at)
        .bind(source.error_count)
        .bind(&source.last_error)
        .bind(
            source
                .ai_generated_config
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(source.config_version)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert source")?;
        Ok(())
    }

    async fn get_source(&self, id: SourceId) -> Result<Option<Source>> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .context("failed to get source")?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE status = 'active' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list active sources")?;
        rows.iter().map(source_from_row).collect()
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sources SET
                name = $2, url = $3, kind = $4, status = $5, config = $6,
                crawl_interval_minutes = $7, last_crawled_at = $8, last_success_at = $9,
                error_count = $10, last_error = $11, ai_generated_config = $12,
                config_version = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(source.id.0)
        .bind(&source.name)
        .bind(&source.url)
        .bind(source.kind.as_str())
        .bind(source.status.as_str())
        .bind(serde_json::to_value(&source.config)?)
        .bind(source.crawl_interval_minutes)
        .bind(source.last_crawled_at)
        .bind(source.last_success_at)
        .bind(source.error_count)
        .bind(&source.last_error)
        .bind(
            source
                .ai_generated_config
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(source.config_version)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to update source")?;
        Ok(())
    }

    async fn insert_content_if_new(&self, content: &Content) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO contents (
                id, source_id, url, title, body, content_hash, enrichment,
                matched_keywords, matched_keyword_groups, status,
                published_at, collected_at, processed_at, notified_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (content_hash) DO NOTHING
            "#,
        )
        .bind(content.id.0)
        .bind(content.source_id.0)
        .bind(&content.url)
        .bind(&content.title)
        .bind(&content.body)
        .bind(&content.content_hash)
        .bind(
            content
                .enrichment
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(serde_json::to_value(&content.matched_keywords)?)
        .bind(serde_json::to_value(&content.matched_keyword_groups)?)
        .bind(content.status.as_str())
        .bind(content.published_at)
        .bind(content.collected_at)
        .bind(content.processed_at)
        .bind(content.notified_at)
        .execute(&self.pool)
        .await
        .context("failed to insert content")?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>> {
        let row = sqlx::query(&format!("SELECT {CONTENT_COLUMNS} FROM contents WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .context("failed to get content")?;
        row.as_ref().map(content_from_row).transpose()
    }

    async fn list_contents_by_status(
        &self,
        status: ContentStatus,
        limit: usize,
    ) -> Result<Vec<Content>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE status = $1 ORDER BY collected_at, id LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to list contents by status")?;
        rows.iter().map(content_from_row).collect()
    }

    async fn list_notifiable_contents(
        &self,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<Content>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONTENT_COLUMNS} FROM contents
            WHERE status = 'processed'
              AND (enrichment->>'importance_score')::float8 >= $1
            ORDER BY collected_at, id
            LIMIT $2
            "#
        ))
        .bind(min_importance)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to list notifiable contents")?;
        rows.iter().map(content_from_row).collect()
    }

    async fn list_contents_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Content>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONTENT_COLUMNS} FROM contents
            WHERE status IN ('processed', 'notified')
              AND collected_at >= $1 AND collected_at <= $2
            ORDER BY (enrichment->>'importance_score')::float8 DESC NULLS LAST
            LIMIT $3
            "#
        ))
        .bind(start)
        .bind(end)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to list contents in window")?;
        rows.iter().map(content_from_row).collect()
    }

    async fn mark_content_processed(
        &self,
        id: ContentId,
        enrichment: &Enrichment,
        matches: &[MatchResult],
    ) -> Result<()> {
        let (keywords, groups) = match_columns(matches);
        sqlx::query(
            r#"
            UPDATE contents SET
                enrichment = $2, matched_keywords = $3, matched_keyword_groups = $4,
                status = 'processed', processed_at = $5
            WHERE id = $1 AND status = 'new'
            "#,
        )
        .bind(id.0)
        .bind(serde_json::to_value(enrichment)?)
        .bind(serde_json::to_value(keywords)?)
        .bind(serde_json::to_value(groups)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to mark content processed")?;
        Ok(())
    }

    async fn mark_content_notified(&self, id: ContentId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contents SET status = 'notified', notified_at = $2
            WHERE id = $1 AND status = 'processed'
            "#,
        )
        .bind(id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to mark content notified")?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_job(&self, job: &JobExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_executions (
                id, schedule_id, job_kind, status, started_at, finished_at,
                items_collected, items_saved, items_notified,
                error_message, retry_count, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id.0)
        .bind(job.schedule_id.map(|s| s.0))
        .bind(job.job_kind.as_str())
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.items_collected)
        .bind(job.items_saved)
        .bind(job.items_notified)
        .bind(&job.error_message)
        .bind(job.retry_count)
        .bind(&job.metadata)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert job execution")?;
        Ok(())
    }

    async fn update_job(&self, job: &JobExecution) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions SET
                status = $2, started_at = $3, finished_at = $4,
                items_collected = $5, items_saved = $6, items_notified = $7,
                error_message = $8, retry_count = $9, metadata = $10
            WHERE id = $1
            "#,
        )
        .bind(job.id.0)
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.items_collected)
        .bind(job.items_saved)
        .bind(job.items_notified)
        .bind(&job.error_message)
        .bind(job.retry_count)
        .bind(&job.metadata)
        .execute(&self.pool)
        .await
        .context("failed to update job execution")?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobExecution>> {
        let row = sqlx::query(
            r#"
            SELECT id, schedule_id, job_kind, status, started_at, finished_at,
                   items_collected, items_saved, items_notified,
                   error_message, retry_count, metadata, created_at
            FROM job_executions WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .context("failed to get job execution")?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_keyword_groups(&self) -> Result<Vec<KeywordGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, is_active, keywords, created_at
            FROM keyword_groups
            WHERE is_active
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list keyword groups")?;

        rows.iter()
            .map(|row| {
                Ok(KeywordGroup {
                    id: crate::types::KeywordGroupId(row.get("id")),
                    name: row.get("name"),
                    description: row.get("description"),
                    is_active: row.get("is_active"),
                    keywords: serde_json::from_value(row.get("keywords")).unwrap_or_default(),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, cron_expression, timezone, is_active,
                   task_kind, source_ids, next_run_at, last_run_at, created_at, updated_at
            FROM schedules
            WHERE is_active
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list active schedules")?;

        rows.iter()
            .map(|row| {
                let task_kind: String = row.get("task_kind");
                Ok(Schedule {
                    id: ScheduleId(row.get("id")),
                    name: row.get("name"),
                    description: row.get("description"),
                    cron_expression: row.get("cron_expression"),
                    timezone: row.get("timezone"),
                    is_active: row.get("is_active"),
                    task_kind: JobKind::parse(&task_kind)
                        .ok_or_else(|| anyhow!("unknown task kind: {task_kind}"))?,
                    source_ids: serde_json::from_value(row.get("source_ids")).unwrap_or_default(),
                    next_run_at: row.get("next_run_at"),
                    last_run_at: row.get("last_run_at"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }
}
