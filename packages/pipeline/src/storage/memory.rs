//! In-memory storage implementation for testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::matcher::MatchResult;
use crate::types::{
    Content, ContentId, ContentStatus, Enrichment, JobExecution, JobId, KeywordGroup, Schedule,
    Source, SourceId, SourceStatus,
};

use super::{match_columns, Storage};

#[derive(Default)]
struct Inner {
    sources: HashMap<SourceId, Source>,
    contents: HashMap<ContentId, Content>,
    /// Insertion order, which is fetch order within a source.
    content_order: Vec<ContentId>,
    content_hashes: HashSet<String>,
    jobs: HashMap<JobId, JobExecution>,
    keyword_groups: Vec<KeywordGroup>,
    schedules: Vec<Schedule>,
}

/// In-memory store. Data is lost on restart; not for production.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_keyword_groups(&self, groups: Vec<KeywordGroup>) {
        self.inner.write().unwrap().keyword_groups = groups;
    }

    pub fn seed_schedules(&self, schedules: Vec<Schedule>) {
        self.inner.write().unwrap().schedules = schedules;
    }

    pub fn content_count(&self) -> usize {
        self.inner.read().unwrap().contents.len()
    }

    /// All job records, for test assertions.
    pub fn jobs(&self) -> Vec<JobExecution> {
        let inner = self.inner.read().unwrap();
        let mut jobs: Vec<JobExecution> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn insert_source(&self, source: &Source) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .sources
            .insert(source.id, source.clone());
        Ok(())
    }

    async fn get_source(&self, id: SourceId) -> Result<Option<Source>> {
        Ok(self.inner.read().unwrap().sources.get(&id).cloned())
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>> {
        let inner = self.inner.read().unwrap();
        let mut sources: Vec<Source> = inner
            .sources
            .values()
            .filter(|s| s.status == SourceStatus::Active)
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.created_at);
        Ok(sources)
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .sources
            .insert(source.id, source.clone());
        Ok(())
    }

    async fn insert_content_if_new(&self, content: &Content) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        if !inner.content_hashes.insert(content.content_hash.clone()) {
            return Ok(false);
        }
        inner.contents.insert(content.id, content.clone());
        inner.content_order.push(content.id);
        Ok(true)
    }

    async fn get_content(&self, id: ContentId) -> Result<Option<Content>> {
        Ok(self.inner.read().unwrap().contents.get(&id).cloned())
    }

    async fn list_contents_by_status(
        &self,
        status: ContentStatus,
        limit: usize,
    ) -> Result<Vec<Content>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .content_order
            .iter()
            .filter_map(|id| inner.contents.get(id))
            .filter(|c| c.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_notifiable_contents(
        &self,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<Content>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .content_order
            .iter()
            .filter_map(|id| inner.contents.get(id))
            .filter(|c| c.status == ContentStatus::Processed)
            .filter(|c| c.importance().is_some_and(|score| score >= min_importance))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_contents_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Content>> {
        let inner = self.inner.read().unwrap();
        let mut rows: Vec<Content> = inner
            .contents
            .values()
            .filter(|c| {
                matches!(
                    c.status,
                    ContentStatus::Processed | ContentStatus::Notified
                )
            })
            .filter(|c| c.collected_at >= start && c.collected_at <= end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.importance()
                .unwrap_or(0.0)
                .partial_cmp(&a.importance().unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_content_processed(
        &self,
        id: ContentId,
        enrichment: &Enrichment,
        matches: &[MatchResult],
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(content) = inner.contents.get_mut(&id) {
            if content.status != ContentStatus::New {
                return Ok(());
            }
            let (keywords, groups) = match_columns(matches);
            content.enrichment = Some(enrichment.clone());
            content.matched_keywords = keywords;
            content.matched_keyword_groups = groups;
            content.status = ContentStatus::Processed;
            content.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_content_notified(&self, id: ContentId) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.contents.get_mut(&id) {
            Some(content) if content.status == ContentStatus::Processed => {
                content.status = ContentStatus::Notified;
                content.notified_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_job(&self, job: &JobExecution) -> Result<()> {
        self.inner.write().unwrap().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &JobExecution) -> Result<()> {
        self.inner.write().unwrap().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobExecution>> {
        Ok(self.inner.read().unwrap().jobs.get(&id).cloned())
    }

    async fn list_keyword_groups(&self) -> Result<Vec<KeywordGroup>> {
        Ok(self.inner.read().unwrap().keyword_groups.clone())
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .schedules
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(url: &str, title: &str) -> Content {
        Content::new(SourceId::new(), url, title, Some("body".into()), None)
    }

    #[tokio::test]
    async fn duplicate_hashes_collapse_to_one_row() {
        let store = MemoryStore::new();
        let a = Content::new(SourceId::new(), "https://x/1", "t", Some("b".into()), None);
        let b = Content::new(SourceId::new(), "https://x/1", "t", Some("b".into()), None);

        assert!(store.insert_content_if_new(&a).await.unwrap());
        assert!(!store.insert_content_if_new(&b).await.unwrap());
        assert_eq!(store.content_count(), 1);
    }

    #[tokio::test]
    async fn processed_transition_is_guarded_and_notified_noops() {
        let store = MemoryStore::new();
        let item = content("https://x/1", "t");
        let id = item.id;
        store.insert_content_if_new(&item).await.unwrap();

        // Notify before enrichment completes: must observe status != processed.
        assert!(!store.mark_content_notified(id).await.unwrap());

        let enrichment = Enrichment {
            importance_score: 0.9,
            ..Enrichment::neutral()
        };
        store
            .mark_content_processed(id, &enrichment, &[])
            .await
            .unwrap();
        let row = store.get_content(id).await.unwrap().unwrap();
        assert_eq!(row.status, ContentStatus::Processed);
        assert!(row.processed_at.is_some());

        assert!(store.mark_content_notified(id).await.unwrap());
        // Second notify no-ops: the row is already past processed.
        assert!(!store.mark_content_notified(id).await.unwrap());
    }

    #[tokio::test]
    async fn status_listing_preserves_insertion_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert_content_if_new(&content(&format!("https://x/{i}"), "t"))
                .await
                .unwrap();
        }
        let rows = store
            .list_contents_by_status(ContentStatus::New, 100)
            .await
            .unwrap();
        let urls: Vec<&str> = rows.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, ["https://x/0", "https://x/1", "https://x/2", "https://x/3", "https://x/4"]);
    }

    #[tokio::test]
    async fn notifiable_listing_applies_importance_floor() {
        let store = MemoryStore::new();
        let low = content("https://x/low", "low");
        let high = content("https://x/high", "high");
        store.insert_content_if_new(&low).await.unwrap();
        store.insert_content_if_new(&high).await.unwrap();

        let mut e = Enrichment::neutral();
        e.importance_score = 0.4;
        store.mark_content_processed(low.id, &e, &[]).await.unwrap();
        e.importance_score = 0.8;
        store.mark_content_processed(high.id, &e, &[]).await.unwrap();

        let rows = store.list_notifiable_contents(0.7, 50).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://x/high");
    }

    #[tokio::test]
    async fn seeded_taxonomy_and_schedules_are_listed() {
        use crate::types::{JobKind, KeywordGroup, Schedule};

        let store = MemoryStore::new();
        store.seed_keyword_groups(vec![KeywordGroup::new("Vendors")]);

        let mut inactive = Schedule::new("off", "0 * * * *", JobKind::Crawl);
        inactive.is_active = false;
        store.seed_schedules(vec![
            Schedule::new("hourly", "0 * * * *", JobKind::Crawl),
            inactive,
        ]);

        assert_eq!(store.list_keyword_groups().await.unwrap().len(), 1);
        let schedules = store.list_active_schedules().await.unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].name, "hourly");
    }

    #[tokio::test]
    async fn window_listing_orders_by_importance() {
        let store = MemoryStore::new();
        let a = content("https://x/a", "a");
        let b = content("https://x/b", "b");
        store.insert_content_if_new(&a).await.unwrap();
        store.insert_content_if_new(&b).await.unwrap();

        let mut e = Enrichment::neutral();
        e.importance_score = 0.2;
        store.mark_content_processed(a.id, &e, &[]).await.unwrap();
        e.importance_score = 0.9;
        store.mark_content_processed(b.id, &e, &[]).await.unwrap();

        let now = Utc::now();
        let rows = store
            .list_contents_in_window(now - chrono::Duration::hours(1), now, 10)
            .await
            .unwrap();
        assert_eq!(rows[0].url, "https://x/b");
    }
}
