//! Core data model: sources, contents, keywords, schedules, job records.

mod content;
mod job;
mod keyword;
mod schedule;
mod source;

pub use content::{content_hash, Content, ContentId, ContentStatus, Enrichment, Entities, Sentiment};
pub use job::{JobExecution, JobId, JobKind, JobStatus};
pub use keyword::{Keyword, KeywordGroup, KeywordGroupId, KeywordId};
pub use schedule::{Schedule, ScheduleId};
pub use source::{SelectorConfig, Source, SourceId, SourceKind, SourceStatus, MAX_SOURCE_ERRORS};
