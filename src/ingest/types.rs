// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SourceError;

/// One raw entry as parsed from a feed document.
///
/// Defaulting is resolved once at fetch time: `title` is cleaned text, `link` is
/// the resolved permalink, `published_at` is the first timestamp candidate that
/// parsed (or `None`), and `body` keeps its markup until extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub body: String,
    /// Host of the feed this entry came from, e.g. "bls.gov".
    pub source: String,
}

/// A fresh entry inside the pool, keyed for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub entry: FeedEntry,
    pub dedup_key: String,
    /// Timestamp is guaranteed by the freshness filter.
    pub published_at: DateTime<Utc>,
}

impl CandidateItem {
    /// Returns `None` for entries without a timestamp.
    pub fn new(entry: FeedEntry) -> Option<Self> {
        let published_at = entry.published_at?;
        Some(Self {
            dedup_key: dedup_key(&entry.title),
            published_at,
            entry,
        })
    }
}

/// Case-folded, trimmed title.
pub fn dedup_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Result of fetching one source: entries or the reason it yielded none.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Fetched(SourceBatch),
    Failed(SourceError),
}

impl SourceOutcome {
    pub fn report(&self, source: &str) -> SourceReport {
        match self {
            SourceOutcome::Fetched(batch) => SourceReport {
                source: source.to_string(),
                fetched: batch.entries.len(),
                malformed: batch.malformed,
                error: None,
            },
            SourceOutcome::Failed(e) => SourceReport {
                source: source.to_string(),
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn into_entries(self) -> Vec<FeedEntry> {
        match self {
            SourceOutcome::Fetched(batch) => batch.entries,
            SourceOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Per-source diagnostics kept in the run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub malformed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Returns at most `limit` well-formed entries, in document order.
    async fn fetch_entries(&self, limit: usize) -> Result<SourceBatch, SourceError>;
    fn name(&self) -> &str;
}

/// Entries from one successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBatch {
    pub entries: Vec<FeedEntry>,
    /// Entries dropped for a missing title or link.
    pub malformed: usize,
}
