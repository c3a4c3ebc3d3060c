// src/digest.rs
//! One-pass digest run: fetch → freshness → pool → dedup → sort → classify →
//! extract → trim. The builder never fails; every problem ends up in [`RunReport`].

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::classify::{Bucket, Classifier};
use crate::config::{BucketLimits, DigestConfig};
use crate::extract::{FieldExtractor, OutputItem};
use crate::ingest::types::{CandidateItem, FeedSource, SourceReport};
use crate::ingest::{
    build_pool, clean_text, dedup_newest, ensure_metrics_described, fetch_all, filter_fresh,
    sort_newest_first, FreshnessStats,
};

/// The three named arrays handed to the snapshot orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    #[serde(rename = "macro")]
    pub macro_items: Vec<OutputItem>,
    pub housing: Vec<OutputItem>,
    pub notables: Vec<OutputItem>,
}

impl Digest {
    pub fn bucket(&self, b: Bucket) -> &[OutputItem] {
        match b {
            Bucket::Macro => &self.macro_items,
            Bucket::Housing => &self.housing,
            Bucket::Notables => &self.notables,
        }
    }

    fn bucket_mut(&mut self, b: Bucket) -> &mut Vec<OutputItem> {
        match b {
            Bucket::Macro => &mut self.macro_items,
            Bucket::Housing => &mut self.housing,
            Bucket::Notables => &mut self.notables,
        }
    }

    pub fn push(&mut self, b: Bucket, item: OutputItem) {
        self.bucket_mut(b).push(item);
    }

    /// Every item with its bucket, in bucket order then display order.
    pub fn iter(&self) -> impl Iterator<Item = (Bucket, &OutputItem)> {
        Bucket::ALL
            .into_iter()
            .flat_map(move |b| self.bucket(b).iter().map(move |it| (b, it)))
    }

    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            macro_count: self.macro_items.len(),
            housing: self.housing.len(),
            notables: self.notables.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.macro_items.is_empty() && self.housing.is_empty() && self.notables.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    #[serde(rename = "macro")]
    pub macro_count: usize,
    pub housing: usize,
    pub notables: usize,
}

/// Diagnostics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub freshness: FreshnessStats,
    pub duplicates: usize,
    /// Items cut by the bucket limits.
    pub trimmed: BucketCounts,
    /// Items emitted.
    pub emitted: BucketCounts,
}

impl RunReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.error.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct DigestRun {
    pub digest: Digest,
    pub report: RunReport,
}

/// Classify and extract every item, preserving order within each bucket.
pub fn assemble(items: &[CandidateItem], classifier: &Classifier, extractor: &FieldExtractor) -> Digest {
    let mut digest = Digest::default();
    for item in items {
        let body = clean_text(&item.entry.body);
        let bucket = classifier.classify(&item.entry.title, &body);
        digest.push(bucket, extractor.extract(&item.entry, &body));
    }
    digest
}

/// Truncate each bucket to its limit. Returns how many items each bucket lost.
pub fn trim_buckets(digest: &mut Digest, limits: &BucketLimits) -> BucketCounts {
    let mut cut = [0usize; 3];
    for (i, b) in Bucket::ALL.into_iter().enumerate() {
        let items = digest.bucket_mut(b);
        let max = limits.limit_for(b);
        cut[i] = items.len().saturating_sub(max);
        items.truncate(max);
    }
    BucketCounts {
        macro_count: cut[0],
        housing: cut[1],
        notables: cut[2],
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window: TimeDelta,
    pub max_entries_per_source: usize,
    pub fetch_timeout: Duration,
    pub limits: BucketLimits,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&DigestConfig::default())
    }
}

impl From<&DigestConfig> for PipelineSettings {
    fn from(cfg: &DigestConfig) -> Self {
        Self {
            window: cfg.window(),
            max_entries_per_source: cfg.max_entries_per_source,
            fetch_timeout: cfg.fetch_timeout(),
            limits: cfg.limits,
        }
    }
}

pub struct DigestBuilder {
    sources: Vec<Box<dyn FeedSource>>,
    classifier: Classifier,
    extractor: FieldExtractor,
    settings: PipelineSettings,
}

impl DigestBuilder {
    pub fn new(
        sources: Vec<Box<dyn FeedSource>>,
        classifier: Classifier,
        extractor: FieldExtractor,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sources,
            classifier,
            extractor,
            settings,
        }
    }

    /// Builder with rules and limits taken from `cfg`.
    pub fn from_config(cfg: &DigestConfig, sources: Vec<Box<dyn FeedSource>>) -> anyhow::Result<Self> {
        Ok(Self::new(
            sources,
            cfg.classifier()?,
            FieldExtractor::new(cfg.rationale_table()?),
            PipelineSettings::from(cfg),
        ))
    }

    pub async fn build(&self) -> DigestRun {
        self.build_at(Utc::now()).await
    }

    /// Run once with an explicit clock.
    pub async fn build_at(&self, now: DateTime<Utc>) -> DigestRun {
        ensure_metrics_described();
        let s = &self.settings;
        let mut report = RunReport::default();

        let outcomes = fetch_all(&self.sources, s.max_entries_per_source, s.fetch_timeout).await;

        let mut fresh_batches = Vec::with_capacity(outcomes.len());
        for (name, outcome) in outcomes {
            report.sources.push(outcome.report(&name));
            let (fresh, stats) = filter_fresh(outcome.into_entries(), now, s.window);
            report.freshness.merge(stats);
            fresh_batches.push(fresh);
        }

        let pool = build_pool(fresh_batches);
        let (mut items, duplicates) = dedup_newest(pool);
        report.duplicates = duplicates;
        sort_newest_first(&mut items);

        let mut digest = assemble(&items, &self.classifier, &self.extractor);
        report.trimmed = trim_buckets(&mut digest, &s.limits);
        report.emitted = digest.counts();

        for b in Bucket::ALL {
            gauge!("digest_bucket_items", "bucket" => b.as_str()).set(digest.bucket(b).len() as f64);
        }
        counter!("digest_runs_total").increment(1);
        gauge!("digest_last_run_ts").set(now.timestamp() as f64);

        info!(
            target: "digest",
            sources = report.sources.len(),
            failed = report.failed_sources().count(),
            stale = report.freshness.stale,
            unknown_ts = report.freshness.unknown_timestamp,
            duplicates = report.duplicates,
            r#macro = report.emitted.macro_count,
            housing = report.emitted.housing,
            notables = report.emitted.notables,
            "digest built"
        );

        DigestRun { digest, report }
    }
}
