// src/ingest/mod.rs
pub mod feed;
pub mod providers;
pub mod types;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::SourceError;
use crate::ingest::types::{CandidateItem, FeedEntry, FeedSource, SourceOutcome};

/// One-time metrics registration (so series show up in the exposition output).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_entries_fetched_total",
            "Well-formed entries parsed from sources."
        );
        describe_counter!(
            "digest_entries_malformed_total",
            "Entries dropped for a missing title or link."
        );
        describe_counter!(
            "digest_entries_stale_total",
            "Entries dropped by the freshness window (including unknown timestamps)."
        );
        describe_counter!(
            "digest_dedup_total",
            "Entries collapsed into a newer copy with the same title."
        );
        describe_counter!(
            "digest_source_errors_total",
            "Sources that failed to fetch or parse."
        );
        describe_counter!("digest_runs_total", "Completed digest runs.");
        describe_histogram!("digest_fetch_ms", "Per-source fetch+parse time in milliseconds.");
        describe_gauge!("digest_bucket_items", "Items emitted per bucket in the last run.");
        describe_gauge!("digest_last_run_ts", "Unix ts when the digest last ran.");
    });
}

/// Clean feed text: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (covers NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Fetch one source under a time budget. Failures become `SourceOutcome::Failed`.
pub async fn fetch_source(source: &dyn FeedSource, limit: usize, budget: Duration) -> SourceOutcome {
    let t0 = Instant::now();
    let res = match tokio::time::timeout(budget, source.fetch_entries(limit)).await {
        Ok(r) => r,
        Err(_) => Err(SourceError::Timeout(budget)),
    };
    histogram!("digest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match res {
        Ok(mut batch) => {
            batch.entries.truncate(limit);
            let before = batch.entries.len();
            batch
                .entries
                .retain(|e| !e.title.trim().is_empty() && !e.link.trim().is_empty());
            batch.malformed += before - batch.entries.len();
            counter!("digest_entries_fetched_total").increment(batch.entries.len() as u64);
            counter!("digest_entries_malformed_total").increment(batch.malformed as u64);
            tracing::debug!(
                target: "ingest",
                source = source.name(),
                entries = batch.entries.len(),
                malformed = batch.malformed,
                "source fetched"
            );
            SourceOutcome::Fetched(batch)
        }
        Err(e) => {
            tracing::warn!(target: "ingest", source = source.name(), error = %e, "source unavailable");
            counter!("digest_source_errors_total").increment(1);
            SourceOutcome::Failed(e)
        }
    }
}

/// Fetch every source in order, one at a time. Never fails as a whole.
pub async fn fetch_all(
    sources: &[Box<dyn FeedSource>],
    limit: usize,
    budget: Duration,
) -> Vec<(String, SourceOutcome)> {
    let mut out = Vec::with_capacity(sources.len());
    for s in sources {
        let outcome = fetch_source(s.as_ref(), limit, budget).await;
        out.push((s.name().to_string(), outcome));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// No timestamp candidate parsed.
    Unknown,
    /// Older than the window, or dated after `now`.
    Stale,
}

pub fn freshness(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>, window: TimeDelta) -> Freshness {
    match published_at {
        None => Freshness::Unknown,
        Some(ts) if ts > now || ts < now - window => Freshness::Stale,
        Some(_) => Freshness::Fresh,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FreshnessStats {
    pub unknown_timestamp: usize,
    pub stale: usize,
}

impl FreshnessStats {
    pub fn merge(&mut self, other: FreshnessStats) {
        self.unknown_timestamp += other.unknown_timestamp;
        self.stale += other.stale;
    }
}

/// Keep entries whose timestamp lies in `[now - window, now]`.
pub fn filter_fresh(
    entries: Vec<FeedEntry>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> (Vec<FeedEntry>, FreshnessStats) {
    let mut stats = FreshnessStats::default();
    let mut keep = Vec::with_capacity(entries.len());
    for e in entries {
        match freshness(e.published_at, now, window) {
            Freshness::Fresh => keep.push(e),
            Freshness::Unknown => stats.unknown_timestamp += 1,
            Freshness::Stale => stats.stale += 1,
        }
    }
    counter!("digest_entries_stale_total")
        .increment((stats.stale + stats.unknown_timestamp) as u64);
    (keep, stats)
}

/// Concatenate per-source survivors into one candidate pool, in source order.
pub fn build_pool<I>(batches: I) -> Vec<CandidateItem>
where
    I: IntoIterator<Item = Vec<FeedEntry>>,
{
    batches
        .into_iter()
        .flatten()
        .filter_map(CandidateItem::new)
        .collect()
}

/// Collapse items sharing a dedup key into the newest one.
/// Ties keep the first-seen item. Returns (kept, dropped_count).
pub fn dedup_newest(pool: Vec<CandidateItem>) -> (Vec<CandidateItem>, usize) {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(pool.len());
    let mut kept: Vec<CandidateItem> = Vec::with_capacity(pool.len());
    let mut dropped = 0usize;

    for item in pool {
        match index.get(&item.dedup_key) {
            Some(&i) => {
                dropped += 1;
                if item.published_at > kept[i].published_at {
                    kept[i] = item;
                }
            }
            None => {
                index.insert(item.dedup_key.clone(), kept.len());
                kept.push(item);
            }
        }
    }

    counter!("digest_dedup_total").increment(dropped as u64);
    (kept, dropped)
}

/// Newest first; stable, so equal timestamps keep pool order.
pub fn sort_newest_first(items: &mut [CandidateItem]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(title: &str, ts: Option<DateTime<Utc>>) -> FeedEntry {
        FeedEntry {
            title: title.into(),
            link: format!("https://example.test/{}", title.len()),
            published_at: ts,
            body: String::new(),
            source: "example.test".into(),
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn clean_text_strips_markup_and_folds_ws() {
        let s = "<p>Hello,&nbsp;&nbsp;<b>world</b></p>\n\t &ldquo;ok&rdquo;";
        assert_eq!(clean_text(s), r#"Hello, world "ok""#);
    }

    #[test]
    fn clean_text_keeps_comparison_signs() {
        assert_eq!(clean_text("rates &lt; 5% and x > y"), "rates < 5% and x > y");
    }

    #[test]
    fn freshness_bounds_are_inclusive() {
        let now = at(12);
        let w = TimeDelta::days(7);
        assert_eq!(freshness(Some(now), now, w), Freshness::Fresh);
        assert_eq!(freshness(Some(now - w), now, w), Freshness::Fresh);
        assert_eq!(
            freshness(Some(now - w - TimeDelta::seconds(1)), now, w),
            Freshness::Stale
        );
        assert_eq!(freshness(Some(at(13)), now, w), Freshness::Stale);
        assert_eq!(freshness(None, now, w), Freshness::Unknown);
    }

    #[test]
    fn dedup_keeps_newest_and_first_on_tie() {
        let pool = build_pool(vec![
            vec![entry("Fed Raises Rates", Some(at(1)))],
            vec![entry("  fed raises rates ", Some(at(2)))],
            vec![entry("Tie", Some(at(3))), entry("TIE", Some(at(3)))],
        ]);
        let (kept, dropped) = dedup_newest(pool);
        assert_eq!(dropped, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].published_at, at(2));
        assert_eq!(kept[1].entry.title, "Tie");
    }

    #[test]
    fn sort_is_newest_first_and_stable() {
        let mut pool = build_pool(vec![vec![
            entry("a", Some(at(1))),
            entry("b", Some(at(5))),
            entry("c", Some(at(1))),
        ]]);
        sort_newest_first(&mut pool);
        let titles: Vec<_> = pool.iter().map(|c| c.entry.title.as_str()).collect();
        assert_eq!(titles, ["b", "a", "c"]);
    }
}
