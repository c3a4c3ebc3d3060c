// tests/digest_pipeline.rs
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use market_brief::config::{BucketLimits, DigestConfig};
use market_brief::digest::PipelineSettings;
use market_brief::error::SourceError;
use market_brief::ingest::providers::rss_feed::RssFeedSource;
use market_brief::ingest::types::{dedup_key, FeedEntry, FeedSource, SourceBatch};
use market_brief::{Bucket, Classifier, DigestBuilder, FieldExtractor};
use std::collections::HashSet;
use std::time::Duration;

const MACRO_RSS: &str = include_str!("fixtures/macro_rss.xml");
const HOUSING_ATOM: &str = include_str!("fixtures/housing_atom.xml");
const WIRE_RDF: &str = include_str!("fixtures/wire_rdf.xml");
const BROKEN: &str = include_str!("fixtures/broken.xml");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 12, 12, 0, 0).unwrap()
}

fn fixture_sources() -> Vec<Box<dyn FeedSource>> {
    vec![
        Box::new(RssFeedSource::from_fixture("https://www.bls.gov/feed", MACRO_RSS)),
        Box::new(RssFeedSource::from_fixture("https://www.housingwire.test/atom.xml", HOUSING_ATOM)),
        Box::new(RssFeedSource::from_fixture("https://wire.test/rdf", WIRE_RDF)),
        Box::new(RssFeedSource::from_fixture("https://broken.test/rss", BROKEN)),
    ]
}

fn builder(sources: Vec<Box<dyn FeedSource>>) -> DigestBuilder {
    DigestBuilder::from_config(&DigestConfig::default(), sources).expect("default config builds")
}

fn titles(items: &[market_brief::OutputItem]) -> Vec<&str> {
    items.iter().map(|i| i.title.as_str()).collect()
}

#[tokio::test]
async fn fixtures_land_in_expected_buckets_newest_first() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let d = &run.digest;

    assert_eq!(
        titles(&d.macro_items),
        ["Treasury yields slip 8bp", "CPI Rises 3.1% in May", "Fed raises rates"]
    );
    assert_eq!(
        titles(&d.housing),
        [
            "Builder Permits Rise 5% in Tampa",
            "Pending home sales slip",
            "Rents cool in Sun Belt metros"
        ]
    );
    assert_eq!(titles(&d.notables), ["Chipmaker tops estimates"]);
}

#[tokio::test]
async fn syndicated_headline_keeps_the_later_copy() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let fed: Vec<_> = run
        .digest
        .iter()
        .filter(|(_, it)| dedup_key(&it.title) == "fed raises rates")
        .collect();
    assert_eq!(fed.len(), 1);
    assert_eq!(fed[0].1.url, "https://www.housingwire.test/fed-raises-rates");
    assert_eq!(run.report.duplicates, 1);
}

#[tokio::test]
async fn cpi_item_fields() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let cpi = run
        .digest
        .macro_items
        .iter()
        .find(|i| i.title.starts_with("CPI"))
        .expect("cpi item present");

    assert_eq!(cpi.what, "CPI rose 3.1% in May, the largest gain since March.");
    assert_eq!(cpi.numbers, "3.1%");
    assert_eq!(
        cpi.justified_by,
        "bls.gov — https://www.bls.gov/news.release/cpi.htm"
    );
    assert!(cpi.why.contains("affordability"));
}

#[tokio::test]
async fn housing_item_fields() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let tampa = &run.digest.housing[0];
    assert_eq!(tampa.what, "Single-family permits rose 5%");
    assert_eq!(tampa.numbers, "5%");
    assert!(tampa.why.contains("supply"));
    assert_eq!(
        tampa.justified_by,
        "housingwire.test — https://www.housingwire.test/permits-tampa"
    );
}

#[tokio::test]
async fn stale_unknown_and_malformed_never_surface() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let all: Vec<_> = run.digest.iter().map(|(_, it)| it.title.as_str()).collect();
    assert!(!all.contains(&"Payrolls beat estimates"), "10+ days old");
    assert!(!all.contains(&"Jobless claims steady"), "unknown timestamp");
    assert!(!all.contains(&"Orphan headline"), "no link");

    assert_eq!(run.report.freshness.stale, 1);
    assert_eq!(run.report.freshness.unknown_timestamp, 1);
    assert_eq!(run.report.sources[0].malformed, 1);
}

#[tokio::test]
async fn broken_source_is_reported_not_raised() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let failed: Vec<_> = run.report.failed_sources().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source, "https://broken.test/rss");
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("malformed feed document"));
}

#[tokio::test]
async fn output_invariants_hold() {
    let run = builder(fixture_sources()).build_at(now()).await;
    let mut keys = HashSet::new();
    for (_, it) in run.digest.iter() {
        assert!(!it.title.is_empty() && !it.url.is_empty());
        assert!(keys.insert(dedup_key(&it.title)), "duplicate title {}", it.title);
        let nums: Vec<_> = it.numbers.split(", ").filter(|s| !s.is_empty()).collect();
        assert!(nums.len() <= 6);
        let lowered: HashSet<_> = nums.iter().map(|n| n.to_lowercase()).collect();
        assert_eq!(lowered.len(), nums.len());
    }
    let limits = BucketLimits::default();
    for b in Bucket::ALL {
        assert!(run.digest.bucket(b).len() <= limits.limit_for(b));
    }
}

#[tokio::test]
async fn bucket_limits_trim_oldest() {
    let settings = PipelineSettings {
        limits: BucketLimits {
            macro_max: 1,
            housing_max: 2,
            notables_max: 0,
        },
        ..PipelineSettings::default()
    };
    let b = DigestBuilder::new(
        fixture_sources(),
        Classifier::with_defaults().unwrap(),
        FieldExtractor::with_defaults().unwrap(),
        settings,
    );
    let run = b.build_at(now()).await;
    assert_eq!(titles(&run.digest.macro_items), ["Treasury yields slip 8bp"]);
    assert_eq!(run.digest.housing.len(), 2);
    assert!(run.digest.notables.is_empty());
    assert_eq!(run.report.trimmed.macro_count, 2);
    assert_eq!(run.report.trimmed.housing, 1);
    assert_eq!(run.report.trimmed.notables, 1);
}

#[tokio::test]
async fn zero_sources_yield_three_empty_buckets() {
    let run = builder(Vec::new()).build_at(now()).await;
    assert!(run.digest.is_empty());
    let v = serde_json::to_value(&run.digest).unwrap();
    assert_eq!(v, serde_json::json!({ "macro": [], "housing": [], "notables": [] }));
}

struct FailingSource;

#[async_trait]
impl FeedSource for FailingSource {
    async fn fetch_entries(&self, _limit: usize) -> Result<SourceBatch, SourceError> {
        Err(SourceError::Network("connection refused".into()))
    }
    fn name(&self) -> &str {
        "failing"
    }
}

struct SlowSource;

#[async_trait]
impl FeedSource for SlowSource {
    async fn fetch_entries(&self, _limit: usize) -> Result<SourceBatch, SourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(SourceBatch::default())
    }
    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn all_sources_failing_yield_empty_buckets() {
    let settings = PipelineSettings {
        fetch_timeout: Duration::from_millis(50),
        ..PipelineSettings::default()
    };
    let b = DigestBuilder::new(
        vec![Box::new(FailingSource), Box::new(SlowSource)],
        Classifier::with_defaults().unwrap(),
        FieldExtractor::with_defaults().unwrap(),
        settings,
    );
    let run = b.build_at(now()).await;
    assert!(run.digest.is_empty());
    assert_eq!(run.report.failed_sources().count(), 2);
    assert!(run.report.sources[1]
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("timed out"));
}

/// Serves fixed entries, ignoring the limit, to check the fetch stage enforces it.
struct StaticSource(Vec<FeedEntry>);

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch_entries(&self, _limit: usize) -> Result<SourceBatch, SourceError> {
        Ok(SourceBatch {
            entries: self.0.clone(),
            malformed: 0,
        })
    }
    fn name(&self) -> &str {
        "static"
    }
}

fn entry(title: &str, hours_ago: i64) -> FeedEntry {
    FeedEntry {
        title: title.into(),
        link: format!("https://static.test/{}", title.replace(' ', "-")),
        published_at: Some(now() - chrono::TimeDelta::hours(hours_ago)),
        body: String::new(),
        source: "static.test".into(),
    }
}

#[tokio::test]
async fn fetch_stage_enforces_entry_cap() {
    let entries: Vec<_> = (0..30).map(|i| entry(&format!("Story {i}"), i)).collect();
    let settings = PipelineSettings {
        max_entries_per_source: 25,
        limits: BucketLimits {
            notables_max: 100,
            ..BucketLimits::default()
        },
        ..PipelineSettings::default()
    };
    let b = DigestBuilder::new(
        vec![Box::new(StaticSource(entries))],
        Classifier::with_defaults().unwrap(),
        FieldExtractor::with_defaults().unwrap(),
        settings,
    );
    let run = b.build_at(now()).await;
    assert_eq!(run.report.sources[0].fetched, 25);
    assert_eq!(run.digest.notables.len(), 25);
}

#[tokio::test]
async fn blank_title_or_link_from_custom_source_is_malformed() {
    let mut no_title = entry("x", 1);
    no_title.title = "  ".into();
    let mut no_link = entry("No link", 1);
    no_link.link = String::new();
    let b = builder(vec![Box::new(StaticSource(vec![
        no_title,
        no_link,
        entry("Kept story", 1),
    ]))]);
    let run = b.build_at(now()).await;
    assert_eq!(titles(&run.digest.notables), ["Kept story"]);
    assert_eq!(run.report.sources[0].fetched, 1);
    assert_eq!(run.report.sources[0].malformed, 2);
    for (_, it) in run.digest.iter() {
        assert!(!it.title.trim().is_empty() && !it.url.trim().is_empty());
    }
}

#[tokio::test]
async fn future_dated_items_are_outside_the_window() {
    let b = builder(vec![Box::new(StaticSource(vec![
        entry("From the future", -2),
        entry("Just now", 0),
    ]))]);
    let run = b.build_at(now()).await;
    assert_eq!(titles(&run.digest.notables), ["Just now"]);
    assert_eq!(run.report.freshness.stale, 1);
}

#[tokio::test]
async fn run_order_is_independent_of_source_order() {
    let forward = builder(fixture_sources()).build_at(now()).await;
    let mut reversed = fixture_sources();
    reversed.reverse();
    let backward = builder(reversed).build_at(now()).await;
    assert_eq!(forward.digest, backward.digest);
}
