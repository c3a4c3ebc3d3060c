// src/config.rs
//! Run configuration: sources, freshness window, bucket limits, keyword and
//! rationale overrides. Loaded from TOML or JSON; every field has a default.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::{Bucket, Classifier, KeywordMatcher, RuleTable, DEFAULT_HOUSING_KEYWORDS, DEFAULT_MACRO_KEYWORDS};
use crate::extract::{default_rationales, Rationale, FALLBACK_MARKET, FALLBACK_WHY};

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/digest.toml";
pub const DEFAULT_JSON_PATH: &str = "config/digest.json";
pub const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(2);
pub const DEFAULT_USER_AGENT: &str = concat!("market-brief/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub window_days: u32,
    pub max_entries_per_source: usize,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub limits: BucketLimits,
    pub sources: SourceLists,
    pub keywords: KeywordOverrides,
    /// Replaces the built-in why/market table when non-empty.
    pub rationales: Vec<RationaleRule>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            max_entries_per_source: 20,
            fetch_timeout_secs: 12,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            limits: BucketLimits::default(),
            sources: SourceLists::default(),
            keywords: KeywordOverrides::default(),
            rationales: Vec::new(),
        }
    }
}

/// Per-bucket maximum item counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BucketLimits {
    #[serde(rename = "macro")]
    pub macro_max: usize,
    #[serde(rename = "housing")]
    pub housing_max: usize,
    #[serde(rename = "notables")]
    pub notables_max: usize,
}

impl Default for BucketLimits {
    fn default() -> Self {
        Self {
            macro_max: 10,
            housing_max: 10,
            notables_max: 20,
        }
    }
}

impl BucketLimits {
    pub fn limit_for(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Macro => self.macro_max,
            Bucket::Housing => self.housing_max,
            Bucket::Notables => self.notables_max,
        }
    }
}

/// Feed URLs. The sectioned lists are for bookkeeping only; content decides the bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceLists {
    pub feeds: Vec<String>,
    #[serde(rename = "macro")]
    pub macro_feeds: Vec<String>,
    #[serde(rename = "housing")]
    pub housing_feeds: Vec<String>,
    #[serde(rename = "notables")]
    pub notables_feeds: Vec<String>,
}

impl SourceLists {
    /// All URLs, trimmed, first occurrence kept, in declaration order.
    pub fn all_urls(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.feeds
            .iter()
            .chain(&self.macro_feeds)
            .chain(&self.housing_feeds)
            .chain(&self.notables_feeds)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty() && seen.insert(u.to_string()))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeywordOverrides {
    #[serde(rename = "macro")]
    pub macro_keywords: Vec<String>,
    #[serde(rename = "housing")]
    pub housing_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RationaleRule {
    pub keywords: Vec<String>,
    pub why: String,
    pub market: String,
}

impl DigestConfig {
    pub fn window(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(i64::from(self.window_days))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Per-request HTTP timeout. Longer than the fetch budget so an overrun is
    /// always reported as the budget's `Timeout`.
    pub fn client_timeout(&self) -> Duration {
        self.fetch_timeout() + CLIENT_TIMEOUT_GRACE
    }

    /// Classifier from overrides; an empty override keeps the built-in list.
    pub fn classifier(&self) -> Result<Classifier> {
        let pick = |over: &[String], dflt: &[&str]| -> Vec<String> {
            if over.iter().any(|k| !k.trim().is_empty()) {
                over.to_vec()
            } else {
                dflt.iter().map(|s| s.to_string()).collect()
            }
        };
        Classifier::new(
            &pick(&self.keywords.macro_keywords, DEFAULT_MACRO_KEYWORDS),
            &pick(&self.keywords.housing_keywords, DEFAULT_HOUSING_KEYWORDS),
        )
        .context("compiling classifier keywords")
    }

    pub fn rationale_table(&self) -> Result<RuleTable<Rationale>> {
        if self.rationales.is_empty() {
            return default_rationales();
        }
        let mut table = RuleTable::new(Rationale::new(FALLBACK_WHY, FALLBACK_MARKET));
        for r in &self.rationales {
            let matcher = KeywordMatcher::new(&r.keywords)
                .with_context(|| format!("compiling rationale keywords for `{}`", r.why))?;
            table.push(Rationale::new(&r.why, &r.market), matcher);
        }
        Ok(table)
    }
}

/// Load configuration from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<DigestConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading digest config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing digest config {}", path.display()))
}

/// Load configuration using env var + fallbacks:
/// 1) $DIGEST_CONFIG_PATH
/// 2) config/digest.toml
/// 3) config/digest.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<DigestConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(DigestConfig::default())
}

pub fn parse_config(s: &str, hint_ext: &str) -> Result<DigestConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            toml::from_str(s).map_err(|e| anyhow!("unsupported config format: {e}"))
        }
    }
}
