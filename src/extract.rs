// src/extract.rs
//! Field extraction: gist sentence, numeric mentions, why/market rationale, attribution.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::classify::{match_text, KeywordMatcher, RuleTable};
use crate::ingest::types::FeedEntry;

/// Boundary markers, in tie-break order.
pub const SENTENCE_BOUNDARIES: [&str; 7] = [". ", " — ", " – ", " | ", " • ", "! ", "? "];
pub const WHAT_FALLBACK_CHARS: usize = 180;
pub const MAX_NUMBERS: usize = 6;

/// The externally visible record for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    pub title: String,
    pub url: String,
    pub what: String,
    pub numbers: String,
    pub justified_by: String,
    pub why: String,
    pub market: String,
}

/// Currency amounts, magnitude-suffixed figures, percentages, basis points.
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        [$€£]\s?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?
            (?:\s?(?:trillion|billion|million|thousand|tn|bn|mn|k|m|b)\b)?
        |
        (?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?
            (?:\s?%|\s?(?:percentage\s+points?|percent|basis\s+points?|bps|bp|trillion|billion|million|thousand|tn|bn|mn|k)\b)
        ",
    )
    .expect("number regex")
});

/// First sentence of cleaned text, cut at the earliest boundary marker.
/// Terminal `.`, `!`, `?` stay; separator markers are dropped.
pub fn first_sentence(text: &str) -> Option<String> {
    let (idx, marker) = SENTENCE_BOUNDARIES
        .iter()
        .filter_map(|m| text.find(m).map(|i| (i, *m)))
        .min_by_key(|(i, _)| *i)?;
    let end = if marker.starts_with(['.', '!', '?']) {
        idx + 1
    } else {
        idx
    };
    let s = text[..end].trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// `what`: first sentence, else the first 180 chars, else the title.
pub fn what(title: &str, cleaned_body: &str) -> String {
    let body = cleaned_body.trim();
    if body.is_empty() {
        return title.to_string();
    }
    first_sentence(body).unwrap_or_else(|| body.chars().take(WHAT_FALLBACK_CHARS).collect())
}

/// Numeric mentions in order of first appearance, case-insensitively distinct, at most 6.
pub fn extract_numbers(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in NUMBER_RE.find_iter(text) {
        let hit = m.as_str().trim();
        let key: String = hit
            .to_lowercase()
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        if !seen.insert(key) {
            continue;
        }
        out.push(hit.to_string());
        if out.len() == MAX_NUMBERS {
            break;
        }
    }
    out
}

pub fn numbers_field(text: &str) -> String {
    extract_numbers(text).join(", ")
}

/// Link host without a leading `www.`.
pub fn source_domain(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// `"{domain} — {link}"`; the domain falls back to the feed host, then "news".
pub fn justified_by(link: &str, feed_host: &str) -> String {
    let domain = source_domain(link)
        .or_else(|| (!feed_host.is_empty()).then(|| feed_host.to_string()))
        .unwrap_or_else(|| "news".to_string());
    format!("{domain} — {link}")
}

/// One `(why, market)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rationale {
    pub why: String,
    pub market: String,
}

impl Rationale {
    pub fn new(why: &str, market: &str) -> Self {
        Self {
            why: why.to_string(),
            market: market.to_string(),
        }
    }
}

/// Built-in rationale rules: (keywords, why, market), first match wins.
pub const DEFAULT_RATIONALES: &[(&[&str], &str, &str)] = &[
    (
        &["rates", "rate cut", "rate hike", "interest rate", "mortgage rate", "inflation", "cpi", "pce", "fed", "fomc", "yield"],
        "Rates and inflation set borrowing costs and the policy path, which drive housing affordability.",
        "Hot prints pressure rate-sensitive sectors (builders, REITs, small caps); cool prints support duration and housing demand.",
    ),
    (
        &["permit", "housing starts", "starts", "builder", "homebuilder", "construction", "completions"],
        "Permits, starts and builder activity show the new-supply pipeline 6 to 12 months out.",
        "Watch homebuilders and building-materials names; a rising pipeline eases future price pressure.",
    ),
    (
        &["price", "home price", "hpi", "case-shiller", "fhfa", "home value", "appreciation"],
        "Home-price trends move household wealth and, through it, consumer spending.",
        "Firm prices support lender collateral and consumer names; declines weigh on mortgage credit and discretionary spend.",
    ),
    (
        &["inventory", "days on market", "days-on-market", "dom", "pending", "listing", "months of supply"],
        "Inventory, days-on-market and pendings show how fast homes clear and who holds pricing power.",
        "Rising inventory and longer DOM point to softer prices and incentives ahead; tight supply keeps pricing firm.",
    ),
    (
        &["rent", "rental", "vacancy", "vacancies", "shelter", "apartment", "multifamily"],
        "Rents and vacancy feed the shelter component, the stickiest part of CPI.",
        "Softer rents help the disinflation path and cut odds; firm rents back multifamily pricing power.",
    ),
];

pub const FALLBACK_WHY: &str = "Sector impact and positioning.";
pub const FALLBACK_MARKET: &str = "Neutral; interpret via rates and breadth.";

pub fn default_rationales() -> anyhow::Result<RuleTable<Rationale>> {
    let mut table = RuleTable::new(Rationale::new(FALLBACK_WHY, FALLBACK_MARKET));
    for (keywords, why, market) in DEFAULT_RATIONALES {
        table.push(Rationale::new(why, market), KeywordMatcher::new(*keywords)?);
    }
    Ok(table)
}

/// Derives the structured fields of an [`OutputItem`].
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    rationales: RuleTable<Rationale>,
}

impl FieldExtractor {
    pub fn new(rationales: RuleTable<Rationale>) -> Self {
        Self { rationales }
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::new(default_rationales()?))
    }

    pub fn rationale(&self, title: &str, cleaned_body: &str) -> &Rationale {
        self.rationales.first_match(&match_text(title, cleaned_body))
    }

    /// `cleaned_body` is the entry body after [`clean_text`](crate::ingest::clean_text).
    pub fn extract(&self, entry: &FeedEntry, cleaned_body: &str) -> OutputItem {
        let rationale = self.rationale(&entry.title, cleaned_body);
        OutputItem {
            title: entry.title.clone(),
            url: entry.link.clone(),
            what: what(&entry.title, cleaned_body),
            numbers: numbers_field(&format!("{} {}", entry.title, cleaned_body)),
            justified_by: justified_by(&entry.link, &entry.source),
            why: rationale.why.clone(),
            market: rationale.market.clone(),
        }
    }
}
