// src/classify.rs
//! Ordered keyword rules: a generic first-match table and the bucket classifier.
//!
//! Precedence is data: rules are evaluated top to bottom and the first rule whose
//! keyword set matches wins; the table's fallback applies when none do. The
//! classifier table is `[macro, housing]` with fallback `notables`, so an item
//! mentioning both macro and housing terms is always `macro`.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Topical bucket. Closed set, one per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Macro,
    Housing,
    Notables,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Macro, Bucket::Housing, Bucket::Notables];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Macro => "macro",
            Bucket::Housing => "housing",
            Bucket::Notables => "notables",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_MACRO_KEYWORDS: &[&str] = &[
    "fed",
    "fomc",
    "federal reserve",
    "central bank",
    "powell",
    "ecb",
    "rates",
    "interest rate",
    "rate cut",
    "rate hike",
    "inflation",
    "disinflation",
    "cpi",
    "pce",
    "ppi",
    "gdp",
    "recession",
    "payroll",
    "nonfarm",
    "jobs report",
    "employment",
    "unemployment",
    "jobless claims",
    "labor market",
    "treasury",
    "treasuries",
    "bond",
    "yield",
    "10-year",
    "10y",
    "2-year",
];

pub const DEFAULT_HOUSING_KEYWORDS: &[&str] = &[
    "housing",
    "permit",
    "housing starts",
    "starts",
    "builder",
    "homebuilder",
    "construction",
    "mortgage",
    "inventory",
    "days on market",
    "days-on-market",
    "home sales",
    "home prices",
    "pending home sales",
    "case-shiller",
    "fhfa",
    "hpi",
    "realtor",
    "listing",
    "rent",
    "rental",
    "vacancy",
    "multifamily",
    "reit",
];

/// Whole-word, case-insensitive membership test over a keyword set.
///
/// Each keyword matches on word boundaries with an optional plural `s`, so
/// `permit` matches "permits" but `rent` never matches "current". Inner
/// whitespace in a keyword matches any whitespace run.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    re: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Ok(Self { keywords, re: None });
        }
        let alts: Vec<String> = keywords.iter().map(|k| keyword_pattern(k)).collect();
        let pattern = format!("(?i)(?:{})", alts.join("|"));
        let re = Regex::new(&pattern)
            .map_err(|e| anyhow::anyhow!("keyword set regex error: {}", e))?;
        Ok(Self {
            keywords,
            re: Some(re),
        })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.re.as_ref().is_some_and(|re| re.is_match(haystack))
    }

    /// The first matching span, for diagnostics.
    pub fn find<'h>(&self, haystack: &'h str) -> Option<&'h str> {
        self.re.as_ref()?.find(haystack).map(|m| m.as_str())
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

fn keyword_pattern(kw: &str) -> String {
    let body = kw
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let mut p = String::with_capacity(body.len() + 8);
    if kw.chars().next().is_some_and(char::is_alphanumeric) {
        p.push_str(r"\b");
    }
    p.push_str(&body);
    if kw.chars().last().is_some_and(char::is_alphanumeric) {
        p.push_str(r"s?\b");
    }
    p
}

#[derive(Debug, Clone)]
pub struct Rule<T> {
    pub label: T,
    pub matcher: KeywordMatcher,
}

/// Ordered `(label, keyword set)` rules with a fallback label.
#[derive(Debug, Clone)]
pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
    fallback: T,
}

impl<T> RuleTable<T> {
    pub fn new(fallback: T) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Appends a rule at the lowest precedence so far.
    pub fn push(&mut self, label: T, matcher: KeywordMatcher) {
        self.rules.push(Rule { label, matcher });
    }

    pub fn with_rule(mut self, label: T, matcher: KeywordMatcher) -> Self {
        self.push(label, matcher);
        self
    }

    /// Label of the first matching rule, else the fallback.
    pub fn first_match(&self, haystack: &str) -> &T {
        self.rules
            .iter()
            .find(|r| r.matcher.is_match(haystack))
            .map(|r| &r.label)
            .unwrap_or(&self.fallback)
    }

    pub fn rules(&self) -> &[Rule<T>] {
        &self.rules
    }

    pub fn fallback(&self) -> &T {
        &self.fallback
    }
}

/// `lowercase(title) + " " + lowercase(cleaned body)`.
pub fn match_text(title: &str, cleaned_body: &str) -> String {
    format!("{} {}", title.to_lowercase(), cleaned_body.to_lowercase())
}

/// Assigns exactly one bucket per item: macro, else housing, else notables.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: RuleTable<Bucket>,
}

impl Classifier {
    pub fn new<S: AsRef<str>>(macro_keywords: &[S], housing_keywords: &[S]) -> anyhow::Result<Self> {
        let table = RuleTable::new(Bucket::Notables)
            .with_rule(Bucket::Macro, KeywordMatcher::new(macro_keywords)?)
            .with_rule(Bucket::Housing, KeywordMatcher::new(housing_keywords)?);
        Ok(Self { table })
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new(DEFAULT_MACRO_KEYWORDS, DEFAULT_HOUSING_KEYWORDS)
    }

    /// `body` must already be cleaned (see [`clean_text`](crate::ingest::clean_text)).
    pub fn classify(&self, title: &str, body: &str) -> Bucket {
        *self.table.first_match(&match_text(title, body))
    }

    pub fn table(&self) -> &RuleTable<Bucket> {
        &self.table
    }
}
