//! Streaming RSS 2.0 / RSS 1.0 (RDF) / Atom parser.
//!
//! Produces [`RawEntry`] records holding every field the pipeline cares about,
//! as untouched text. Element names are matched on their local part, so
//! `dc:date`, `content:encoded` and `atom:link` are seen as `date`, `encoded`
//! and `link`. Entity decoding is left to [`clean_text`](crate::ingest::clean_text),
//! which tolerates the HTML entities (`&nbsp;`, `&mdash;`) feeds routinely
//! embed without declaring.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::SourceError;
use crate::ingest::clean_text;
use crate::ingest::types::FeedEntry;

/// Fields of one `<item>` / `<entry>` before defaulting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// `guid` (RSS) or `id` (Atom).
    pub guid: Option<String>,
    /// `description` (RSS) or `summary` (Atom).
    pub summary: Option<String>,
    /// `content:encoded` (RSS) or `content` (Atom).
    pub content: Option<String>,
    pub published: Vec<String>,
    pub updated: Vec<String>,
    pub created: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Title,
    Link,
    Guid,
    Summary,
    Content,
    Published,
    Updated,
    Created,
}

impl FieldKind {
    fn from_local_name(name: &str) -> Option<Self> {
        Some(match name {
            "title" => FieldKind::Title,
            "link" => FieldKind::Link,
            "guid" | "id" => FieldKind::Guid,
            "description" | "summary" => FieldKind::Summary,
            "encoded" | "content" => FieldKind::Content,
            "pubdate" | "published" | "issued" | "date" => FieldKind::Published,
            "updated" | "modified" => FieldKind::Updated,
            "created" => FieldKind::Created,
            _ => return None,
        })
    }
}

struct Capture {
    kind: FieldKind,
    depth: usize,
    text: String,
}

impl RawEntry {
    fn set(&mut self, kind: FieldKind, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        let slot = match kind {
            FieldKind::Title => &mut self.title,
            FieldKind::Link => &mut self.link,
            FieldKind::Guid => &mut self.guid,
            FieldKind::Summary => &mut self.summary,
            FieldKind::Content => &mut self.content,
            FieldKind::Published => return self.published.push(text),
            FieldKind::Updated => return self.updated.push(text),
            FieldKind::Created => return self.created.push(text),
        };
        if slot.is_none() {
            *slot = Some(text);
        }
    }

    /// Timestamp candidates in priority order: published, updated, created.
    pub fn timestamp_candidates(&self) -> impl Iterator<Item = &str> {
        self.published
            .iter()
            .chain(&self.updated)
            .chain(&self.created)
            .map(String::as_str)
    }

    /// First candidate that parses, or `None` ("unknown").
    pub fn resolve_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_candidates().find_map(parse_timestamp)
    }

    /// Resolve defaults. Returns `None` when the entry has no usable title or link.
    pub fn into_entry(self, source: &str) -> Option<FeedEntry> {
        let published_at = self.resolve_timestamp();

        let title = clean_text(self.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            return None;
        }

        let link = self
            .link
            .or_else(|| self.guid.filter(|g| is_http_url(g)))
            .map(|l| html_escape::decode_html_entities(l.trim()).into_owned())
            .filter(|l| !l.is_empty())?;

        Some(FeedEntry {
            title,
            link,
            published_at,
            body: self.summary.or(self.content).unwrap_or_default(),
            source: source.to_string(),
        })
    }
}

fn is_http_url(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("http://") || s.starts_with("https://")
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Atom-style `<link href="..">`; only the alternate (or unqualified) link counts.
fn link_href(e: &BytesStart<'_>) -> Option<String> {
    let href = attr(e, "href")?;
    match attr(e, "rel").as_deref() {
        None | Some("alternate") => Some(href),
        Some(_) => None,
    }
}

fn push_text(buf: &mut String, chunk: &str) {
    let chunk = chunk.trim();
    if chunk.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(chunk);
}

fn is_feed_root(name: &str) -> bool {
    matches!(name, "rss" | "rdf" | "feed")
}

fn is_entry_element(name: &str) -> bool {
    matches!(name, "item" | "entry")
}

/// Parse a feed document into raw entries, in document order.
pub fn parse_document(xml: &str) -> Result<Vec<RawEntry>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut root_seen = false;
    let mut entries = Vec::new();
    // (depth of the <item>/<entry> element, fields so far)
    let mut current: Option<(usize, RawEntry)> = None;
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                let name = local_name(&e);
                if depth == 1 {
                    if !is_feed_root(&name) {
                        return Err(SourceError::Parse(format!(
                            "unexpected root element <{name}>"
                        )));
                    }
                    root_seen = true;
                    continue;
                }
                if capture.is_some() {
                    continue;
                }
                match current.as_mut() {
                    None if is_entry_element(&name) => {
                        current = Some((depth, RawEntry::default()));
                    }
                    Some((item_depth, entry)) if depth == *item_depth + 1 => {
                        if name == "link" {
                            if let Some(href) = link_href(&e) {
                                entry.set(FieldKind::Link, href);
                            }
                        }
                        if let Some(kind) = FieldKind::from_local_name(&name) {
                            capture = Some(Capture {
                                kind,
                                depth,
                                text: String::new(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    return Err(SourceError::Parse("empty root element".into()));
                }
                if let Some((item_depth, entry)) = current.as_mut() {
                    if depth == *item_depth && capture.is_none() && local_name(&e) == "link" {
                        if let Some(href) = link_href(&e) {
                            entry.set(FieldKind::Link, href);
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some(c) = capture.as_mut() {
                    push_text(&mut c.text, &String::from_utf8_lossy(&t));
                }
            }
            Event::CData(t) => {
                if let Some(c) = capture.as_mut() {
                    push_text(&mut c.text, &String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(_) => {
                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let (Some(c), Some((_, entry))) = (capture.take(), current.as_mut()) {
                        entry.set(c.kind, c.text);
                    }
                } else if current.as_ref().is_some_and(|(d, _)| *d == depth) {
                    if let Some((_, entry)) = current.take() {
                        entries.push(entry);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(SourceError::Parse("no rss, rdf or atom root element".into()));
    }
    if depth != 0 {
        return Err(SourceError::Parse("unexpected end of document".into()));
    }
    Ok(entries)
}

/// Parse a feed timestamp. Accepts RFC 3339, RFC 2822 (including obsolete
/// named zones such as `GMT`/`EST`), and bare ISO dates read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return DateTime::from_timestamp(dt.unix_timestamp(), 0);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}
