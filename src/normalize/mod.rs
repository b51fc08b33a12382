//! Normalization: raw page content into canonical events.
//!
//! Extraction runs three strategies in order of reliability (schema.org
//! JSON-LD blocks, common listing container markup, and dated anchor
//! patterns as a last resort), then cleans, validates, and finalizes each
//! candidate. A malformed record is dropped and logged; it never fails
//! the whole source.

pub mod dates;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::events::{Event, EventDraft, Venue};
use crate::fetch::RawContent;
use crate::sources::Source;
use crate::utils::constants::{MAX_TITLE_LEN, MIN_TITLE_LEN};
use crate::utils::{collapse_whitespace, fold_for_matching};

/// A single record that failed validation. Dropped and logged, never
/// propagated.
#[derive(Debug, thiserror::Error)]
#[error("invalid event record: {0}")]
pub struct NormalizationError(pub String);

static JSONLD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));
static CONTAINERS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[class*="event"], [class*="listing"], [itemtype*="Event"]"#)
        .expect("valid selector")
});
static HEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4").expect("valid selector"));
static TITLE_CLASSED: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="title"]"#).expect("valid selector"));
static TIME_TAG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("valid selector"));
static DATE_CLASSED: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="date"]"#).expect("valid selector"));
static DESCRIPTION_CLASSED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[class*="description"], [class*="excerpt"], [class*="summary"]"#)
        .expect("valid selector")
});
static VENUE_CLASSED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[class*="venue"], [class*="location"]"#).expect("valid selector")
});
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").expect("valid selector"));
static OG_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property^="og:"]"#).expect("valid selector"));

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static TEXT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})|(\d{1,2}[./]\d{1,2}[./]\d{4})").expect("valid regex")
});

const ANCHOR_EVENT_KEYWORDS: &[&str] =
    &["event", "concert", "show", "festival", "exhibition", "conference"];
const MAX_ANCHOR_EVENTS: usize = 50;

/// Page-level Open Graph metadata used to enrich sparse records.
#[derive(Debug, Default)]
struct OpenGraph {
    description: Option<String>,
    image: Option<String>,
}

/// Parses raw page content into the canonical event schema.
#[derive(Debug, Default, Clone)]
pub struct Normalizer;

impl Normalizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalize one source's raw content. Malformed records are dropped
    /// with a log line; the returned events all carry this source's
    /// attribution.
    #[must_use]
    pub fn normalize(&self, raw: &RawContent, source: &Source) -> Vec<Event> {
        let document = Html::parse_document(&raw.html);
        let base = raw
            .final_url
            .as_deref()
            .unwrap_or(&source.url)
            .parse::<Url>()
            .ok();

        let mut drafts = extract_jsonld(&document, base.as_ref());
        drafts.extend(extract_containers(&document, base.as_ref()));
        if drafts.is_empty() {
            drafts = extract_anchor_patterns(&document, base.as_ref());
        }

        let og = extract_open_graph(&document, base.as_ref());

        let mut events = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut dropped = 0;

        for mut draft in drafts {
            draft.category = draft.category.take().or_else(|| source.category.clone());
            if draft.description.is_none() {
                draft.description = og.description.clone();
            }
            if draft.image_url.is_none() {
                draft.image_url = og.image.clone();
            }

            match finalize_draft(draft, source) {
                Ok(event) => {
                    let key = (fold_for_matching(&event.title), event.start);
                    if seen.insert(key) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    trace!(source = source.id, %e, "dropping malformed record");
                    dropped += 1;
                }
            }
        }

        debug!(
            source = source.id,
            kept = events.len(),
            dropped,
            "normalization finished"
        );
        events
    }
}

/// Clean and validate a draft, producing a canonical event.
fn finalize_draft(mut draft: EventDraft, source: &Source) -> Result<Event, NormalizationError> {
    draft.title = clean_text(&draft.title);
    if draft.title.len() < MIN_TITLE_LEN {
        return Err(NormalizationError(format!(
            "title too short: {:?}",
            draft.title
        )));
    }
    if draft.title.len() > MAX_TITLE_LEN {
        return Err(NormalizationError("title too long".into()));
    }

    let start = draft
        .start
        .ok_or_else(|| NormalizationError("missing or unparseable start date".into()))?;

    // A reversed range is a listing quirk, not an invalid event
    if let Some(end) = draft.end
        && end < start
    {
        draft.start = Some(end);
        draft.end = Some(start);
    }

    draft.description = draft.description.map(|d| clean_text(&d)).filter(|d| !d.is_empty());
    draft.venue.name = draft.venue.name.map(|v| clean_text(&v)).filter(|v| !v.is_empty());
    draft.venue.city = draft.venue.city.map(|v| clean_text(&v)).filter(|v| !v.is_empty());
    draft.organizer = draft.organizer.map(|o| clean_text(&o)).filter(|o| !o.is_empty());

    draft.event_url = draft.event_url.filter(|u| Url::parse(u).is_ok());
    draft.image_url = draft.image_url.filter(|u| Url::parse(u).is_ok());
    draft.organizer_email = draft.organizer_email.filter(|e| EMAIL.is_match(e));

    draft
        .finalize(source.attribution())
        .ok_or_else(|| NormalizationError("draft missing identity fields".into()))
}

/// Strip markup and entities from scraped text and collapse whitespace.
fn clean_text(raw: &str) -> String {
    let text = if raw.contains('<') {
        let fragment = Html::parse_fragment(raw);
        fragment.root_element().text().collect::<String>()
    } else {
        raw.to_string()
    };
    collapse_whitespace(&html_escape::decode_html_entities(&text))
}

fn resolve_url(base: Option<&Url>, candidate: &str) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(trimmed).ok().map(|u| u.to_string()),
        None => Url::parse(trimmed).ok().map(|u| u.to_string()),
    }
}

// --- Strategy 1: schema.org JSON-LD ---

const EVENT_TYPES: &[&str] = &[
    "Event",
    "SocialEvent",
    "MusicEvent",
    "TheaterEvent",
    "SportsEvent",
    "Festival",
];

fn extract_jsonld(document: &Html, base: Option<&Url>) -> Vec<EventDraft> {
    let mut drafts = Vec::new();

    for script in document.select(&JSONLD) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };

        let items: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => match map.get("@graph").and_then(Value::as_array) {
                Some(graph) => graph.iter().collect(),
                None => vec![&value],
            },
            _ => continue,
        };

        for item in items {
            if is_event_type(item)
                && let Some(draft) = parse_schema_event(item, base)
            {
                drafts.push(draft);
            }
        }
    }

    drafts
}

fn is_event_type(item: &Value) -> bool {
    match item.get("@type") {
        Some(Value::String(t)) => EVENT_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| EVENT_TYPES.contains(&t)),
        _ => false,
    }
}

fn parse_schema_event(item: &Value, base: Option<&Url>) -> Option<EventDraft> {
    let title = item.get("name").and_then(Value::as_str)?.to_string();

    let mut draft = EventDraft {
        title,
        description: item
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        start: item
            .get("startDate")
            .and_then(Value::as_str)
            .and_then(dates::parse_event_date),
        end: item
            .get("endDate")
            .and_then(Value::as_str)
            .and_then(dates::parse_event_date),
        ..EventDraft::default()
    };

    if let Some(location) = item.get("location").filter(|l| l.is_object()) {
        draft.venue.name = location.get("name").and_then(Value::as_str).map(str::to_string);
        if let Some(address) = location.get("address") {
            match address {
                Value::Object(_) => {
                    draft.venue.address = address
                        .get("streetAddress")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    draft.venue.city = address
                        .get("addressLocality")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                Value::String(s) => draft.venue.address = Some(s.clone()),
                _ => {}
            }
        }
        if let Some(geo) = location.get("geo") {
            draft.venue.latitude = geo.get("latitude").and_then(Value::as_f64);
            draft.venue.longitude = geo.get("longitude").and_then(Value::as_f64);
        }
    }

    draft.image_url = match item.get("image") {
        Some(Value::String(s)) => resolve_url(base, s),
        Some(Value::Array(items)) => items
            .first()
            .and_then(Value::as_str)
            .and_then(|s| resolve_url(base, s)),
        Some(Value::Object(map)) => map
            .get("url")
            .and_then(Value::as_str)
            .and_then(|s| resolve_url(base, s)),
        _ => None,
    };

    draft.event_url = item
        .get("url")
        .and_then(Value::as_str)
        .and_then(|s| resolve_url(base, s));

    if let Some(organizer) = item.get("organizer").filter(|o| o.is_object()) {
        draft.organizer = organizer.get("name").and_then(Value::as_str).map(str::to_string);
        draft.organizer_email = organizer
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    Some(draft)
}

// --- Strategy 2: common listing containers ---

fn extract_containers(document: &Html, base: Option<&Url>) -> Vec<EventDraft> {
    let mut drafts = Vec::new();

    for container in document.select(&CONTAINERS) {
        // Only leaf-most matches: a listing wrapper that contains another
        // matching container would double-count its cards
        if container.select(&CONTAINERS).next().is_some() {
            continue;
        }
        if let Some(draft) = extract_from_container(container, base) {
            drafts.push(draft);
        }
    }

    drafts
}

fn extract_from_container(container: ElementRef<'_>, base: Option<&Url>) -> Option<EventDraft> {
    let title_el = container
        .select(&TITLE_CLASSED)
        .next()
        .or_else(|| container.select(&HEADINGS).next())?;
    let title = collapse_whitespace(&title_el.text().collect::<String>());
    if title.is_empty() {
        return None;
    }

    let start = container
        .select(&TIME_TAG)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .and_then(dates::parse_event_date)
        .or_else(|| {
            container
                .select(&DATE_CLASSED)
                .next()
                .map(|d| d.text().collect::<String>())
                .and_then(|text| parse_date_from_text(&text))
        });

    let event_url = container
        .select(&ANCHOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(base, href));
    let image_url = container
        .select(&IMG)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve_url(base, src));
    let description = container
        .select(&DESCRIPTION_CLASSED)
        .next()
        .map(|d| collapse_whitespace(&d.text().collect::<String>()));
    let venue_name = container
        .select(&VENUE_CLASSED)
        .next()
        .map(|v| collapse_whitespace(&v.text().collect::<String>()));

    Some(EventDraft {
        title,
        description,
        start,
        venue: Venue {
            name: venue_name,
            ..Venue::default()
        },
        event_url,
        image_url,
        ..EventDraft::default()
    })
}

// --- Strategy 3: dated anchor patterns ---

fn extract_anchor_patterns(document: &Html, base: Option<&Url>) -> Vec<EventDraft> {
    let mut drafts = Vec::new();

    for anchor in document.select(&ANCHOR) {
        if drafts.len() >= MAX_ANCHOR_EVENTS {
            break;
        }

        let href = anchor.value().attr("href").unwrap_or_default();
        let text = collapse_whitespace(&anchor.text().collect::<String>());
        if text.len() < 10 {
            continue;
        }

        let href_lower = href.to_lowercase();
        if !ANCHOR_EVENT_KEYWORDS.iter().any(|kw| href_lower.contains(kw)) {
            continue;
        }

        // The anchor's surrounding element often carries the listing date
        let context: String = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| p.text().collect())
            .unwrap_or_else(|| text.clone());
        let Some(start) = parse_date_from_text(&context) else {
            continue;
        };

        drafts.push(EventDraft {
            title: text,
            start: Some(start),
            event_url: resolve_url(base, href),
            ..EventDraft::default()
        });
    }

    drafts
}

/// Find and parse the first date-looking token in free text.
fn parse_date_from_text(text: &str) -> Option<chrono::NaiveDateTime> {
    let normalized = collapse_whitespace(text);
    if let Some(found) = TEXT_DATE.find(&normalized) {
        return dates::parse_event_date(found.as_str());
    }
    dates::parse_event_date(&normalized)
}

// --- Page-level Open Graph enrichment ---

fn extract_open_graph(document: &Html, base: Option<&Url>) -> OpenGraph {
    let mut og = OpenGraph::default();

    for meta in document.select(&OG_META) {
        let Some(property) = meta.value().attr("property") else {
            continue;
        };
        let Some(content) = meta.value().attr("content") else {
            continue;
        };
        match property {
            "og:description" if og.description.is_none() => {
                og.description = Some(collapse_whitespace(content));
            }
            "og:image" if og.image.is_none() => {
                og.image = resolve_url(base, content);
            }
            _ => {}
        }
    }

    og
}
