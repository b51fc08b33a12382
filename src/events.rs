//! Canonical event schema produced by normalization and handed downstream.
//!
//! An [`Event`] is created by the normalizer, potentially merged once by the
//! deduplicator, and otherwise immutable. Identity is a stable hash of the
//! title, start time and originating source, so repeated runs derive the
//! same id for the same listing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::constants::{DEFAULT_COUNTRY, DEFAULT_TIMEZONE};
use crate::utils::fold_for_matching;

/// Venue details attached to an event. All location fields are optional
/// except the country, which defaults to the configured region's country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: String,
}

impl Default for Venue {
    fn default() -> Self {
        Self {
            name: None,
            address: None,
            city: None,
            latitude: None,
            longitude: None,
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

impl Venue {
    /// Best available venue text for similarity comparison.
    #[must_use]
    pub fn comparison_text(&self) -> Option<&str> {
        self.name.as_deref().or(self.city.as_deref())
    }
}

/// Attribution linking an event back to the source it was scraped from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub source_name: String,
    pub source_url: String,
}

/// A normalized, canonical event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable derived id: `evt_` + 12 hex chars of the content hash
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    /// IANA timezone name the start/end times are local to
    pub timezone: String,
    pub venue: Venue,
    pub organizer: Option<String>,
    pub organizer_email: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub event_url: Option<String>,
    pub image_url: Option<String>,
    pub slug: String,
    /// Every source this event was observed at; more than one after a merge
    pub sources: Vec<SourceRef>,
    /// Content fingerprint used for exact-duplicate detection
    pub fingerprint: String,
    /// Ids of events folded into this one by the deduplicator
    pub merged_from: Vec<String>,
    pub scraped_at: DateTime<Utc>,
}

impl Event {
    /// Derive the stable event id from identity fields.
    #[must_use]
    pub fn stable_id(title: &str, start: NaiveDateTime, source_url: &str) -> String {
        let input = format!("{title}|{start}|{source_url}");
        let digest = xxhash_rust::xxh3::xxh3_64(input.as_bytes());
        let hex = hex::encode(digest.to_be_bytes());
        format!("evt_{}", &hex[..12])
    }

    /// Content fingerprint over folded title, start day and venue text.
    /// Events that fold to the same fingerprint are exact duplicates.
    #[must_use]
    pub fn content_fingerprint(
        title: &str,
        start: NaiveDateTime,
        venue_text: Option<&str>,
    ) -> String {
        let input = format!(
            "{}|{}|{}",
            fold_for_matching(title),
            start.date(),
            fold_for_matching(venue_text.unwrap_or("")),
        );
        hex::encode(xxhash_rust::xxh3::xxh3_64(input.as_bytes()).to_be_bytes())
    }

    /// Count of populated optional fields, used to pick the richer member
    /// of a dedup cluster as its representative.
    #[must_use]
    pub fn completeness(&self) -> usize {
        let mut score = 0;
        score += usize::from(self.description.is_some());
        score += usize::from(self.end.is_some());
        score += usize::from(self.venue.name.is_some());
        score += usize::from(self.venue.address.is_some());
        score += usize::from(self.venue.city.is_some());
        score += usize::from(self.venue.latitude.is_some());
        score += usize::from(self.organizer.is_some());
        score += usize::from(self.organizer_email.is_some());
        score += usize::from(self.category.is_some());
        score += usize::from(self.event_url.is_some());
        score += usize::from(self.image_url.is_some());
        score += self.tags.len().min(3);
        score
    }

    /// True when the two events share at least one source attribution.
    /// The deduplicator only fuzzy-merges events from disjoint sources.
    #[must_use]
    pub fn shares_source_with(&self, other: &Event) -> bool {
        self.sources
            .iter()
            .any(|a| other.sources.iter().any(|b| a.source_id == b.source_id))
    }
}

/// Convenience constructor used by the normalizer and tests.
#[derive(Debug, Default)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub venue: Venue,
    pub organizer: Option<String>,
    pub organizer_email: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub event_url: Option<String>,
    pub image_url: Option<String>,
}

impl EventDraft {
    /// Finalize a draft into a canonical event. Returns `None` when the
    /// draft is missing its identity fields (title or start time).
    #[must_use]
    pub fn finalize(self, source: SourceRef) -> Option<Event> {
        let start = self.start?;
        if self.title.trim().is_empty() {
            return None;
        }

        let title = self.title;
        let fingerprint =
            Event::content_fingerprint(&title, start, self.venue.comparison_text());
        let id = Event::stable_id(&title, start, &source.source_url);
        let slug = crate::utils::slugify(&title, crate::utils::constants::MAX_SLUG_LEN);

        Some(Event {
            id,
            title,
            description: self.description,
            start,
            end: self.end,
            timezone: DEFAULT_TIMEZONE.to_string(),
            venue: self.venue,
            organizer: self.organizer,
            organizer_email: self.organizer_email,
            category: self.category,
            tags: self.tags,
            event_url: self.event_url,
            image_url: self.image_url,
            slug,
            sources: vec![source],
            fingerprint,
            merged_from: Vec::new(),
            scraped_at: Utc::now(),
        })
    }
}
