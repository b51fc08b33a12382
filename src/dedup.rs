//! Cross-source deduplication of near-identical events.
//!
//! Different sources list the same happening with small variations in
//! title, venue spelling, or time of day. A composite similarity score
//! (`0.5 * title + 0.3 * date + 0.2 * venue`) compares pairs from
//! disjoint sources; pairs at or above the threshold (inclusive) are
//! clustered with union-find, so transitive matches land in one cluster
//! even when the endpoints alone would score below the bar. Merging is
//! symmetric, idempotent, and order-independent.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::events::Event;
use crate::utils::fold_for_matching;

const TITLE_WEIGHT: f64 = 0.5;
const DATE_WEIGHT: f64 = 0.3;
const VENUE_WEIGHT: f64 = 0.2;

/// Composite similarity between two events, in `[0, 1]`.
///
/// Title and venue use normalized Levenshtein over folded text; the date
/// component is exact calendar-day equality. A venue missing on either
/// side contributes a neutral half score.
#[must_use]
pub fn similarity(a: &Event, b: &Event) -> f64 {
    let title = strsim::normalized_levenshtein(
        &fold_for_matching(&a.title),
        &fold_for_matching(&b.title),
    );

    let date = if a.start.date() == b.start.date() { 1.0 } else { 0.0 };

    let venue = match (a.venue.comparison_text(), b.venue.comparison_text()) {
        (Some(va), Some(vb)) => {
            strsim::normalized_levenshtein(&fold_for_matching(va), &fold_for_matching(vb))
        }
        _ => 0.5,
    };

    TITLE_WEIGHT * title + DATE_WEIGHT * date + VENUE_WEIGHT * venue
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Deterministic root choice keeps clustering order-independent
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}

/// Fold near-duplicate events from different sources into canonical
/// events. The result is ordered by (start, title, id) regardless of
/// input order.
#[must_use]
pub fn deduplicate(events: Vec<Event>, threshold: f64) -> Vec<Event> {
    if events.len() < 2 {
        return events;
    }

    let total = events.len();
    let mut uf = UnionFind::new(total);

    // Exact duplicates first: identical content fingerprints collapse
    // regardless of source
    let mut by_fingerprint: HashMap<&str, usize> = HashMap::new();
    for (i, event) in events.iter().enumerate() {
        match by_fingerprint.get(event.fingerprint.as_str()) {
            Some(&first) => uf.union(first, i),
            None => {
                by_fingerprint.insert(&event.fingerprint, i);
            }
        }
    }

    // Fuzzy pass across disjoint sources
    for i in 0..total {
        for j in (i + 1)..total {
            if events[i].shares_source_with(&events[j]) {
                continue;
            }
            let score = similarity(&events[i], &events[j]);
            if score >= threshold {
                debug!(
                    left = events[i].id,
                    right = events[j].id,
                    score,
                    "clustering near-duplicates"
                );
                uf.union(i, j);
            }
        }
    }

    // Collect clusters; sort members by id so the merge result does not
    // depend on input permutation
    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..total {
        let root = uf.find(i);
        clusters.entry(root).or_default().push(i);
    }

    let mut merged: Vec<Event> = clusters
        .into_values()
        .map(|mut members| {
            members.sort_by(|&a, &b| events[a].id.cmp(&events[b].id));
            merge_cluster(&events, &members)
        })
        .collect();

    let removed = total - merged.len();
    if removed > 0 {
        info!(total, removed, "deduplication folded near-duplicate events");
    }

    // Deterministic output order, re-established after aggregation
    merged.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

/// Merge one cluster into a single event. The representative (the most
/// complete member, id tie-break) keeps its identity fields; optional
/// fields are filled from the richer members and every member's source
/// attribution and id land in the lineage.
fn merge_cluster(events: &[Event], members: &[usize]) -> Event {
    let representative = members
        .iter()
        .copied()
        .max_by(|&a, &b| {
            events[a]
                .completeness()
                .cmp(&events[b].completeness())
                // Prefer the lexicographically smaller id on ties
                .then_with(|| events[b].id.cmp(&events[a].id))
        })
        .expect("clusters are never empty");

    let mut merged = events[representative].clone();

    for &index in members {
        if index == representative {
            continue;
        }
        let other = &events[index];

        merged.description = richer_text(merged.description.take(), other.description.clone());
        merged.end = merged.end.or(other.end);
        merged.venue.name = merged.venue.name.take().or_else(|| other.venue.name.clone());
        merged.venue.address = merged.venue.address.take().or_else(|| other.venue.address.clone());
        merged.venue.city = merged.venue.city.take().or_else(|| other.venue.city.clone());
        merged.venue.latitude = merged.venue.latitude.or(other.venue.latitude);
        merged.venue.longitude = merged.venue.longitude.or(other.venue.longitude);
        merged.organizer = merged.organizer.take().or_else(|| other.organizer.clone());
        merged.organizer_email = merged
            .organizer_email
            .take()
            .or_else(|| other.organizer_email.clone());
        merged.category = merged.category.take().or_else(|| other.category.clone());
        merged.event_url = merged.event_url.take().or_else(|| other.event_url.clone());
        merged.image_url = merged.image_url.take().or_else(|| other.image_url.clone());

        for tag in &other.tags {
            if !merged.tags.contains(tag) {
                merged.tags.push(tag.clone());
            }
        }
        for source in &other.sources {
            if !merged.sources.iter().any(|s| s.source_id == source.source_id) {
                merged.sources.push(source.clone());
            }
        }

        merged.merged_from.push(other.id.clone());
        merged
            .merged_from
            .extend(other.merged_from.iter().cloned());
    }

    merged.merged_from.sort();
    merged.merged_from.dedup();
    merged
}

fn richer_text(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.len() > a.len() { b } else { a }),
        (a, b) => a.or(b),
    }
}
