//! Source descriptors: the configured origins a run harvests from.
//!
//! The source list is an external boundary contract: an ordered collection
//! of records loaded once per run, immutable for the run's duration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// What kind of origin a source is. Social pages always require a browser
/// session; websites may be fetched either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Website,
    SocialPage,
}

/// Fetch method hint carried by the source configuration.
///
/// `Auto` is resolved at dispatch time by a structural probe of a
/// lightweight fetch; ambiguity falls back to the session fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    Lightweight,
    Browser,
    #[default]
    Auto,
}

/// One configured origin to be scraped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub method: FetchMethod,
    #[serde(default)]
    pub priority: u32,
    /// Per-source override of the global health-check switch
    #[serde(default)]
    pub health_check: Option<bool>,
}

fn default_active() -> bool {
    true
}

impl Source {
    /// Attribution record stamped onto every event from this source.
    #[must_use]
    pub fn attribution(&self) -> crate::events::SourceRef {
        crate::events::SourceRef {
            source_id: self.id.clone(),
            source_name: self.name.clone(),
            source_url: self.url.clone(),
        }
    }
}

/// Errors raised while loading the source list.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read source list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse source list {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate source id: {0}")]
    DuplicateId(String),
}

/// Load the full source list from a JSON file, preserving order.
/// Duplicate ids are rejected: the dispatcher assigns each source to
/// exactly one worker and keys outcomes by id.
pub fn load_sources(path: &Path) -> Result<Vec<Source>, SourceError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let sources: Vec<Source> =
        serde_json::from_str(&raw).map_err(|source| SourceError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    let mut seen = HashSet::new();
    for source in &sources {
        if !seen.insert(source.id.clone()) {
            return Err(SourceError::DuplicateId(source.id.clone()));
        }
    }

    Ok(sources)
}

/// Filter down to the sources a run will actually dispatch: active ones,
/// further restricted to an explicit subset when one is given.
#[must_use]
pub fn select_active(sources: Vec<Source>, subset: Option<&[String]>) -> Vec<Source> {
    sources
        .into_iter()
        .filter(|s| s.active)
        .filter(|s| match subset {
            Some(ids) => ids.iter().any(|id| id == &s.id),
            None => true,
        })
        .collect()
}
