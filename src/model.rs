//! Data models for the page index.
//!
//! These mirror the rows of the `autocomplete_page` and `favicon` tables plus
//! the shapes handed back to the UI layer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::icon::Icon;

/// One row per distinct visited URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitedPage {
    pub id: i64,
    pub url: String,
    pub url_hash: i64,
    pub schemeless_url: String,
    pub title: String,
    pub favicon_id: Option<i64>,
    /// Seconds since the Unix epoch.
    pub last_visited: i64,
    pub visit_count: i64,
    pub frecency: i64,
}

impl VisitedPage {
    /// Last visit as a UTC timestamp.
    #[must_use]
    pub fn last_visited_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.last_visited, 0)
    }
}

/// One row per distinct favicon URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaviconEntry {
    pub id: i64,
    pub url: String,
    pub url_hash: i64,
    /// Identity token of the icon instance that produced `data`.
    pub image_identity: i64,
    /// PNG-encoded raster.
    pub data: Vec<u8>,
}

/// A single autocomplete candidate.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub url: String,
    pub title: String,
    /// Source URL of the favicon, if the page has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(skip)]
    pub favicon: Option<Icon>,
}

/// What a recorded visit did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
    /// First visit; a new row was created.
    Inserted,
    /// Existing row updated in place.
    Updated,
}

/// Rows removed by one expiration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpireStats {
    pub pages_removed: usize,
    pub favicons_removed: usize,
}

/// Aggregate counts for `pageindex stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub pages: i64,
    pub favicons: i64,
    pub orphan_favicons: i64,
    pub total_visits: i64,
    pub oldest_visit: Option<DateTime<Utc>>,
    pub newest_visit: Option<DateTime<Utc>>,
    pub db_size_bytes: Option<i64>,
}
