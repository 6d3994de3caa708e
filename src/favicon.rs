//! Favicon cache.
//!
//! Favicon rows are keyed by source URL and rewritten only when the caller's
//! icon instance changes identity (see [`crate::icon`]). Decoded icons are
//! kept in a bounded in-process cache in front of the `favicon` table. That
//! cache is best effort: any entry may be evicted at any time and is rebuilt
//! from storage on the next miss.

use moka::sync::Cache;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::Result;
use crate::hash::url_hash;
use crate::icon::{DEFAULT_FAVICON_SIZE, Icon};

/// Default number of decoded icons kept in memory.
pub const DEFAULT_CACHE_CAPACITY: u64 = 512;

/// Favicon store plus its in-memory decoded-icon cache.
#[derive(Debug, Clone)]
pub struct FaviconCache {
    icons: Cache<String, Icon>,
    size: u32,
}

impl Default for FaviconCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_FAVICON_SIZE)
    }
}

impl FaviconCache {
    /// Create a cache holding at most `capacity` decoded icons, storing
    /// rasters of `size`x`size`.
    #[must_use]
    pub fn new(capacity: u64, size: u32) -> Self {
        let icons = Cache::builder().max_capacity(capacity.max(1)).build();
        Self {
            icons,
            size: size.max(1),
        }
    }

    /// Map a favicon to its row id, inserting or refreshing the row.
    ///
    /// Returns `Ok(None)` when there is nothing to store (empty URL, absent
    /// or empty icon) and when a new row could not be inserted. A stale row
    /// whose refresh fails is still returned; an old icon is acceptable.
    ///
    /// # Errors
    ///
    /// Returns an error only if looking up the existing row fails.
    pub fn resolve(
        &self,
        conn: &Connection,
        favicon_url: &str,
        favicon: Option<&Icon>,
    ) -> Result<Option<i64>> {
        let Some(icon) = favicon.filter(|icon| !icon.is_null()) else {
            return Ok(None);
        };
        if favicon_url.is_empty() {
            return Ok(None);
        }

        let hash = url_hash(favicon_url);
        let existing: Option<(i64, i64)> = conn
            .query_row(
                "SELECT id, image_identity FROM favicon WHERE url_hash = ? AND url = ?",
                params![hash, favicon_url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, stored_identity)) = existing {
            if stored_identity != icon.identity() {
                self.refresh(conn, id, favicon_url, icon);
            }
            return Ok(Some(id));
        }

        let data = match icon.encode_png(self.size) {
            Ok(data) => data,
            Err(e) => {
                warn!(url = %favicon_url, error = %e, "Failed to encode new favicon");
                return Ok(None);
            }
        };
        match conn.execute(
            "INSERT INTO favicon (url, url_hash, image_identity, data) VALUES (?, ?, ?, ?)",
            params![favicon_url, hash, icon.identity(), data],
        ) {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                debug!(url = %favicon_url, id, "Inserted favicon");
                Ok(Some(id))
            }
            Err(e) => {
                warn!(url = %favicon_url, error = %e, "Failed to insert favicon");
                Ok(None)
            }
        }
    }

    fn refresh(&self, conn: &Connection, id: i64, favicon_url: &str, icon: &Icon) {
        let data = match icon.encode_png(self.size) {
            Ok(data) => data,
            Err(e) => {
                warn!(url = %favicon_url, error = %e, "Failed to encode favicon; keeping stale icon");
                return;
            }
        };
        match conn.execute(
            "UPDATE favicon SET image_identity = ?, data = ? WHERE id = ?",
            params![icon.identity(), data, id],
        ) {
            Ok(_) => {
                self.icons.invalidate(favicon_url);
                debug!(url = %favicon_url, id, "Refreshed favicon");
            }
            Err(e) => warn!(url = %favicon_url, error = %e, "Failed to refresh favicon"),
        }
    }

    /// Look up a decoded favicon by its source URL.
    ///
    /// Absence is a normal outcome: an empty URL, a missing row, undecodable
    /// bytes and storage failures all return `None`.
    #[must_use]
    pub fn lookup(&self, conn: &Connection, favicon_url: &str) -> Option<Icon> {
        if favicon_url.is_empty() {
            return None;
        }
        if let Some(icon) = self.icons.get(favicon_url) {
            return Some(icon);
        }

        let data: Option<Vec<u8>> = match conn
            .query_row(
                "SELECT data FROM favicon WHERE url_hash = ? AND url = ?",
                params![url_hash(favicon_url), favicon_url],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(data) => data,
            Err(e) => {
                warn!(url = %favicon_url, error = %e, "Favicon lookup failed");
                return None;
            }
        };

        let icon = match Icon::decode_png(&data?) {
            Ok(icon) => icon,
            Err(e) => {
                warn!(url = %favicon_url, error = %e, "Stored favicon is not decodable");
                return None;
            }
        };
        self.icons.insert(favicon_url.to_string(), icon.clone());
        Some(icon)
    }

    /// Drop every decoded icon held in memory.
    pub fn clear(&self) {
        self.icons.invalidate_all();
    }

    /// Whether a decoded icon for `favicon_url` is currently held in memory.
    #[must_use]
    pub fn is_cached(&self, favicon_url: &str) -> bool {
        self.icons.contains_key(favicon_url)
    }
}
