//! Visit ledger: records page visits and keeps frecency current.
//!
//! Each visit is an update-first upsert keyed by `(url_hash, url)`: update
//! the existing row, and insert only if nothing was updated. The two
//! statements are not atomic. Two writers recording the same new URL at
//! once can both see zero rows updated and both insert, leaving a duplicate
//! row. Visit recording therefore requires a single writer per database;
//! callers with several producer threads must funnel visits through one
//! queue. `pageindex doctor` reports duplicates if the contract is broken.

use rusqlite::{Connection, params};
use tracing::debug;

use crate::error::{PageIndexError, Result};
use crate::favicon::FaviconCache;
use crate::hash::url_hash;
use crate::icon::Icon;
use crate::model::VisitOutcome;

/// Default worth of one visit: three days of recency.
pub const DEFAULT_VISIT_WEIGHT_SECONDS: i64 = 3 * 24 * 60 * 60;

const SCHEME_SEPARATOR: &str = "://";

/// Strip `scheme://` from a URL. `None` if there is no separator.
#[must_use]
pub fn schemeless(url: &str) -> Option<&str> {
    url.find(SCHEME_SEPARATOR)
        .map(|idx| &url[idx + SCHEME_SEPARATOR.len()..])
}

/// Frecency after `visit_count` visits, the latest at `now`.
///
/// Recomputed from scratch on every visit: each visit pushes the decay
/// horizon back by `visit_weight` seconds, so a page seen often eventually
/// outranks one seen once more recently.
#[must_use]
pub const fn frecency(now: i64, visit_count: i64, visit_weight: i64) -> i64 {
    now.saturating_add(visit_count.saturating_mul(visit_weight))
}

/// A single page visit as reported by the host.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub favicon_url: &'a str,
    pub favicon: Option<&'a Icon>,
}

/// Records visits against the page table.
#[derive(Debug, Clone, Copy)]
pub struct VisitLedger {
    visit_weight: i64,
}

impl Default for VisitLedger {
    fn default() -> Self {
        Self::new(DEFAULT_VISIT_WEIGHT_SECONDS)
    }
}

impl VisitLedger {
    #[must_use]
    pub const fn new(visit_weight: i64) -> Self {
        Self { visit_weight }
    }

    #[must_use]
    pub const fn visit_weight(&self) -> i64 {
        self.visit_weight
    }

    /// Record a visit observed at `now` (seconds since the epoch).
    ///
    /// The favicon is resolved first; if that fails, the page row is not
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`PageIndexError::InvalidUrl`] before any I/O if the URL has
    /// no scheme separator, or [`PageIndexError::Storage`] if a statement
    /// fails.
    pub fn mark_visit(
        &self,
        conn: &Connection,
        favicons: &FaviconCache,
        visit: &Visit<'_>,
        now: i64,
    ) -> Result<VisitOutcome> {
        let schemeless_url =
            schemeless(visit.url).ok_or_else(|| PageIndexError::invalid_url(visit.url))?;
        let hash = url_hash(visit.url);
        let favicon_id = favicons.resolve(conn, visit.favicon_url, visit.favicon)?;

        let updated = conn.execute(
            r"
            UPDATE autocomplete_page SET
                schemeless_url = ?,
                title = ?,
                favicon_id = ?,
                last_visited = ?,
                visit_count = visit_count + 1,
                frecency = ? + ((visit_count + 1) * ?)
            WHERE url_hash = ? AND url = ?
            ",
            params![
                schemeless_url,
                visit.title,
                favicon_id,
                now,
                now,
                self.visit_weight,
                hash,
                visit.url
            ],
        )?;
        if updated > 0 {
            debug!(url = %visit.url, "Updated visited page");
            return Ok(VisitOutcome::Updated);
        }

        conn.execute(
            r"
            INSERT INTO autocomplete_page (
                url, url_hash, schemeless_url, title,
                favicon_id, last_visited, visit_count, frecency
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            ",
            params![
                visit.url,
                hash,
                schemeless_url,
                visit.title,
                favicon_id,
                now,
                frecency(now, 1, self.visit_weight)
            ],
        )?;
        debug!(url = %visit.url, "Inserted visited page");
        Ok(VisitOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    const NOW: i64 = 1_700_000_000;

    fn visit<'a>(url: &'a str, title: &'a str) -> Visit<'a> {
        Visit {
            url,
            title,
            favicon_url: "",
            favicon: None,
        }
    }

    fn page_count(storage: &Storage) -> i64 {
        storage
            .connection()
            .query_row("SELECT COUNT(*) FROM autocomplete_page", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_schemeless() {
        assert_eq!(schemeless("https://example.com/a"), Some("example.com/a"));
        assert_eq!(schemeless("file:///tmp/x"), Some("/tmp/x"));
        assert_eq!(schemeless("example.com/a"), None);
    }

    #[test]
    fn test_frecency_grows_with_visits() {
        let w = DEFAULT_VISIT_WEIGHT_SECONDS;
        assert_eq!(frecency(NOW, 1, w), NOW + w);
        assert!(frecency(NOW, 2, w) > frecency(NOW, 1, w));
        assert_eq!(frecency(i64::MAX, 5, w), i64::MAX);
    }

    #[test]
    fn test_first_visit_inserts() {
        let storage = Storage::open_memory().unwrap();
        let ledger = VisitLedger::default();
        let favicons = FaviconCache::default();

        let outcome = ledger
            .mark_visit(storage.connection(), &favicons, &visit("https://example.com/a", "A"), NOW)
            .unwrap();
        assert_eq!(outcome, VisitOutcome::Inserted);

        let page = storage.get_page("https://example.com/a").unwrap().unwrap();
        assert_eq!(page.visit_count, 1);
        assert_eq!(page.title, "A");
        assert_eq!(page.schemeless_url, "example.com/a");
        assert_eq!(page.last_visited, NOW);
        assert_eq!(page.frecency, NOW + DEFAULT_VISIT_WEIGHT_SECONDS);
        assert_eq!(page.favicon_id, None);
    }

    #[test]
    fn test_repeat_visits_keep_one_row() {
        let storage = Storage::open_memory().unwrap();
        let ledger = VisitLedger::default();
        let favicons = FaviconCache::default();

        for n in 0..5 {
            ledger
                .mark_visit(
                    storage.connection(),
                    &favicons,
                    &visit("https://example.com/a", "A"),
                    NOW + n,
                )
                .unwrap();
        }
        assert_eq!(page_count(&storage), 1);
        let page = storage.get_page("https://example.com/a").unwrap().unwrap();
        assert_eq!(page.visit_count, 5);
        assert_eq!(page.last_visited, NOW + 4);
        assert_eq!(page.frecency, NOW + 4 + 5 * DEFAULT_VISIT_WEIGHT_SECONDS);
    }

    #[test]
    fn test_second_visit_same_instant_raises_frecency() {
        let storage = Storage::open_memory().unwrap();
        let ledger = VisitLedger::new(100);
        let favicons = FaviconCache::default();
        let url = "https://example.com/a";

        ledger
            .mark_visit(storage.connection(), &favicons, &visit(url, "A"), NOW)
            .unwrap();
        let once = storage.get_page(url).unwrap().unwrap().frecency;
        let outcome = ledger
            .mark_visit(storage.connection(), &favicons, &visit(url, "A2"), NOW)
            .unwrap();
        assert_eq!(outcome, VisitOutcome::Updated);

        let page = storage.get_page(url).unwrap().unwrap();
        assert!(page.frecency > once);
        assert_eq!(page.frecency, NOW + 200);
        assert_eq!(page.title, "A2");
    }

    #[test]
    fn test_missing_scheme_is_rejected_without_writes() {
        let storage = Storage::open_memory().unwrap();
        let ledger = VisitLedger::default();
        let favicons = FaviconCache::default();
        let icon = Icon::solid(16, [1, 1, 1, 255]);
        let bad = Visit {
            url: "example.com/a",
            title: "A",
            favicon_url: "https://example.com/favicon.ico",
            favicon: Some(&icon),
        };

        let err = ledger
            .mark_visit(storage.connection(), &favicons, &bad, NOW)
            .unwrap_err();
        assert!(matches!(err, PageIndexError::InvalidUrl { .. }));
        assert_eq!(page_count(&storage), 0);
        let favicons_stored: i64 = storage
            .connection()
            .query_row("SELECT COUNT(*) FROM favicon", [], |row| row.get(0))
            .unwrap();
        assert_eq!(favicons_stored, 0);
    }

    #[test]
    fn test_visit_links_favicon() {
        let storage = Storage::open_memory().unwrap();
        let ledger = VisitLedger::default();
        let favicons = FaviconCache::default();
        let icon = Icon::solid(16, [200, 10, 10, 255]);
        let with_icon = Visit {
            url: "https://example.com/",
            title: "Example",
            favicon_url: "https://example.com/favicon.ico",
            favicon: Some(&icon),
        };

        ledger
            .mark_visit(storage.connection(), &favicons, &with_icon, NOW)
            .unwrap();
        let page = storage.get_page("https://example.com/").unwrap().unwrap();
        assert!(page.favicon_id.is_some());

        // A later visit without an icon clears the reference.
        ledger
            .mark_visit(
                storage.connection(),
                &favicons,
                &visit("https://example.com/", "Example"),
                NOW + 1,
            )
            .unwrap();
        let page = storage.get_page("https://example.com/").unwrap().unwrap();
        assert_eq!(page.favicon_id, None);
    }

    #[test]
    fn test_favicon_failure_leaves_page_untouched() {
        let storage = Storage::open_memory().unwrap();
        let ledger = VisitLedger::default();
        let favicons = FaviconCache::default();
        let url = "https://example.com/";
        ledger
            .mark_visit(storage.connection(), &favicons, &visit(url, "Before"), NOW)
            .unwrap();

        storage
            .connection()
            .execute_batch("DROP TABLE favicon")
            .unwrap();
        let icon = Icon::solid(16, [5, 5, 5, 255]);
        let err = ledger
            .mark_visit(
                storage.connection(),
                &favicons,
                &Visit {
                    url,
                    title: "After",
                    favicon_url: "https://example.com/favicon.ico",
                    favicon: Some(&icon),
                },
                NOW + 10,
            )
            .unwrap_err();
        assert!(err.is_storage());

        let page = storage.get_page(url).unwrap().unwrap();
        assert_eq!(page.visit_count, 1);
        assert_eq!(page.title, "Before");
        assert_eq!(page.last_visited, NOW);

        let fresh = ledger.mark_visit(
            storage.connection(),
            &favicons,
            &Visit {
                url: "https://new.example.com/",
                title: "New",
                favicon_url: "https://new.example.com/favicon.ico",
                favicon: Some(&icon),
            },
            NOW,
        );
        assert!(fresh.is_err());
        assert!(storage.get_page("https://new.example.com/").unwrap().is_none());
    }

    #[test]
    fn test_storage_failure_surfaces() {
        let storage = Storage::open_memory().unwrap();
        storage
            .connection()
            .execute_batch("DROP TABLE autocomplete_page")
            .unwrap();
        let err = VisitLedger::default()
            .mark_visit(
                storage.connection(),
                &FaviconCache::default(),
                &visit("https://example.com/", "x"),
                NOW,
            )
            .unwrap_err();
        assert!(err.is_storage());
    }
}
