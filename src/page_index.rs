//! The page index: the surface the browser UI talks to.
//!
//! [`PageIndex`] owns one shared connection, the favicon cache and the
//! ranking settings. Visit recording goes through [`PageIndex::mark_visit`]
//! and must come from a single writer (see [`crate::ledger`]). Suggestions
//! and favicon lookups are read-only and never fail loudly: storage errors
//! are logged and produce empty results.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PageIndexError, Result};
use crate::expire::{Expirer, ExpirerSettings, expire_once};
use crate::favicon::FaviconCache;
use crate::icon::Icon;
use crate::ledger::{Visit, VisitLedger};
use crate::model::{
    ExpireStats, FaviconEntry, IndexStats, Suggestion, VisitOutcome, VisitedPage,
};
use crate::storage::Storage;
use crate::suggest;

/// Frecency-ranked history of visited pages with their favicons.
#[derive(Clone)]
pub struct PageIndex {
    storage: Arc<Mutex<Storage>>,
    favicons: FaviconCache,
    ledger: VisitLedger,
    expirer: ExpirerSettings,
}

impl PageIndex {
    /// Open the database at `db_path` with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_storage(Storage::open(db_path)?, &Config::default()))
    }

    /// Open the database named by `config`, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the directory cannot be
    /// created, or the database cannot be opened.
    pub fn open_with_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PageIndexError::path_error("create directory", parent, e))?;
        }
        Ok(Self::with_storage(Storage::open(&db_path)?, config))
    }

    /// In-memory index with default settings (for tests and demos).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::with_storage(Storage::open_memory()?, &Config::default()))
    }

    /// Wrap an already opened store.
    #[must_use]
    pub fn with_storage(storage: Storage, config: &Config) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            favicons: FaviconCache::new(config.favicon.cache_capacity, config.favicon.size),
            ledger: VisitLedger::new(config.ranking.visit_weight_seconds),
            expirer: config.expirer_settings(),
        }
    }

    /// Record a visit now. `false` means nothing was persisted, either
    /// because the URL has no scheme or because storage failed.
    pub fn mark_visit(
        &self,
        url: &str,
        title: &str,
        favicon_url: &str,
        favicon: Option<&Icon>,
    ) -> bool {
        let now = chrono::Utc::now().timestamp();
        match self.try_mark_visit_at(url, title, favicon_url, favicon, now) {
            Ok(_) => true,
            Err(e) if e.is_recoverable() => {
                debug!(url = %url, error = %e, "Visit rejected");
                false
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to record visit");
                false
            }
        }
    }

    /// Record a visit observed at `now`, reporting what happened.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` for a URL without `://`, or a storage error.
    pub fn try_mark_visit_at(
        &self,
        url: &str,
        title: &str,
        favicon_url: &str,
        favicon: Option<&Icon>,
        now: i64,
    ) -> Result<VisitOutcome> {
        let visit = Visit {
            url,
            title,
            favicon_url,
            favicon,
        };
        let storage = self.storage.lock();
        self.ledger
            .mark_visit(storage.connection(), &self.favicons, &visit, now)
    }

    /// Ranked pages whose indexed words start with every fragment of `text`.
    #[must_use]
    pub fn suggest(&self, text: &str, limit: usize) -> Vec<Suggestion> {
        // Blank input is answered without taking the connection.
        if suggest::match_expression(text).is_none() {
            return Vec::new();
        }
        let storage = self.storage.lock();
        suggest::suggest(storage.connection(), &self.favicons, text, limit)
    }

    /// Cached favicon for a favicon URL, without recording a visit.
    #[must_use]
    pub fn cached_favicon(&self, favicon_url: &str) -> Option<Icon> {
        if favicon_url.is_empty() {
            return None;
        }
        let storage = self.storage.lock();
        self.favicons.lookup(storage.connection(), favicon_url)
    }

    /// Start periodic expiration on a background thread. Expiration stops
    /// when the returned handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start_expiration(&self) -> Result<Expirer> {
        Expirer::spawn(Arc::clone(&self.storage), self.expirer)
    }

    /// Run one expiration pass immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if either delete fails.
    pub fn expire_now(&self) -> Result<ExpireStats> {
        self.expire_at(chrono::Utc::now().timestamp())
    }

    /// Run one expiration pass as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if either delete fails.
    pub fn expire_at(&self, now: i64) -> Result<ExpireStats> {
        let mut storage = self.storage.lock();
        expire_once(storage.connection_mut(), now, self.expirer.threshold_seconds)
    }

    /// Fetch the stored row for a page.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn page(&self, url: &str) -> Result<Option<VisitedPage>> {
        self.storage.lock().get_page(url)
    }

    /// Fetch the stored favicon row, bypassing the in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn favicon_entry(&self, favicon_url: &str) -> Result<Option<FaviconEntry>> {
        self.storage.lock().get_favicon(favicon_url)
    }

    /// Remove a page from history. Its favicon goes on the next sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn forget(&self, url: &str) -> Result<bool> {
        self.storage.lock().delete_page(url)
    }

    /// Aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns an error if a count query fails.
    pub fn stats(&self) -> Result<IndexStats> {
        self.storage.lock().get_stats()
    }

    /// Run `f` with exclusive access to the store.
    pub fn with_storage_locked<T>(&self, f: impl FnOnce(&Storage) -> T) -> T {
        f(&*self.storage.lock())
    }

    /// The favicon cache in front of the store.
    #[must_use]
    pub const fn favicons(&self) -> &FaviconCache {
        &self.favicons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_visit_then_suggest_scenario() {
        let index = PageIndex::open_memory().unwrap();
        let url = "https://example.com/a";

        assert_eq!(
            index.try_mark_visit_at(url, "A", "", None, NOW).unwrap(),
            VisitOutcome::Inserted
        );
        let first = index.page(url).unwrap().unwrap();
        assert_eq!(first.visit_count, 1);

        assert_eq!(
            index.try_mark_visit_at(url, "A2", "", None, NOW).unwrap(),
            VisitOutcome::Updated
        );
        let second = index.page(url).unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.visit_count, 2);
        assert_eq!(second.title, "A2");
        assert!(second.frecency > first.frecency);

        let results = index.suggest("a", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, url);
        assert_eq!(results[0].title, "A2");
    }

    #[test]
    fn test_schemeless_visit_fails() {
        let index = PageIndex::open_memory().unwrap();
        assert!(!index.mark_visit("example.com/a", "A", "", None));
        assert!(matches!(
            index.try_mark_visit_at("example.com/a", "A", "", None, NOW),
            Err(PageIndexError::InvalidUrl { .. })
        ));
        assert_eq!(index.stats().unwrap().pages, 0);
    }

    #[test]
    fn test_mark_visit_uses_wall_clock() {
        let index = PageIndex::open_memory().unwrap();
        let before = chrono::Utc::now().timestamp();
        assert!(index.mark_visit("https://example.com/", "Example", "", None));
        let page = index.page("https://example.com/").unwrap().unwrap();
        assert!(page.last_visited >= before);
    }

    #[test]
    fn test_blank_suggest_is_empty() {
        let index = PageIndex::open_memory().unwrap();
        index.mark_visit("https://example.com/", "Example", "", None);
        assert!(index.suggest("", 10).is_empty());
        assert!(index.suggest("   ", 10).is_empty());
    }

    #[test]
    fn test_suggest_degrades_on_storage_failure() {
        let index = PageIndex::open_memory().unwrap();
        index.with_storage_locked(|storage| {
            storage
                .connection()
                .execute_batch("DROP TABLE autocomplete_page_fts")
                .unwrap();
        });
        assert!(index.suggest("anything", 10).is_empty());
    }

    #[test]
    fn test_cached_favicon_round_trip() {
        let index = PageIndex::open_memory().unwrap();
        let icon = Icon::solid(16, [50, 60, 70, 255]);
        index.mark_visit(
            "https://example.com/",
            "Example",
            "https://example.com/favicon.ico",
            Some(&icon),
        );

        let found = index.cached_favicon("https://example.com/favicon.ico").unwrap();
        assert_eq!(found.pixels().get_pixel(8, 8).0, [50, 60, 70, 255]);
        let entry = index
            .favicon_entry("https://example.com/favicon.ico")
            .unwrap()
            .unwrap();
        assert_eq!(entry.image_identity, icon.identity());
        assert_eq!(Icon::decode_png(&entry.data).unwrap().width(), 16);
        assert!(index.cached_favicon("").is_none());
        assert!(index.cached_favicon("https://other.test/favicon.ico").is_none());
    }

    #[test]
    fn test_forget_then_expire_sweeps_favicon() {
        let index = PageIndex::open_memory().unwrap();
        let icon = Icon::solid(16, [1, 2, 3, 255]);
        index
            .try_mark_visit_at(
                "https://example.com/",
                "Example",
                "https://example.com/favicon.ico",
                Some(&icon),
                NOW,
            )
            .unwrap();

        assert!(index.forget("https://example.com/").unwrap());
        assert_eq!(index.stats().unwrap().orphan_favicons, 1);

        let stats = index.expire_at(NOW).unwrap();
        assert_eq!(stats.pages_removed, 0);
        assert_eq!(stats.favicons_removed, 1);
        assert_eq!(index.stats().unwrap().favicons, 0);
    }

    #[test]
    fn test_start_expiration_returns_running_handle() {
        let index = PageIndex::open_memory().unwrap();
        let expirer = index.start_expiration().unwrap();
        assert!(expirer.is_running());
        expirer.stop();
    }

    #[test]
    fn test_open_with_config_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db = Some(dir.path().join("nested").join("pages.db"));

        let index = PageIndex::open_with_config(&config).unwrap();
        assert!(index.mark_visit("https://example.com/", "Example", "", None));
        assert!(dir.path().join("nested").join("pages.db").exists());
    }
}
