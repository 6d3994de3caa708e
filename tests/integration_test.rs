//! Integration tests for pageindex.
//!
//! These tests drive the public [`PageIndex`] API against an on-disk
//! database and verify:
//! - Visit bookkeeping and frecency ordering
//! - Favicon storage, identity dirty-checking and cache reconstruction
//! - Expiration of stale pages and orphan favicons
//! - Persistence across reopen

use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use pageindex::{Config, Icon, PageIndex, PageIndexError, VisitOutcome};

const DAY: i64 = 24 * 60 * 60;
const NOW: i64 = 1_700_000_000;

fn temp_config(dir: &TempDir) -> (Config, PathBuf) {
    let db_path = dir.path().join("pages.db");
    let mut config = Config::default();
    config.paths.db = Some(db_path.clone());
    (config, db_path)
}

fn favicon_identity(index: &PageIndex, favicon_url: &str) -> Option<i64> {
    index.with_storage_locked(|storage| {
        storage
            .connection()
            .query_row(
                "SELECT image_identity FROM favicon WHERE url = ?1",
                [favicon_url],
                |row| row.get(0),
            )
            .ok()
    })
}

fn page_count(index: &PageIndex, url: &str) -> i64 {
    index.with_storage_locked(|storage| {
        storage
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM autocomplete_page WHERE url = ?1",
                [url],
                |row| row.get(0),
            )
            .unwrap()
    })
}

#[test]
fn test_repeated_visits_keep_one_row() {
    let dir = TempDir::new().unwrap();
    let (config, _) = temp_config(&dir);
    let index = PageIndex::open_with_config(&config).unwrap();
    let url = "https://example.com/docs";

    for n in 0..7 {
        let outcome = index
            .try_mark_visit_at(url, "Docs", "", None, NOW + n)
            .unwrap();
        let expected = if n == 0 {
            VisitOutcome::Inserted
        } else {
            VisitOutcome::Updated
        };
        assert_eq!(outcome, expected);
    }

    assert_eq!(page_count(&index, url), 1);
    let page = index.page(url).unwrap().unwrap();
    assert_eq!(page.visit_count, 7);
    assert_eq!(page.last_visited, NOW + 6);
    assert_eq!(page.schemeless_url, "example.com/docs");
}

#[test]
fn test_invalid_url_never_touches_storage() {
    let dir = TempDir::new().unwrap();
    let (config, _) = temp_config(&dir);
    let index = PageIndex::open_with_config(&config).unwrap();
    let icon = Icon::solid(16, [1, 1, 1, 255]);

    let err = index
        .try_mark_visit_at("example.com/a", "A", "https://example.com/f.ico", Some(&icon), NOW)
        .unwrap_err();
    assert!(matches!(err, PageIndexError::InvalidUrl { .. }));
    assert!(!index.mark_visit("example.com/a", "A", "", None));

    let stats = index.stats().unwrap();
    assert_eq!(stats.pages, 0);
    assert_eq!(stats.favicons, 0);
}

#[test]
fn test_frecency_grows_with_visit_count_at_fixed_time() {
    let index = PageIndex::open_memory().unwrap();
    let url = "https://example.com/";

    index.try_mark_visit_at(url, "", "", None, NOW).unwrap();
    let once = index.page(url).unwrap().unwrap().frecency;
    index.try_mark_visit_at(url, "", "", None, NOW).unwrap();
    let twice = index.page(url).unwrap().unwrap().frecency;

    assert!(twice > once);
    assert_eq!(twice - once, Config::default().ranking.visit_weight_seconds);
}

#[test]
fn test_frequent_page_outranks_recent_single_visit() {
    let index = PageIndex::open_memory().unwrap();
    let frequent = "https://news.example.com/";
    let recent = "https://new.example.com/";

    for n in 0..5 {
        index
            .try_mark_visit_at(frequent, "News", "", None, NOW - DAY + n)
            .unwrap();
    }
    index.try_mark_visit_at(recent, "New", "", None, NOW).unwrap();

    let results = index.suggest("new", 10);
    let urls: Vec<&str> = results.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls, vec![frequent, recent]);
}

#[test]
fn test_suggest_matches_every_fragment_as_prefix() {
    let index = PageIndex::open_memory().unwrap();
    index
        .try_mark_visit_at("https://docs.rs/serde", "serde - Rust", "", None, NOW)
        .unwrap();
    index
        .try_mark_visit_at("https://docs.rs/tokio", "tokio - Rust", "", None, NOW)
        .unwrap();

    let both = index.suggest("doc rust", 10);
    assert_eq!(both.len(), 2);

    let one = index.suggest("doc ser", 10);
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].url, "https://docs.rs/serde");

    assert!(index.suggest("serde tokio", 10).is_empty());
    assert!(index.suggest("", 10).is_empty());
    assert!(index.suggest("   ", 10).is_empty());
}

#[test]
fn test_favicon_identity_dirty_check() {
    let index = PageIndex::open_memory().unwrap();
    let favicon_url = "https://example.com/favicon.ico";
    let icon = Icon::solid(16, [200, 0, 0, 255]);

    index
        .try_mark_visit_at("https://example.com/", "Example", favicon_url, Some(&icon), NOW)
        .unwrap();
    let first = favicon_identity(&index, favicon_url).unwrap();
    assert_eq!(first, icon.identity());

    // Same instance: nothing rewritten.
    index
        .try_mark_visit_at("https://example.com/", "Example", favicon_url, Some(&icon), NOW)
        .unwrap();
    assert_eq!(favicon_identity(&index, favicon_url), Some(first));

    // Pixel-identical but a different instance: rewritten in place.
    let twin = Icon::solid(16, [200, 0, 0, 255]);
    index
        .try_mark_visit_at("https://example.com/", "Example", favicon_url, Some(&twin), NOW)
        .unwrap();
    assert_eq!(favicon_identity(&index, favicon_url), Some(twin.identity()));
    assert_eq!(index.stats().unwrap().favicons, 1);
}

#[test]
fn test_favicon_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let (config, _) = temp_config(&dir);
    let favicon_url = "https://example.com/favicon.ico";

    {
        let index = PageIndex::open_with_config(&config).unwrap();
        let icon = Icon::solid(32, [0, 128, 255, 255]);
        assert!(index.mark_visit("https://example.com/", "Example", favicon_url, Some(&icon)));
    }

    let reopened = PageIndex::open_with_config(&config).unwrap();
    assert!(!reopened.favicons().is_cached(favicon_url));

    let icon = reopened.cached_favicon(favicon_url).unwrap();
    assert_eq!((icon.width(), icon.height()), (16, 16));
    assert_eq!(icon.pixels().get_pixel(4, 4).0, [0, 128, 255, 255]);
    assert!(reopened.favicons().is_cached(favicon_url));

    let results = reopened.suggest("example", 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].favicon_url.as_deref(), Some(favicon_url));
    assert!(results[0].favicon.is_some());
}

#[test]
fn test_expire_removes_stale_pages_and_orphans() {
    let index = PageIndex::open_memory().unwrap();
    let threshold = Config::default().expiration.threshold_seconds;
    let old_icon = Icon::solid(16, [9, 9, 9, 255]);
    let shared_icon = Icon::solid(16, [7, 7, 7, 255]);

    index
        .try_mark_visit_at(
            "https://old.example.com/",
            "Old",
            "https://old.example.com/favicon.ico",
            Some(&old_icon),
            NOW - threshold - DAY,
        )
        .unwrap();
    index
        .try_mark_visit_at(
            "https://fresh.example.com/a",
            "Fresh A",
            "https://fresh.example.com/favicon.ico",
            Some(&shared_icon),
            NOW,
        )
        .unwrap();
    index
        .try_mark_visit_at(
            "https://fresh.example.com/b",
            "Fresh B",
            "https://fresh.example.com/favicon.ico",
            Some(&shared_icon),
            NOW - threshold - DAY,
        )
        .unwrap();

    let stats = index.expire_at(NOW).unwrap();
    assert_eq!(stats.pages_removed, 2);
    assert_eq!(stats.favicons_removed, 1);

    assert!(index.page("https://old.example.com/").unwrap().is_none());
    assert!(index.page("https://fresh.example.com/a").unwrap().is_some());
    let after = index.stats().unwrap();
    assert_eq!(after.pages, 1);
    assert_eq!(after.favicons, 1);
    assert_eq!(after.orphan_favicons, 0);

    assert!(index.suggest("old", 10).is_empty());
}

#[test]
fn test_background_expiration_runs_on_interval() {
    let dir = TempDir::new().unwrap();
    let (mut config, _) = temp_config(&dir);
    config.expiration.interval_seconds = 1;
    config.expiration.threshold_seconds = DAY;
    let index = PageIndex::open_with_config(&config).unwrap();

    let long_ago = chrono::Utc::now().timestamp() - 2 * DAY;
    index
        .try_mark_visit_at("https://stale.example.com/", "Stale", "", None, long_ago)
        .unwrap();
    assert!(index.mark_visit("https://live.example.com/", "Live", "", None));

    let expirer = index.start_expiration().unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while index.stats().unwrap().pages > 1 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    expirer.stop();

    assert!(index.page("https://stale.example.com/").unwrap().is_none());
    assert!(index.page("https://live.example.com/").unwrap().is_some());
}

#[test]
fn test_readers_share_index_across_threads() {
    let index = PageIndex::open_memory().unwrap();
    for n in 0..20 {
        index
            .try_mark_visit_at(&format!("https://site{n}.example.com/"), "Site", "", None, NOW + n)
            .unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reader = index.clone();
            std::thread::spawn(move || reader.suggest("site", 5))
        })
        .collect();

    for handle in handles {
        let results = handle.join().unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].url, "https://site19.example.com/");
    }
}

#[test]
fn test_doctor_checks_pass_on_healthy_database() {
    let dir = TempDir::new().unwrap();
    let (config, _) = temp_config(&dir);
    let index = PageIndex::open_with_config(&config).unwrap();
    index.mark_visit("https://example.com/", "Example", "", None);

    let checks = index.with_storage_locked(pageindex::Storage::health_checks);
    assert!(pageindex::doctor::all_ok(&checks), "{checks:?}");
}
