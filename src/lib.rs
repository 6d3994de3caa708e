//! pageindex - frecency-ranked history for address-bar autocomplete
//!
//! Keeps one row per visited URL with a recency/frequency score, a favicon
//! store deduplicated by icon identity, an FTS5-backed prefix suggestion
//! query, and a periodic expiration pass that bounds index growth.
//!
//! # Modules
//!
//! - [`page_index`] - The [`PageIndex`] facade used by the host UI
//! - [`ledger`] - Visit recording and frecency
//! - [`favicon`] - Favicon rows plus the in-memory icon cache
//! - [`suggest`] - Typed text to ranked suggestions
//! - [`expire`] - Stale page expiration and orphan favicon sweep
//! - [`storage`] - `SQLite` schema, migrations and maintenance
//! - [`cli`] - Command-line interface definitions

pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod expire;
pub mod favicon;
pub mod hash;
pub mod icon;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod page_index;
pub mod repl;
pub mod storage;
pub mod suggest;

pub use cli::*;
pub use config::Config;
pub use error::{
    PageIndexError, Result, VALID_CONFIG_KEYS, find_closest_match,
    format_did_you_mean, format_error, format_unknown_value_error,
};
pub use expire::{Expirer, ExpirerSettings};
pub use favicon::FaviconCache;
pub use icon::Icon;
pub use model::*;
pub use page_index::PageIndex;
pub use storage::Storage;

use chrono::{DateTime, Datelike, Utc};

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "pages.db";

/// Get the default data directory for pageindex
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("pageindex")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Format a datetime as a human-friendly relative string.
#[must_use]
pub fn format_relative_date(dt: DateTime<Utc>) -> String {
    format_relative_date_with_base(dt, Utc::now())
}

/// Format a datetime relative to a fixed base time (useful for tests).
#[must_use]
pub fn format_relative_date_with_base(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(dt);

    if duration.num_seconds() < 0 {
        return dt.format("%b %d, %Y").to_string();
    }

    let minutes = duration.num_minutes();
    let hours = duration.num_hours();
    let days = duration.num_days();

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if dt.year() == now.year() {
        dt.format("%b %d").to_string()
    } else {
        dt.format("%b %d, %Y").to_string()
    }
}

/// Format an optional datetime with human-friendly output.
#[must_use]
pub fn format_optional_date(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "never".to_string(), format_relative_date)
}

/// Format bytes into a human-friendly string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{}.{} KB", bytes / KB, (bytes % KB) * 10 / KB)
    } else {
        format!("{}.{} MB", bytes / MB, (bytes % MB) * 10 / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::{format_bytes, format_number, format_optional_date, format_relative_date_with_base};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(-12_345), "-12,345");
    }

    #[test]
    fn format_relative_date_thresholds() {
        let base = Utc
            .with_ymd_and_hms(2025, 1, 10, 12, 0, 0)
            .single()
            .unwrap();

        assert_eq!(
            format_relative_date_with_base(base - Duration::seconds(30), base),
            "just now"
        );
        assert_eq!(
            format_relative_date_with_base(base - Duration::hours(3), base),
            "3h ago"
        );
        assert_eq!(
            format_relative_date_with_base(base - Duration::days(2), base),
            "2d ago"
        );
        let last_year = Utc.with_ymd_and_hms(2024, 12, 11, 0, 0, 0).single().unwrap();
        assert_eq!(format_relative_date_with_base(last_year, base), "Dec 11, 2024");
    }

    #[test]
    fn format_optional_date_none() {
        assert_eq!(format_optional_date(None), "never");
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
