//! Suggestion engine: typed text to ranked candidate pages.
//!
//! Input is split on whitespace and every fragment becomes an FTS5 quoted
//! prefix term (`"frag"*`). Terms are space-joined, which FTS5 reads as an
//! implicit AND, and matches are ordered by frecency, highest first.

use rusqlite::{Connection, params};
use tracing::warn;

use crate::error::Result;
use crate::favicon::FaviconCache;
use crate::model::Suggestion;
use crate::storage::limit_to_i64;

/// Default number of suggestions returned.
pub const DEFAULT_SUGGEST_LIMIT: usize = 10;

/// Build the FTS5 match expression for user input.
///
/// Returns `None` if the input has no non-blank fragments, in which case no
/// query should be issued at all.
#[must_use]
pub fn match_expression(text: &str) -> Option<String> {
    let escaped = text.trim().replace('"', "\"\"");
    let terms: Vec<String> = escaped
        .split_whitespace()
        .map(|fragment| format!("\"{fragment}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Run a suggestion query, surfacing storage errors.
///
/// # Errors
///
/// Returns an error if preparing or executing the query fails.
pub fn try_suggest(
    conn: &Connection,
    favicons: &FaviconCache,
    text: &str,
    limit: usize,
) -> Result<Vec<Suggestion>> {
    let Some(expression) = match_expression(text) else {
        return Ok(Vec::new());
    };
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare_cached(
        r"
        SELECT ap.url, ap.title, f.url AS favicon_url
        FROM autocomplete_page_fts apf
        JOIN autocomplete_page ap ON ap.id = apf.rowid
        LEFT JOIN favicon f ON f.id = ap.favicon_id
        WHERE autocomplete_page_fts MATCH ?
        ORDER BY ap.frecency DESC, ap.id DESC
        LIMIT ?
        ",
    )?;

    let rows = stmt
        .query_map(params![expression, limit_to_i64(limit)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .map(|(url, title, favicon_url)| {
            let favicon = favicon_url
                .as_deref()
                .and_then(|icon_url| favicons.lookup(conn, icon_url));
            Suggestion {
                url,
                title,
                favicon_url,
                favicon,
            }
        })
        .collect())
}

/// Best-effort suggestions: failures are logged and yield no results.
#[must_use]
pub fn suggest(
    conn: &Connection,
    favicons: &FaviconCache,
    text: &str,
    limit: usize,
) -> Vec<Suggestion> {
    match try_suggest(conn, favicons, text, limit) {
        Ok(results) => results,
        Err(e) => {
            warn!(query = %text, error = %e, "Suggestion query failed");
            Vec::new()
        }
    }
}
