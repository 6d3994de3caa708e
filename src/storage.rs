//! `SQLite` storage for the page index.
//!
//! Owns the connection, the schema and its migrations, and whole-database
//! maintenance (stats, health checks, FTS rebuild). The per-operation
//! statements live with the component that issues them: [`crate::ledger`],
//! [`crate::favicon`], [`crate::suggest`] and [`crate::expire`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::info;

use crate::doctor::{CheckCategory, CheckStatus, HealthCheck};
use crate::error::{PageIndexError, Result, ResultExt};
use crate::logging::OperationGuard;
use crate::model::{FaviconEntry, IndexStats, VisitedPage};

pub(crate) const SCHEMA_VERSION: i32 = 1;

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutably borrow the connection (transactions need `&mut`).
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version > SCHEMA_VERSION {
            return Err(PageIndexError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Missing meta table means a fresh database.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS favicon (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                url_hash INTEGER NOT NULL,
                image_identity INTEGER NOT NULL,
                data BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_favicon_url_hash ON favicon(url_hash);

            -- No UNIQUE(url): visits are upserted update-first by a single writer.
            CREATE TABLE IF NOT EXISTS autocomplete_page (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                url_hash INTEGER NOT NULL,
                schemeless_url TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                favicon_id INTEGER REFERENCES favicon(id),
                last_visited INTEGER NOT NULL,
                visit_count INTEGER NOT NULL,
                frecency INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_autocomplete_page_url_hash
                ON autocomplete_page(url_hash);
            CREATE INDEX IF NOT EXISTS idx_autocomplete_page_last_visited
                ON autocomplete_page(last_visited);
            CREATE INDEX IF NOT EXISTS idx_autocomplete_page_favicon_id
                ON autocomplete_page(favicon_id);

            -- External-content FTS over the display form of each page.
            CREATE VIRTUAL TABLE IF NOT EXISTS autocomplete_page_fts USING fts5(
                schemeless_url,
                title,
                content = 'autocomplete_page',
                content_rowid = 'id'
            );

            CREATE TRIGGER IF NOT EXISTS autocomplete_page_ai
            AFTER INSERT ON autocomplete_page BEGIN
                INSERT INTO autocomplete_page_fts (rowid, schemeless_url, title)
                VALUES (new.id, new.schemeless_url, new.title);
            END;

            CREATE TRIGGER IF NOT EXISTS autocomplete_page_ad
            AFTER DELETE ON autocomplete_page BEGIN
                INSERT INTO autocomplete_page_fts (autocomplete_page_fts, rowid, schemeless_url, title)
                VALUES ('delete', old.id, old.schemeless_url, old.title);
            END;

            CREATE TRIGGER IF NOT EXISTS autocomplete_page_au
            AFTER UPDATE ON autocomplete_page BEGIN
                INSERT INTO autocomplete_page_fts (autocomplete_page_fts, rowid, schemeless_url, title)
                VALUES ('delete', old.id, old.schemeless_url, old.title);
                INSERT INTO autocomplete_page_fts (rowid, schemeless_url, title)
                VALUES (new.id, new.schemeless_url, new.title);
            END;
            ",
        )?;

        Ok(())
    }

    /// Fetch the page row for an exact URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_page(&self, url: &str) -> Result<Option<VisitedPage>> {
        let hash = crate::hash::url_hash(url);
        let page = self
            .conn
            .query_row(
                r"
                SELECT id, url, url_hash, schemeless_url, title, favicon_id,
                       last_visited, visit_count, frecency
                FROM autocomplete_page
                WHERE url_hash = ? AND url = ?
                ",
                params![hash, url],
                |row| {
                    Ok(VisitedPage {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        url_hash: row.get(2)?,
                        schemeless_url: row.get(3)?,
                        title: row.get(4)?,
                        favicon_id: row.get(5)?,
                        last_visited: row.get(6)?,
                        visit_count: row.get(7)?,
                        frecency: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(page)
    }

    /// Fetch the stored favicon row for an exact favicon URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_favicon(&self, favicon_url: &str) -> Result<Option<FaviconEntry>> {
        let hash = crate::hash::url_hash(favicon_url);
        let entry = self
            .conn
            .query_row(
                "SELECT id, url, url_hash, image_identity, data FROM favicon WHERE url_hash = ? AND url = ?",
                params![hash, favicon_url],
                |row| {
                    Ok(FaviconEntry {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        url_hash: row.get(2)?,
                        image_identity: row.get(3)?,
                        data: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Delete the page row for an exact URL. Its favicon is left for the
    /// orphan sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_page(&self, url: &str) -> Result<bool> {
        let hash = crate::hash::url_hash(url);
        let deleted = self.conn.execute(
            "DELETE FROM autocomplete_page WHERE url_hash = ? AND url = ?",
            params![hash, url],
        )?;
        Ok(deleted > 0)
    }

    /// Collect aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn get_stats(&self) -> Result<IndexStats> {
        let (pages, total_visits, oldest, newest): (i64, i64, Option<i64>, Option<i64>) =
            self.conn.query_row(
                r"
                SELECT COUNT(*), COALESCE(SUM(visit_count), 0),
                       MIN(last_visited), MAX(last_visited)
                FROM autocomplete_page
                ",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let favicons = self.table_row_count("favicon")?;
        let orphan_favicons = self.orphan_favicon_count()?;

        Ok(IndexStats {
            pages,
            favicons,
            orphan_favicons,
            total_visits,
            oldest_visit: oldest.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)),
            newest_visit: newest.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)),
            db_size_bytes: self.database_size_bytes(),
        })
    }

    /// Favicons no page references any more.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn orphan_favicon_count(&self) -> Result<i64> {
        let count = self.conn.query_row(
            r"
            SELECT COUNT(*) FROM favicon f
            WHERE NOT EXISTS (
                SELECT 1 FROM autocomplete_page ap WHERE ap.favicon_id = f.id
            )
            ",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Run database health checks for `pageindex doctor`.
    #[must_use]
    pub fn health_checks(&self) -> Vec<HealthCheck> {
        vec![
            self.check_integrity(),
            self.check_schema_version(),
            self.check_fts_integrity(),
            self.check_duplicate_pages(),
            self.check_orphan_favicons(),
        ]
    }

    /// Apply safe, idempotent database optimizations.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub fn optimize(&self) -> Result<()> {
        let guard = OperationGuard::new("optimize");
        match self.conn.execute_batch(
            "
            INSERT INTO autocomplete_page_fts (autocomplete_page_fts) VALUES ('optimize');
            PRAGMA optimize;
            ",
        ) {
            Ok(()) => {
                guard.complete();
                Ok(())
            }
            Err(e) => {
                guard.fail(&e);
                Err(e.into())
            }
        }
    }

    /// Rebuild the FTS index from the page table.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails.
    pub fn rebuild_fts(&self) -> Result<()> {
        let guard = OperationGuard::new("rebuild_fts");
        let result = self
            .conn
            .execute(
                "INSERT INTO autocomplete_page_fts (autocomplete_page_fts) VALUES ('rebuild')",
                [],
            )
            .context("Failed to rebuild full-text index");
        match result {
            Ok(_) => {
                guard.complete();
                Ok(())
            }
            Err(e) => {
                guard.fail(&e);
                Err(e)
            }
        }
    }

    fn check_integrity(&self) -> HealthCheck {
        let name = "PRAGMA integrity_check";
        match self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
        {
            Ok(result) if result == "ok" => HealthCheck::pass(CheckCategory::Database, name, "ok"),
            Ok(result) => HealthCheck::failing(
                CheckCategory::Database,
                CheckStatus::Error,
                name,
                format!("Integrity check failed: {result}"),
                "Database corruption detected. Restore from backup or start a fresh index.",
            ),
            Err(err) => HealthCheck::failing(
                CheckCategory::Database,
                CheckStatus::Error,
                name,
                format!("Integrity check failed: {err}"),
                "Database corruption detected. Restore from backup or start a fresh index.",
            ),
        }
    }

    fn check_schema_version(&self) -> HealthCheck {
        let current = self.get_schema_version();
        if current == SCHEMA_VERSION {
            HealthCheck::pass(
                CheckCategory::Database,
                "Schema version",
                format!("schema_version={current}"),
            )
        } else {
            HealthCheck::failing(
                CheckCategory::Database,
                CheckStatus::Error,
                "Schema version",
                format!("schema_version={current}, expected={SCHEMA_VERSION}"),
                "Move the database aside so a fresh one is created.",
            )
        }
    }

    fn check_fts_integrity(&self) -> HealthCheck {
        let result = self.conn.execute(
            "INSERT INTO autocomplete_page_fts (autocomplete_page_fts, rank) VALUES ('integrity-check', 1)",
            [],
        );
        match result {
            Ok(_) => HealthCheck::pass(CheckCategory::Index, "FTS5 integrity", "ok"),
            Err(err) => HealthCheck::failing(
                CheckCategory::Index,
                CheckStatus::Error,
                "FTS5 integrity",
                format!("Integrity check failed: {err}"),
                "Run 'pageindex doctor --rebuild' to rebuild the suggestion index.",
            ),
        }
    }

    fn check_duplicate_pages(&self) -> HealthCheck {
        self.check_count(
            CheckCategory::Index,
            "Duplicate page rows",
            r"
            SELECT COUNT(*) FROM (
                SELECT url FROM autocomplete_page GROUP BY url_hash, url HAVING COUNT(*) > 1
            )
            ",
            "Concurrent writers raced on the same URL. Serialize visit recording.",
        )
    }

    fn check_orphan_favicons(&self) -> HealthCheck {
        match self.orphan_favicon_count() {
            Ok(0) => HealthCheck::pass(CheckCategory::Favicons, "Orphan favicons", "0 rows"),
            Ok(count) => HealthCheck::failing(
                CheckCategory::Favicons,
                CheckStatus::Warning,
                "Orphan favicons",
                format!("{count} rows"),
                "Run 'pageindex expire' to sweep unreferenced favicons.",
            ),
            Err(err) => HealthCheck::failing(
                CheckCategory::Favicons,
                CheckStatus::Error,
                "Orphan favicons",
                format!("Query failed: {err}"),
                "Run 'pageindex expire' to sweep unreferenced favicons.",
            ),
        }
    }

    fn check_count(
        &self,
        category: CheckCategory,
        name: &str,
        sql: &str,
        suggestion: &str,
    ) -> HealthCheck {
        match self.conn.query_row(sql, [], |row| row.get::<_, i64>(0)) {
            Ok(0) => HealthCheck::pass(category, name, "0 rows"),
            Ok(count) => HealthCheck::failing(
                category,
                CheckStatus::Warning,
                name,
                format!("{count} rows"),
                suggestion,
            ),
            Err(err) => HealthCheck::failing(
                category,
                CheckStatus::Error,
                name,
                format!("Query failed: {err}"),
                suggestion,
            ),
        }
    }

    fn table_row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn database_size_bytes(&self) -> Option<i64> {
        self.conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .ok()
    }
}

pub(crate) fn limit_to_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
