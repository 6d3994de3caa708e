//! Expiration of stale pages and orphaned favicons.
//!
//! A pass deletes pages not visited within the threshold, then sweeps every
//! favicon no surviving page references. The sweep must follow the page
//! delete so favicons orphaned by it go in the same pass. Both statements
//! run in one transaction, so a visit recorded on the same connection cannot
//! land between them.
//!
//! [`Expirer`] runs passes on a background thread at a fixed interval.
//! Failed passes are logged and retried on the next tick.

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PageIndexError, Result};
use crate::model::ExpireStats;
use crate::storage::Storage;

/// Default period between expiration passes.
pub const DEFAULT_EXPIRE_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Default age after which an unvisited page is dropped: 90 days.
pub const DEFAULT_EXPIRE_THRESHOLD_SECONDS: i64 = 90 * 24 * 60 * 60;

/// Run one expiration pass as of `now`.
///
/// The page delete and the orphan sweep commit together. A failed sweep
/// rolls back the page delete too, so after a failed pass both the stale
/// pages and the orphans are still present for the next pass.
///
/// # Errors
///
/// Returns [`PageIndexError::InvalidArgument`] for a negative threshold, or
/// a storage error if either delete fails.
pub fn expire_once(conn: &mut Connection, now: i64, threshold_seconds: i64) -> Result<ExpireStats> {
    if threshold_seconds < 0 {
        return Err(PageIndexError::invalid_argument(format!(
            "expiration threshold must not be negative (got {threshold_seconds}s)"
        )));
    }
    let cutoff = now.saturating_sub(threshold_seconds);
    let tx = conn.transaction()?;

    let pages_removed = tx.execute(
        "DELETE FROM autocomplete_page WHERE last_visited < ?",
        params![cutoff],
    )?;
    let favicons_removed = tx.execute(
        r"
        DELETE FROM favicon
        WHERE NOT EXISTS (
            SELECT 1 FROM autocomplete_page ap WHERE ap.favicon_id = favicon.id
        )
        ",
        [],
    )?;

    tx.commit()?;
    Ok(ExpireStats {
        pages_removed,
        favicons_removed,
    })
}

/// Settings for the background expiration task.
#[derive(Debug, Clone, Copy)]
pub struct ExpirerSettings {
    pub interval: Duration,
    pub threshold_seconds: i64,
}

impl Default for ExpirerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_EXPIRE_INTERVAL,
            threshold_seconds: DEFAULT_EXPIRE_THRESHOLD_SECONDS,
        }
    }
}

/// Handle to the background expiration thread.
///
/// Dropping the handle stops future passes and waits for the thread; a pass
/// already running is allowed to finish.
pub struct Expirer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Expirer {
    /// Spawn the expiration thread against a shared store.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(storage: Arc<Mutex<Storage>>, settings: ExpirerSettings) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("pageindex-expirer".to_string())
            .spawn(move || run(&storage, settings, &stop_rx))?;

        info!(
            interval_secs = settings.interval.as_secs(),
            threshold_secs = settings.threshold_seconds,
            "Started expirer"
        );
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop scheduling passes and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Whether the background thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes the select loop.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Expirer thread panicked");
            }
            info!("Stopped expirer");
        }
    }
}

impl Drop for Expirer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(storage: &Mutex<Storage>, settings: ExpirerSettings, stop: &Receiver<()>) {
    let ticker = tick(settings.interval);
    loop {
        select! {
            recv(ticker) -> _ => run_pass(storage, settings.threshold_seconds),
            recv(stop) -> _ => break,
        }
    }
}

fn run_pass(storage: &Mutex<Storage>, threshold_seconds: i64) {
    let now = chrono::Utc::now().timestamp();
    let mut storage = storage.lock();
    match expire_once(storage.connection_mut(), now, threshold_seconds) {
        Ok(stats) => debug!(
            pages = stats.pages_removed,
            favicons = stats.favicons_removed,
            "Expiration pass complete"
        ),
        Err(e) => warn!(error = %e, "Expiration pass failed"),
    }
}
