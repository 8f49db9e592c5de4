use chrono::{Duration, Local, NaiveDateTime};

use crate::db::models::RawTrackRecord;
use crate::db::{LibraryHandle, TrackSource};
use crate::diagnostics::Diagnostics;
use crate::formatter::{TrackFormatter, TrackInfo, updated_at};

/// How many history entries to return, and how far back to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub limit: usize,
    pub days: u32,
}

impl HistoryWindow {
    pub fn new(limit: usize, days: u32) -> Self {
        Self { limit, days }
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self { limit: 10, days: 7 }
    }
}

/// Answers "what is playing" and "what played recently" from a track library.
///
/// The library has no deck state, so the current track is approximated as the
/// most recently updated record. Every operation is best effort: failures are
/// logged and surface as `false`, `None` or an empty list, never as an error.
///
/// The connection is opened lazily and kept until [`close`](Self::close).
/// A failed query does not drop it; a reconnect is only attempted when no
/// handle is held.
pub struct TrackResolver<S: TrackSource> {
    source: S,
    key: Option<String>,
    handle: Option<S::Handle>,
    formatter: TrackFormatter,
    diag: Diagnostics,
}

impl<S: TrackSource> TrackResolver<S> {
    pub fn new(source: S, key: Option<String>, diag: Diagnostics) -> Self {
        let formatter = TrackFormatter::new(diag.scoped(format!("{}::formatter", crate::APP_NAME)));
        Self {
            source,
            key,
            handle: None,
            formatter,
            diag,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Open the library. Any previously held handle is closed first.
    pub fn connect(&mut self) -> bool {
        self.close();
        match self.source.open(self.key.as_deref()) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.diag.info(format_args!("Successfully connected to track library"));
                true
            }
            Err(e) => {
                self.diag.error(format_args!("Failed to connect to track library: {e}"));
                false
            }
        }
    }

    /// The most recently updated track, or `None` when the library is empty
    /// or unreachable.
    ///
    /// Ties on the timestamp go to the record fetched first. Records without a
    /// timestamp never win; if no record has one, the first record is used.
    pub fn get_current_track(&mut self) -> Option<TrackInfo> {
        let handle = self.ensure_connected()?;
        let content = match handle.get_content() {
            Ok(content) => content,
            Err(e) => {
                self.diag.error(format_args!("Error getting current track: {e}"));
                return None;
            }
        };

        let Some(current) = select_current(&content) else {
            self.diag.debug(format_args!("Library has no tracks"));
            return None;
        };
        Some(self.formatter.format(current))
    }

    /// Recently updated tracks, newest first.
    pub fn get_history(&mut self, window: HistoryWindow) -> Vec<TrackInfo> {
        self.get_history_at(window, Local::now().naive_local())
    }

    /// [`get_history`](Self::get_history) against an explicit clock.
    ///
    /// Keeps records whose timestamp is strictly after `now - days`, sorted
    /// descending (stable, so equal timestamps keep fetch order), truncated
    /// to `limit`.
    pub fn get_history_at(&mut self, window: HistoryWindow, now: NaiveDateTime) -> Vec<TrackInfo> {
        let Some(handle) = self.ensure_connected() else {
            return Vec::new();
        };
        let content = match handle.get_content() {
            Ok(content) => content,
            Err(e) => {
                self.diag.error(format_args!("Error getting history: {e}"));
                return Vec::new();
            }
        };

        let cutoff = Duration::try_days(i64::from(window.days))
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(NaiveDateTime::MIN);

        let mut recent: Vec<(NaiveDateTime, &<S::Handle as LibraryHandle>::Record)> = content
            .iter()
            .filter_map(|record| updated_at(record).map(|ts| (ts, record)))
            .filter(|(ts, _)| *ts > cutoff)
            .collect();
        recent.sort_by(|a, b| b.0.cmp(&a.0));
        recent.truncate(window.limit);

        self.diag.debug(format_args!(
            "{} of {} tracks updated since {cutoff}",
            recent.len(),
            content.len()
        ));

        recent
            .into_iter()
            .map(|(_, record)| self.formatter.format(record))
            .collect()
    }

    /// Close the connection if one is open. Close errors are logged only.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.close() {
                Ok(()) => self.diag.info(format_args!("Database connection closed")),
                Err(e) => self
                    .diag
                    .error(format_args!("Error closing database connection: {e}")),
            }
        }
    }

    fn ensure_connected(&mut self) -> Option<&S::Handle> {
        if self.handle.is_none() && !self.connect() {
            return None;
        }
        self.handle.as_ref()
    }
}

/// Record with the greatest timestamp, first one wins on ties.
fn select_current<R: RawTrackRecord>(content: &[R]) -> Option<&R> {
    let mut best: Option<(NaiveDateTime, &R)> = None;
    for record in content {
        let Some(ts) = updated_at(record) else {
            continue;
        };
        match best {
            Some((best_ts, _)) if ts <= best_ts => {}
            _ => best = Some((ts, record)),
        }
    }
    best.map(|(_, record)| record).or_else(|| content.first())
}
