//! Session reconstruction from persisted logs.
//!
//! Replay walks a per-day log line by line, feeding each decoded record into
//! a [`SessionSummary`]. Lines that fail to decode — including the blank
//! separators written on every append open — are skipped, never fatal, so a
//! partially corrupted log still yields everything that did survive.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{trace, warn};

use crate::filter::NoiseFilter;
use crate::fix::{self, FixRecord};
use crate::summary::SessionSummary;

/// Rebuilds session summaries from log files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionReplay {
    filter: NoiseFilter,
}

impl SessionReplay {
    /// Create a replayer using `filter` for the distance/noise step.
    #[must_use]
    pub fn new(filter: NoiseFilter) -> Self {
        Self { filter }
    }

    /// Reconstruct every session recorded in `path`, in file order.
    ///
    /// The first decodable line starts session #0; each later line marked as
    /// a session start closes the current summary and opens a new one. When
    /// `filter_noise` is set, only records that advanced the anchor (real
    /// movement, not jitter) are retained in each summary's point list;
    /// otherwise every decoded record is retained.
    ///
    /// A readable but empty file yields a single empty session. An
    /// unreadable file yields an empty list and a warning — never an error.
    #[must_use]
    pub fn load(&self, path: &Path, filter_noise: bool) -> Vec<SessionSummary> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %path.display(), %err, "cannot open log file for replay");
                return Vec::new();
            }
        };

        let mut sessions = Vec::new();
        let mut current = SessionSummary::new();
        let mut first = true;
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(path = %path.display(), %err, "read failed mid-file, stopping replay");
                    break;
                }
            };
            let Ok(record) = fix::decode_line(&line) else {
                trace!(line = line.trim(), "skipping undecodable line");
                continue;
            };

            if !first && record.session_start {
                sessions.push(std::mem::take(&mut current));
            }
            let advanced = current.commit(&record, &self.filter);
            if !filter_noise || advanced {
                current.retain(record);
            }
            first = false;
        }
        sessions.push(current);
        sessions
    }

    /// Fold every record in `path` into one running summary.
    ///
    /// Used to prime live state from a partially written today's log at
    /// startup. Per-record history is not retained; `on_record` is invoked
    /// once per committed record for progressive feedback. Returns the
    /// number of records committed. Clears the summary's last-seen
    /// reference afterwards so live sampling does not diff against stale
    /// history.
    pub fn load_into(
        &self,
        path: &Path,
        running: &mut SessionSummary,
        mut on_record: impl FnMut(&FixRecord),
    ) -> usize {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                // Normal on a fresh day: the log does not exist yet.
                warn!(path = %path.display(), %err, "cannot open log file, nothing to prime");
                return 0;
            }
        };

        let mut committed = 0;
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            let Ok(record) = fix::decode_line(&line) else {
                continue;
            };
            running.commit(&record, &self.filter);
            on_record(&record);
            committed += 1;
        }
        running.clear_last_seen();
        committed
    }
}
