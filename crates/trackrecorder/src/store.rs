//! Append-only per-day log files.
//!
//! One file per calendar day, named `{directory}/{prefix}{YYYYMMDD}` with
//! the local date. Records are appended as one JSON line each and flushed
//! immediately: the log is low-rate and safety-relevant, so durability wins
//! over throughput. Writes are throttled to the configured period so a
//! receiver reporting every second does not balloon the file.
//!
//! I/O failures degrade rather than crash. A failed append drops the file
//! handle and is reported through the operational log; the controller's
//! periodic tick re-opens on its next attempt.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fix::{self, FixRecord};

/// Default seconds between log writes.
pub const DEFAULT_WRITE_PERIOD_SECS: u64 = 20;

/// File name for the given prefix and the local date today.
#[must_use]
pub fn today_file_name(prefix: &str) -> String {
    format!("{prefix}{}", Local::now().format("%Y%m%d"))
}

/// Per-day append-only log of fix records.
#[derive(Debug)]
pub struct LogStore {
    directory: PathBuf,
    prefix: String,
    write_period: Duration,
    handle: Option<File>,
    path: Option<PathBuf>,
    last_write: Option<Instant>,
    pending_start: bool,
}

impl LogStore {
    /// Create a store writing under `directory` with the given file prefix.
    ///
    /// Nothing is opened until [`open_for_append`](LogStore::open_for_append).
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>, write_period: Duration) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            write_period,
            handle: None,
            path: None,
            last_write: None,
            pending_start: false,
        }
    }

    /// Path of today's log file.
    #[must_use]
    pub fn today_path(&self) -> PathBuf {
        self.directory.join(today_file_name(&self.prefix))
    }

    /// The configured write throttle period.
    #[must_use]
    pub fn write_period(&self) -> Duration {
        self.write_period
    }

    /// Whether a file handle is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Open (creating if absent) today's file for appending.
    ///
    /// Writes a line-break separator so a torn line from a previous run
    /// cannot corrupt the first new record, and marks the next written
    /// record as a session start. A no-op when already open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] when the log directory cannot be
    /// created and [`Error::LogOpen`] when the file cannot be opened or the
    /// separator cannot be written.
    pub fn open_for_append(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|source| Error::DirectoryCreate {
                path: self.directory.clone(),
                source,
            })?;
        }

        let path = self.today_path();
        debug!(path = %path.display(), "opening log file");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::LogOpen {
                path: path.clone(),
                source,
            })?;
        file.write_all(b"\n").map_err(|source| Error::LogOpen {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "log opened for append");
        self.handle = Some(file);
        self.path = Some(path);
        self.last_write = None;
        self.pending_start = true;
        Ok(())
    }

    /// Release the file handle. Idempotent.
    pub fn close(&mut self) {
        if let Some(path) = self.path.take() {
            debug!(path = %path.display(), "closing log file");
        }
        self.handle = None;
    }

    /// Append one record, at most once per write period.
    ///
    /// Stamps the pending session-start flag onto `fix` before serializing,
    /// so the first record after an open always marks a session boundary.
    /// Returns `false` without error when no handle is open or the previous
    /// write was too recent. An I/O failure is reported and drops the
    /// handle; the caller's next periodic attempt re-opens.
    pub fn write(&mut self, fix: &mut FixRecord) -> bool {
        if self.handle.is_none() {
            return false;
        }
        if let Some(last) = self.last_write {
            if last.elapsed() < self.write_period {
                return false;
            }
        }
        if self.pending_start {
            fix.session_start = true;
        }

        match self.append_line(fix) {
            Ok(()) => {
                self.last_write = Some(Instant::now());
                self.pending_start = false;
                true
            }
            Err(err) => {
                warn!(%err, "log write failed, pausing logging");
                self.close();
                false
            }
        }
    }

    fn append_line(&mut self, fix: &FixRecord) -> Result<()> {
        let line = fix::encode_line(fix)?;
        let Some(file) = self.handle.as_mut() else {
            return Ok(());
        };
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// Per-day log files under `directory` matching `prefix`, sorted by name
/// (which sorts them by date).
///
/// # Errors
///
/// Returns [`Error::Io`] when the directory cannot be read.
pub fn list_log_files(directory: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(prefix) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::decode_line;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("trackrecorder-store-{tag}-{}", std::process::id()))
    }

    fn cleanup(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir);
    }

    fn sample_fix(time_sec: i64) -> FixRecord {
        FixRecord {
            time_sec,
            latitude: Some(51.5),
            longitude: Some(-0.1),
            ..FixRecord::default()
        }
    }

    #[test]
    fn test_open_creates_directory_and_separator() {
        let dir = temp_dir("open");
        cleanup(&dir);
        let mut store = LogStore::new(&dir, "gpslog", Duration::ZERO);
        assert!(!store.is_open());

        store.open_for_append().expect("open");
        assert!(store.is_open());
        let content = std::fs::read_to_string(store.today_path()).expect("read");
        assert_eq!(content, "\n");

        cleanup(&dir);
    }

    #[test]
    fn test_first_record_after_open_marks_session_start() {
        let dir = temp_dir("start");
        cleanup(&dir);
        let mut store = LogStore::new(&dir, "gpslog", Duration::ZERO);
        store.open_for_append().expect("open");

        let mut first = sample_fix(100);
        assert!(store.write(&mut first));
        assert!(first.session_start);

        let mut second = sample_fix(200);
        assert!(store.write(&mut second));
        assert!(!second.session_start);

        let content = std::fs::read_to_string(store.today_path()).expect("read");
        let records: Vec<FixRecord> = content
            .lines()
            .filter_map(|l| decode_line(l).ok())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].session_start);
        assert!(!records[1].session_start);

        cleanup(&dir);
    }

    #[test]
    fn test_write_throttled_within_period() {
        let dir = temp_dir("throttle");
        cleanup(&dir);
        let mut store = LogStore::new(&dir, "gpslog", Duration::from_secs(60));
        store.open_for_append().expect("open");

        // First write after open is immediate; the next is inside the
        // period and gets dropped.
        assert!(store.write(&mut sample_fix(100)));
        assert!(!store.write(&mut sample_fix(101)));

        let content = std::fs::read_to_string(store.today_path()).expect("read");
        assert_eq!(content.lines().filter(|l| !l.is_empty()).count(), 1);

        cleanup(&dir);
    }

    #[test]
    fn test_write_without_handle_is_noop() {
        let dir = temp_dir("nohandle");
        cleanup(&dir);
        let mut store = LogStore::new(&dir, "gpslog", Duration::ZERO);
        assert!(!store.write(&mut sample_fix(100)));
        assert!(!dir.exists());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = temp_dir("close");
        cleanup(&dir);
        let mut store = LogStore::new(&dir, "gpslog", Duration::ZERO);
        store.open_for_append().expect("open");
        store.close();
        store.close();
        assert!(!store.is_open());
        cleanup(&dir);
    }

    #[test]
    fn test_reopen_appends_and_remarks_session_start() {
        let dir = temp_dir("reopen");
        cleanup(&dir);
        let mut store = LogStore::new(&dir, "gpslog", Duration::ZERO);
        store.open_for_append().expect("open");
        assert!(store.write(&mut sample_fix(100)));
        store.close();

        store.open_for_append().expect("reopen");
        let mut fix = sample_fix(200);
        assert!(store.write(&mut fix));
        assert!(fix.session_start);

        let content = std::fs::read_to_string(store.today_path()).expect("read");
        let starts = content
            .lines()
            .filter_map(|l| decode_line(l).ok())
            .filter(|r| r.session_start)
            .count();
        assert_eq!(starts, 2);

        cleanup(&dir);
    }

    #[test]
    fn test_open_failure_is_reported_not_fatal() {
        let dir = temp_dir("openfail");
        cleanup(&dir);
        // A regular file where the directory should be makes creation fail.
        std::fs::create_dir_all(dir.parent().unwrap()).ok();
        std::fs::write(&dir, b"not a directory").expect("write blocker");

        let mut store = LogStore::new(&dir, "gpslog", Duration::ZERO);
        let err = store.open_for_append().expect_err("open should fail");
        assert!(matches!(
            err,
            Error::DirectoryCreate { .. } | Error::LogOpen { .. }
        ));
        assert!(!store.is_open());

        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn test_list_log_files_filters_and_sorts() {
        let dir = temp_dir("list");
        cleanup(&dir);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("gpslog20170611"), b"\n").expect("write");
        std::fs::write(dir.join("gpslog20170610"), b"\n").expect("write");
        std::fs::write(dir.join("other20170610"), b"\n").expect("write");

        let files = list_log_files(&dir, "gpslog").expect("list");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["gpslog20170610", "gpslog20170611"]);

        cleanup(&dir);
    }

    #[test]
    fn test_list_log_files_missing_directory_errors() {
        let dir = temp_dir("listmissing");
        cleanup(&dir);
        assert!(list_log_files(&dir, "gpslog").is_err());
    }

    #[test]
    fn test_today_file_name_shape() {
        let name = today_file_name("gpslog");
        assert!(name.starts_with("gpslog"));
        assert_eq!(name.len(), "gpslog".len() + 8);
        assert!(name["gpslog".len()..].chars().all(|c| c.is_ascii_digit()));
    }
}
