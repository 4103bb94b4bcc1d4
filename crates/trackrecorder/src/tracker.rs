//! Lifecycle controller for live acquisition.
//!
//! The [`Tracker`] owns everything the two threads of control share: the
//! current fix, satellite counts, the log store, the running summary, and
//! the consumer reference count — all behind one coarse mutex. The sampler
//! thread mutates the current fix field by field under that lock; the
//! periodic [`tick`](Tracker::tick) reads it and drives the write/commit
//! path under the same lock, so a persisted record can never observe a fix
//! torn between two device reads. The file write itself stays inside the
//! lock on purpose: the handle cannot be closed mid-write.
//!
//! Consumers that want the stream active call [`acquire`](Tracker::acquire)
//! and [`release`](Tracker::release); the stream is subscribed on the 0→1
//! transition and unsubscribed on the last release, and the acquisition
//! thread is started once, ever. This keeps display and logging consumers
//! from racing duplicate subscribe commands at the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::filter::NoiseFilter;
use crate::fix::FixRecord;
use crate::replay::SessionReplay;
use crate::sampler::{FixSource, Sampler, SamplerStatus, SkyUpdate, SourceEvent};
use crate::store::LogStore;
use crate::summary::SessionSummary;

/// Everything shared between the sampler thread and the control tick.
#[derive(Debug)]
struct Shared {
    fix: FixRecord,
    time_error: f64,
    satellites_seen: u32,
    satellites_used: u32,
    store: LogStore,
    summary: SessionSummary,
    refs: u32,
    logging_requested: bool,
    last_open_attempt: Option<Instant>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A sampler panic must not take the control side down with it.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Satellite visibility snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SatelliteCounts {
    /// Satellites visible to the receiver.
    pub seen: u32,

    /// Satellites participating in the fix.
    pub used: u32,
}

/// Reference-counted owner of the acquisition stream, log, and summary.
#[derive(Debug)]
pub struct Tracker<S: FixSource + 'static> {
    source: Arc<S>,
    shared: Arc<Mutex<Shared>>,
    filter: NoiseFilter,
    watch_desired: Arc<AtomicBool>,
    sampler: Option<Sampler>,
}

impl<S: FixSource + 'static> Tracker<S> {
    /// Build a tracker over `source` using the configured log location,
    /// write cadence, and noise divisor. Nothing runs until the first
    /// [`acquire`](Tracker::acquire).
    #[must_use]
    pub fn new(config: &Config, source: Arc<S>) -> Self {
        let store = LogStore::new(
            config.log_directory(),
            config.log.prefix.clone(),
            config.write_period(),
        );
        Self {
            source,
            shared: Arc::new(Mutex::new(Shared {
                fix: FixRecord::default(),
                time_error: 0.0,
                satellites_seen: 0,
                satellites_used: 0,
                store,
                summary: SessionSummary::new(),
                refs: 0,
                logging_requested: false,
                last_open_attempt: None,
            })),
            filter: NoiseFilter::new(config.noise.divisor),
            watch_desired: Arc::new(AtomicBool::new(false)),
            sampler: None,
        }
    }

    /// Register a consumer of the live stream.
    ///
    /// The 0→1 transition subscribes the device stream; the acquisition
    /// thread is started on the first call and never again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`](crate::Error::Source) when the subscribe
    /// command fails and [`Error::Io`](crate::Error::Io) when the thread
    /// cannot be spawned.
    pub fn acquire(&mut self) -> Result<()> {
        let first = {
            let mut shared = lock(&self.shared);
            shared.refs += 1;
            shared.refs == 1
        };

        if first {
            self.watch_desired.store(true, Ordering::SeqCst);
            self.source.watch(true)?;
            debug!("stream subscribed");
        }

        if self.sampler.is_none() {
            let shared = Arc::clone(&self.shared);
            let sampler = Sampler::spawn(
                Arc::clone(&self.source),
                Arc::clone(&self.watch_desired),
                move |event| apply_event(&shared, &event),
            )?;
            self.sampler = Some(sampler);
            info!("acquisition thread started");
        }
        Ok(())
    }

    /// Drop one consumer registration.
    ///
    /// The last release unsubscribes the stream and clears the summary's
    /// last-seen reference; the thread keeps polling, unsubscribed, until
    /// [`shutdown`](Tracker::shutdown). Never fails: an unsubscribe error
    /// only warrants a warning.
    pub fn release(&mut self) {
        let last = {
            let mut shared = lock(&self.shared);
            shared.refs = shared.refs.saturating_sub(1);
            shared.refs == 0
        };

        if last {
            self.watch_desired.store(false, Ordering::SeqCst);
            if let Err(err) = self.source.watch(false) {
                warn!(%err, "stream unsubscribe failed");
            }
            lock(&self.shared).summary.clear_last_seen();
            debug!("stream unsubscribed");
        }
    }

    /// Open today's log so ticks start persisting. A failed open degrades:
    /// it is reported and retried at write cadence by [`tick`](Tracker::tick).
    pub fn start_logging(&self) {
        let mut shared = lock(&self.shared);
        shared.logging_requested = true;
        shared.last_open_attempt = Some(Instant::now());
        if let Err(err) = shared.store.open_for_append() {
            warn!(%err, "cannot open log file, logging paused");
        }
    }

    /// Close the log. Idempotent.
    pub fn stop_logging(&self) {
        let mut shared = lock(&self.shared);
        shared.logging_requested = false;
        shared.store.close();
    }

    /// Whether a log file is currently open.
    #[must_use]
    pub fn is_logging(&self) -> bool {
        lock(&self.shared).store.is_open()
    }

    /// Periodic control entry point, driven externally (typically every
    /// 100 ms).
    ///
    /// Retries a failed log open at write cadence, then — while a usable
    /// fix (2-D or better) is held — hands the current fix to the store.
    /// The store throttles to the write period; a record that was actually
    /// written is committed to the running summary and the live
    /// session-start marker cleared. Returns whether a record was committed
    /// this tick.
    pub fn tick(&self) -> bool {
        let mut shared = lock(&self.shared);

        if shared.logging_requested && !shared.store.is_open() {
            let retry_due = shared
                .last_open_attempt
                .map_or(true, |at| at.elapsed() >= shared.store.write_period());
            if retry_due {
                shared.last_open_attempt = Some(Instant::now());
                if let Err(err) = shared.store.open_for_append() {
                    warn!(%err, "log open retry failed");
                }
            }
        }

        if !shared.store.is_open() || !shared.fix.mode.has_fix() {
            return false;
        }

        let mut record = shared.fix.clone();
        if shared.store.write(&mut record) {
            shared.fix.session_start = false;
            shared.summary.commit(&record, &self.filter);
            return true;
        }
        false
    }

    /// Prime the running summary from today's log, if one exists.
    ///
    /// Call before acquisition starts. `on_record` fires once per loaded
    /// record. Returns the number of records committed.
    pub fn prime_from_today(&self, on_record: impl FnMut(&FixRecord)) -> usize {
        let replay = SessionReplay::new(self.filter);
        let mut shared = lock(&self.shared);
        let path = shared.store.today_path();
        replay.load_into(&path, &mut shared.summary, on_record)
    }

    /// Whether the acquisition loop died on an unrecoverable source
    /// failure.
    #[must_use]
    pub fn sampler_failed(&self) -> bool {
        self.sampler.as_ref().is_some_and(Sampler::has_failed)
    }

    /// Sampler counters, once the thread has been started.
    #[must_use]
    pub fn sampler_status(&self) -> Option<SamplerStatus> {
        self.sampler.as_ref().map(Sampler::status)
    }

    /// Snapshot of the live fix.
    #[must_use]
    pub fn current_fix(&self) -> FixRecord {
        lock(&self.shared).fix.clone()
    }

    /// Snapshot of the running summary.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        lock(&self.shared).summary.clone()
    }

    /// Snapshot of the satellite counts.
    #[must_use]
    pub fn satellites(&self) -> SatelliteCounts {
        let shared = lock(&self.shared);
        SatelliteCounts {
            seen: shared.satellites_seen,
            used: shared.satellites_used,
        }
    }

    /// Estimated time error of the last fix, seconds.
    #[must_use]
    pub fn time_error(&self) -> f64 {
        lock(&self.shared).time_error
    }

    /// Current consumer count.
    #[must_use]
    pub fn reference_count(&self) -> u32 {
        lock(&self.shared).refs
    }

    /// Whether any consumer currently wants the stream.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch_desired.load(Ordering::SeqCst)
    }

    /// Stop the acquisition thread and close the log. Called once at
    /// process exit; idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.shutdown();
        }
        let mut shared = lock(&self.shared);
        shared.store.close();
        shared.logging_requested = false;
    }
}

impl<S: FixSource + 'static> Drop for Tracker<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Apply one device event to the shared state. Runs on the sampler thread;
/// one short critical section, no I/O.
fn apply_event(shared: &Mutex<Shared>, event: &SourceEvent) {
    let mut shared = lock(shared);
    match event {
        SourceEvent::Fix(update) => {
            if let Some(time_error) = update.time_error {
                shared.time_error = time_error;
            }
            shared.fix.apply_update(update);
        }
        SourceEvent::Sky(SkyUpdate { seen, used }) => {
            shared.satellites_seen = *seen;
            shared.satellites_used = *used;
        }
    }
}
