//! Background acquisition from a fix source.
//!
//! [`FixSource`] abstracts the device: subscription control, a
//! timeout-bounded read, and a restart path for when the stream drops. The
//! [`Sampler`] owns the named thread that polls the source and applies each
//! event to shared state through a caller-supplied closure.
//!
//! Because every read returns within the source's configured timeout, the
//! quit flag is observed within one poll interval. There is no
//! force-the-stream-to-emit workaround; termination never depends on the
//! device producing another value.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fix::FixUpdate;

/// Errors from a fix source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The device stream ended; re-subscribing usually recovers.
    #[error("device stream ended")]
    StreamEnded,

    /// The device cannot be reached at all. Fatal to acquisition.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// An I/O failure on an established stream.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether a restart of the stream is worth attempting.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Result type for fix source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Satellite counts from a sky view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkyUpdate {
    /// Satellites visible to the receiver.
    pub seen: u32,

    /// Satellites participating in the fix.
    pub used: u32,
}

/// One event read from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A positional update; fields the device did not report are absent.
    Fix(FixUpdate),

    /// A satellite sky view.
    Sky(SkyUpdate),
}

/// A device that streams positional fixes.
///
/// Implementations must bound `next_event` by their configured read
/// timeout so a loop built on them can observe a shutdown signal between
/// polls.
pub trait FixSource: Send + Sync {
    /// Subscribe to or unsubscribe from the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the command cannot reach the device.
    fn watch(&self, enable: bool) -> SourceResult<()>;

    /// Read the next event, waiting at most the source's read timeout.
    ///
    /// Returns `Ok(None)` when the wait timed out or the device sent
    /// something the recorder does not consume.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::StreamEnded`] on end of stream and
    /// [`SourceError::Io`] on transport failure; both are recoverable via
    /// [`restart`](FixSource::restart).
    fn next_event(&self) -> SourceResult<Option<SourceEvent>>;

    /// Tear down and re-establish the stream.
    ///
    /// The watch state does not survive a restart; the sampler re-issues it.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] when the device cannot be
    /// reached again, which the sampler treats as fatal.
    fn restart(&self) -> SourceResult<()>;
}

/// Counters and flags snapshot for a running sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerStatus {
    /// Whether the acquisition thread is still alive.
    pub running: bool,

    /// Whether the loop exited on an unrecoverable source failure.
    pub failed: bool,

    /// Positional updates applied since start.
    pub fixes_applied: u64,

    /// Sky views applied since start.
    pub sky_views_applied: u64,

    /// Times the stream was restarted after dropping.
    pub restarts: u64,
}

/// Handle to the background acquisition thread.
///
/// The thread is started once by [`spawn`](Sampler::spawn) and runs until
/// [`shutdown`](Sampler::shutdown). It keeps polling while unsubscribed;
/// the source simply yields timeouts until watching resumes.
#[derive(Debug)]
pub struct Sampler {
    handle: Option<JoinHandle<()>>,
    quit: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    fixes: Arc<AtomicU64>,
    skies: Arc<AtomicU64>,
    restarts: Arc<AtomicU64>,
}

impl Sampler {
    /// Start the acquisition thread.
    ///
    /// `apply` is invoked on the sampler thread for every event read;
    /// implementations lock the shared state, apply the update, and return
    /// quickly. `watch_desired` mirrors the consumer reference count: after
    /// a stream restart the sampler re-issues the watch command when it is
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) when the OS refuses to spawn
    /// the thread.
    pub fn spawn<S>(
        source: Arc<S>,
        watch_desired: Arc<AtomicBool>,
        mut apply: impl FnMut(SourceEvent) + Send + 'static,
    ) -> crate::error::Result<Self>
    where
        S: FixSource + 'static,
    {
        let quit = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let fixes = Arc::new(AtomicU64::new(0));
        let skies = Arc::new(AtomicU64::new(0));
        let restarts = Arc::new(AtomicU64::new(0));

        let thread_quit = Arc::clone(&quit);
        let thread_failed = Arc::clone(&failed);
        let thread_fixes = Arc::clone(&fixes);
        let thread_skies = Arc::clone(&skies);
        let thread_restarts = Arc::clone(&restarts);

        let handle = std::thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || {
                debug!("sampler thread started");
                while !thread_quit.load(Ordering::SeqCst) {
                    match source.next_event() {
                        Ok(Some(event)) => {
                            match &event {
                                SourceEvent::Fix(_) => {
                                    thread_fixes.fetch_add(1, Ordering::Relaxed);
                                }
                                SourceEvent::Sky(_) => {
                                    thread_skies.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                            apply(event);
                        }
                        Ok(None) => {} // Timed out or chatter; re-check quit.
                        Err(err) if err.is_recoverable() => {
                            warn!(%err, "stream dropped, restarting");
                            match source.restart() {
                                Ok(()) => {
                                    thread_restarts.fetch_add(1, Ordering::Relaxed);
                                    if watch_desired.load(Ordering::SeqCst) {
                                        if let Err(err) = source.watch(true) {
                                            warn!(%err, "re-watch after restart failed");
                                        }
                                    }
                                }
                                Err(err) => {
                                    error!(%err, "stream restart failed, stopping acquisition");
                                    thread_failed.store(true, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                        Err(err) => {
                            error!(%err, "unrecoverable source failure, stopping acquisition");
                            thread_failed.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
                info!("sampler thread exiting");
            })?;

        Ok(Self {
            handle: Some(handle),
            quit,
            failed,
            fixes,
            skies,
            restarts,
        })
    }

    /// Whether the loop exited on an unrecoverable failure.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Snapshot the thread state and counters.
    #[must_use]
    pub fn status(&self) -> SamplerStatus {
        SamplerStatus {
            running: self.handle.as_ref().is_some_and(|h| !h.is_finished()),
            failed: self.has_failed(),
            fixes_applied: self.fixes.load(Ordering::Relaxed),
            sky_views_applied: self.skies.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }

    /// Set the quit flag and join the thread. Idempotent.
    ///
    /// Returns within roughly one source read timeout.
    pub fn shutdown(&mut self) {
        self.quit.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sampler thread panicked");
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plays back a scripted sequence of read results, then times out
    /// forever.
    struct ScriptedSource {
        script: Mutex<VecDeque<SourceResult<Option<SourceEvent>>>>,
        restarts: AtomicU32,
        watches: Mutex<Vec<bool>>,
        restart_fails: bool,
    }

    impl ScriptedSource {
        fn new(script: Vec<SourceResult<Option<SourceEvent>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                restarts: AtomicU32::new(0),
                watches: Mutex::new(Vec::new()),
                restart_fails: false,
            }
        }

        fn failing_restart(script: Vec<SourceResult<Option<SourceEvent>>>) -> Self {
            Self {
                restart_fails: true,
                ..Self::new(script)
            }
        }
    }

    impl FixSource for ScriptedSource {
        fn watch(&self, enable: bool) -> SourceResult<()> {
            self.watches.lock().unwrap().push(enable);
            Ok(())
        }

        fn next_event(&self) -> SourceResult<Option<SourceEvent>> {
            // Keep the poll loop from spinning hot once the script runs out.
            std::thread::sleep(Duration::from_millis(1));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        fn restart(&self) -> SourceResult<()> {
            if self.restart_fails {
                return Err(SourceError::Unavailable("scripted failure".to_string()));
            }
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fix_event(lat: f64) -> SourceEvent {
        SourceEvent::Fix(FixUpdate {
            latitude: Some(lat),
            ..FixUpdate::default()
        })
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..deadline_ms {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_events_are_applied_and_counted() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(Some(fix_event(51.5))),
            Ok(None),
            Ok(Some(SourceEvent::Sky(SkyUpdate { seen: 8, used: 5 }))),
            Ok(Some(fix_event(51.6))),
        ]));
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&applied);

        let mut sampler = Sampler::spawn(
            source,
            Arc::new(AtomicBool::new(false)),
            move |event| sink.lock().unwrap().push(event),
        )
        .expect("spawn");

        assert!(wait_until(500, || applied.lock().unwrap().len() == 3));
        sampler.shutdown();

        let status = sampler.status();
        assert_eq!(status.fixes_applied, 2);
        assert_eq!(status.sky_views_applied, 1);
        assert!(!status.failed);
        assert!(!status.running);
    }

    #[test]
    fn test_stream_end_triggers_restart() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SourceError::StreamEnded),
            Ok(Some(fix_event(51.5))),
        ]));
        let applied = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&applied);
        let watch_desired = Arc::new(AtomicBool::new(true));

        let mut sampler = Sampler::spawn(Arc::clone(&source), watch_desired, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn");

        assert!(wait_until(500, || applied.load(Ordering::SeqCst) == 1));
        sampler.shutdown();

        assert_eq!(source.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(sampler.status().restarts, 1);
        // Watch was re-issued because a consumer still wants the stream.
        assert_eq!(source.watches.lock().unwrap().as_slice(), &[true]);
        assert!(!sampler.has_failed());
    }

    #[test]
    fn test_restart_failure_is_fatal() {
        let source = Arc::new(ScriptedSource::failing_restart(vec![Err(
            SourceError::StreamEnded,
        )]));
        let mut sampler = Sampler::spawn(source, Arc::new(AtomicBool::new(false)), |_| {})
            .expect("spawn");

        assert!(wait_until(500, || sampler.has_failed()));
        assert!(wait_until(500, || !sampler.status().running));
        sampler.shutdown();
        assert!(sampler.status().failed);
    }

    #[test]
    fn test_unrecoverable_read_error_is_fatal() {
        let source = Arc::new(ScriptedSource::new(vec![Err(SourceError::Unavailable(
            "gone".to_string(),
        ))]));
        let mut sampler = Sampler::spawn(Arc::clone(&source), Arc::new(AtomicBool::new(false)), |_| {})
            .expect("spawn");

        assert!(wait_until(500, || sampler.has_failed()));
        sampler.shutdown();
        // No restart was attempted for a fatal error.
        assert_eq!(source.restarts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_is_prompt_and_idempotent() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let mut sampler =
            Sampler::spawn(source, Arc::new(AtomicBool::new(false)), |_| {}).expect("spawn");
        assert!(sampler.status().running);
        sampler.shutdown();
        sampler.shutdown();
        assert!(!sampler.status().running);
    }

    #[test]
    fn test_source_error_recoverability() {
        assert!(SourceError::StreamEnded.is_recoverable());
        assert!(SourceError::Io(std::io::Error::other("boom")).is_recoverable());
        assert!(!SourceError::Unavailable("refused".to_string()).is_recoverable());
    }
}
