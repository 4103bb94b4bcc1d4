//! Blocking gpsd client over TCP.
//!
//! The client splits the socket into a read half and a write half so a
//! `?WATCH` command can be issued while another thread sits in a read. Reads
//! are bounded by a socket timeout; a timed-out read yields `Ok(None)` so
//! the caller can re-check its own shutdown signal between polls.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::proto::{Report, WATCH_DISABLE, WATCH_ENABLE};

/// Errors from the gpsd client.
#[derive(Debug, Error)]
pub enum GpsdError {
    /// The initial or renewed TCP connection failed.
    #[error("failed to connect to gpsd at {addr}: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying connect error.
        source: std::io::Error,
    },

    /// The connection was closed by the far end (end of stream).
    #[error("gpsd connection closed")]
    Disconnected,

    /// A socket read or write failed.
    #[error("gpsd I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GpsdError {
    /// Whether reconnecting is a sensible response to this error.
    ///
    /// Connection refusal is not recoverable by retrying immediately; a
    /// dropped or broken established connection is.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Connect { .. })
    }
}

/// Result type for gpsd client operations.
pub type Result<T> = std::result::Result<T, GpsdError>;

/// A reconnectable blocking connection to a gpsd instance.
#[derive(Debug)]
pub struct GpsdClient {
    addr: String,
    read_timeout: Duration,
    reader: Mutex<Option<BufReader<TcpStream>>>,
    writer: Mutex<Option<TcpStream>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GpsdClient {
    /// Connect to gpsd at `addr` (host:port).
    ///
    /// `read_timeout` bounds every subsequent [`next_report`] call; it is
    /// also the longest a caller waits between shutdown-signal checks.
    ///
    /// # Errors
    ///
    /// Returns [`GpsdError::Connect`] when the TCP connection cannot be
    /// established, or [`GpsdError::Io`] when the socket refuses the
    /// timeout option.
    ///
    /// [`next_report`]: GpsdClient::next_report
    pub fn connect(addr: &str, read_timeout: Duration) -> Result<Self> {
        let client = Self {
            addr: addr.to_string(),
            read_timeout,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        };
        client.dial()?;
        Ok(client)
    }

    fn dial(&self) -> Result<()> {
        let stream = TcpStream::connect(&self.addr).map_err(|source| GpsdError::Connect {
            addr: self.addr.clone(),
            source,
        })?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        let write_half = stream.try_clone()?;
        *lock(&self.reader) = Some(BufReader::new(stream));
        *lock(&self.writer) = Some(write_half);
        debug!(addr = %self.addr, "connected to gpsd");
        Ok(())
    }

    fn disconnect(&self) {
        lock(&self.reader).take();
        lock(&self.writer).take();
    }

    /// Address this client dials.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.reader).is_some()
    }

    /// Enable or disable JSON report streaming.
    ///
    /// # Errors
    ///
    /// Returns [`GpsdError::Disconnected`] when no connection is
    /// established, or [`GpsdError::Io`] when the command cannot be sent.
    pub fn watch(&self, enable: bool) -> Result<()> {
        let mut guard = lock(&self.writer);
        let Some(stream) = guard.as_mut() else {
            return Err(GpsdError::Disconnected);
        };
        let command = if enable { WATCH_ENABLE } else { WATCH_DISABLE };
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\n")?;
        debug!(enable, "sent watch command");
        Ok(())
    }

    /// Read the next report, waiting at most the configured read timeout.
    ///
    /// Returns `Ok(None)` when the wait timed out or the line was not a
    /// recognized report (gpsd chatter the caller does not consume).
    ///
    /// # Errors
    ///
    /// Returns [`GpsdError::Disconnected`] on end of stream and
    /// [`GpsdError::Io`] on socket failure; both drop the connection so a
    /// later [`reconnect`] starts clean.
    ///
    /// [`reconnect`]: GpsdClient::reconnect
    pub fn next_report(&self) -> Result<Option<Report>> {
        let mut guard = lock(&self.reader);
        let Some(reader) = guard.as_mut() else {
            return Err(GpsdError::Disconnected);
        };
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                drop(guard);
                self.disconnect();
                Err(GpsdError::Disconnected)
            }
            Ok(_) => match Report::parse(&line) {
                Ok(report) => Ok(Some(report)),
                Err(err) => {
                    trace!(%err, line = line.trim(), "skipping unparsed gpsd line");
                    Ok(None)
                }
            },
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(err) => {
                drop(guard);
                self.disconnect();
                Err(GpsdError::Io(err))
            }
        }
    }

    /// Drop any existing connection and dial again.
    ///
    /// The watch state does not survive a reconnect; callers that were
    /// streaming must issue [`watch`] again.
    ///
    /// # Errors
    ///
    /// Returns [`GpsdError::Connect`] when the new connection fails.
    ///
    /// [`watch`]: GpsdClient::watch
    pub fn reconnect(&self) -> Result<()> {
        self.disconnect();
        self.dial()
    }
}
