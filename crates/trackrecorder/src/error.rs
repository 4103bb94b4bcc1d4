//! Error types for trackrecorder.
//!
//! This module defines the error type used throughout the trackrecorder
//! crate. Most runtime failures here are deliberately *not* fatal — the log
//! store degrades to a paused state and replay skips bad lines — so these
//! variants mostly surface at boundaries: configuration, file opening, and
//! the device source.

use std::path::PathBuf;
use thiserror::Error;

use crate::sampler::SourceError;

/// The main error type for trackrecorder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Log Store Errors ===
    /// Failed to open or create a per-day log file.
    #[error("failed to open log file {path}: {source}")]
    LogOpen {
        /// Path to the log file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Record Errors ===
    /// A persisted record line could not be decoded.
    #[error("malformed record: {message}")]
    MalformedRecord {
        /// Description of what was wrong with the line.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Device Errors ===
    /// The fix source failed.
    #[error("fix source error: {0}")]
    Source(#[from] SourceError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for trackrecorder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a malformed record error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }

    /// Check if this error is a record decode failure.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. } | Self::Json(_))
    }

    /// Check if this error is a configuration problem.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigLoad(_) | Self::ConfigValidation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_open_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::LogOpen {
            path: PathBuf::from("/var/log/tracker/gpslog20170610"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/log/tracker/gpslog20170610"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }

    #[test]
    fn test_malformed_record() {
        let err = Error::malformed("missing timestamp");
        assert!(err.to_string().contains("missing timestamp"));
        assert!(err.is_malformed());
        assert!(!err.is_config());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(err.is_malformed());
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "write period must be greater than zero".to_string(),
        };
        assert!(err.to_string().contains("write period"));
        assert!(err.is_config());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_source_error() {
        let err: Error = SourceError::StreamEnded.into();
        assert!(err.to_string().contains("stream"));
    }
}
