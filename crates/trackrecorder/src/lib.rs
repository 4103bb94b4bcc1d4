//! `trackrecorder` - A headless GPS track recorder
//!
//! This library provides the core functionality for sampling fixes from a
//! gpsd instance, summarizing sessions with distance and noise filtering,
//! appending fixes to per-day logs, and replaying those logs into session
//! summaries.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod fix;
pub mod logging;
pub mod replay;
pub mod sampler;
pub mod sources;
pub mod store;
pub mod summary;
pub mod tracker;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::NoiseFilter;
pub use fix::{FixMode, FixRecord, FixUpdate};
pub use logging::init_logging;
pub use replay::SessionReplay;
pub use sampler::{FixSource, Sampler, SourceError, SourceEvent};
pub use store::LogStore;
pub use summary::SessionSummary;
pub use tracker::Tracker;
