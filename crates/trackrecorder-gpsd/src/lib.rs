//! Blocking gpsd protocol client.
//!
//! Speaks the gpsd JSON protocol over TCP: `?WATCH` subscription control
//! plus newline-delimited report parsing. Reads are timeout-bounded so a
//! sampling loop built on this client can observe its own shutdown signal
//! without waiting on the device.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod client;
pub mod proto;

pub use client::{GpsdClient, GpsdError, Result};
pub use proto::{Report, Satellite, Sky, Tpv};
