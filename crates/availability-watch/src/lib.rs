//! # Availability Watch
//!
//! This crate polls reservauto.net on a fixed interval and reports station and
//! flex vehicle availability to an observer supplied by the caller.

/// Configuration, errors and pass reports
mod watch_types;
pub use watch_types::*;

/// Observer contract implemented by callers
mod observer;
pub use observer::*;

/// Polling loop
mod executor;
pub use executor::*;
