//! # Reservauto
//!
//! This crate provides a client for the undocumented reservauto.net endpoints used by
//! Communauto to publish station and flex vehicle availability.

/// Error type shared by the client and the payload normalizer
mod error;
pub use error::*;

/// Queries, identifiers and vehicle records
mod types;
pub use types::*;

/// Repair and decoding of the station availability payload
mod normalizer;
pub use normalizer::*;

/// HTTP client for the station and flex endpoints
mod client;
pub use client::*;
