//! Codec module - serialization and compression for payloads.
//!
//! - [`JsonCodec`] - JSON bodies of control frames (`serde_json`)
//! - [`GzipCodec`] - gzip payload compression (`flate2`)
//!
//! Audio frames carry the caller's bytes untouched; no codec applies.
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.

mod gzip;
mod json;

pub use gzip::GzipCodec;
pub use json::JsonCodec;
