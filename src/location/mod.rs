//! Last known driver positions.
//!
//! One sample per driver, overwritten in place. Reads past the staleness
//! window report "not found" so callers fall back to an unknown position
//! instead of trusting an old fix.

pub mod cache;

pub use cache::{LocationCache, LocationSample};
