//! # Algorithms Module
//!
//! - `fingerprint`: streaming SHA-256 over canonical JSON documents
//! - `filter`: equality queries and projections

pub mod filter;
pub mod fingerprint;

pub use filter::{matches_query, parse_filter, Projection};
pub use fingerprint::{canonical_json, compute_fingerprint, FingerprintHasher};
