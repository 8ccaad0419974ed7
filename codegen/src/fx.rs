//! Fast hash maps and sets for internal use.
//!
//! Keyed almost exclusively by small entity indices, so a cheap
//! non-cryptographic hasher is a measurable win over SipHash.

pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
