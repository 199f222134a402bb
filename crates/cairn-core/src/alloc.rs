//! Collection types used across Cairn.
//!
//! Asset names and type ids are hashed on every lookup, so every map in the
//! runtime goes through AHash instead of SipHash.

pub use ahash::AHashMap as HashMap;
