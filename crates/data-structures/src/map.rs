//! Hash maps and sets using the fast, non-cryptographic [`FxHasher`](rustc_hash::FxHasher).
//!
//! Keys in the scheduler are small integers, for which SipHash's DoS resistance buys nothing.

pub use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
