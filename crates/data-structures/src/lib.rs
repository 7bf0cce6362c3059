//! Common data structures.
//!
//! Index newtypes are modified from [`rustc_index`](https://github.com/rust-lang/rust/tree/master/compiler/rustc_index).

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(feature = "nightly", feature(rustc_attrs))]
#![cfg_attr(feature = "nightly", allow(internal_features))]

pub mod index;
pub mod map;

mod bit_set;
pub use bit_set::BitSet;

pub use smallvec;
