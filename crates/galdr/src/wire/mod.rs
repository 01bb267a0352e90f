//! Wire-level building blocks: fixed-width scalar primitives, the
//! variable-length natural number encoding and the tagged fragment header.
//!
//! Everything here is little-endian and self-contained; the codec engine in
//! [`crate::engine`] composes these primitives into full object codecs.
pub mod fragment;
pub mod scalar;
pub mod varint;

pub use fragment::Fragment;
