//! Common types.

pub(crate) mod primitives;
