//! Atomic integer types used throughout the crate.
//!
//! Plain [`std::sync::atomic`] on platforms that support it; falls back to
//! [`portable_atomic`] (e.g. pre-v6 ARM) when the `portable-atomic` feature is enabled.

#[cfg(not(feature = "portable-atomic"))]
pub(crate) use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "portable-atomic")]
pub(crate) use portable_atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
