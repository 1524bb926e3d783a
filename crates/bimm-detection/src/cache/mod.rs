//! # Weight Caches
//!
//! * [`disk`] - read-through download cache on local disk.
//! * [`weights`] - cache keys for weight files and the [`weights::RetrievalService`] seam.

pub mod disk;
pub mod weights;
