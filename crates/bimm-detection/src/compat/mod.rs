//! # Compatibility Layers

pub mod pytorch;
