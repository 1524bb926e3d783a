#![warn(missing_docs)]
//!# bimm-detection - Burn Detection Models
//!
//! Pretrained weights resolution and model assembly for `ResNet-50` FPN
//! detectors.
//!
//! ## Notable Components
//!
//! * [`weights`] - pretrained weights entries and registries.
//! * [`builder`] - the request resolution / model assembly pipeline.
//!   * [`builder::resolve`] - legacy flags, weights and head size resolution.
//!   * [`builder::assembly`] - the collaborator traits and the assembler.
//! * [`cache`] - weight download cache.
//! * [`compat`] - ``torch`` checkpoint loading helpers.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::frozen_norm`] - frozen batch norm, and the epsilon patch.
//!   * [`layers::conv_norm`] - ``Conv2d + FrozenBatchNorm2d`` block.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - `ResNet` feature bodies.
//!   * [`models::detection`] - Keypoint R-CNN and Faster R-CNN.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod builder;
pub mod cache;
pub mod compat;
pub mod errors;
pub mod layers;
pub mod models;
pub mod weights;
