//! # Neural Network Layers

pub mod conv_norm;
pub mod frozen_norm;
