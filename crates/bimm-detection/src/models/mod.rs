//! # Models

pub mod detection;
pub mod resnet;
