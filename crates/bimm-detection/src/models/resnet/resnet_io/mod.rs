//! # `ResNet` Checkpoint IO

pub mod pytorch_stubs;
