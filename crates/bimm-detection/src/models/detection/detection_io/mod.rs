//! # Detection Checkpoint IO

pub mod pytorch_stubs;

use crate::builder::assembly::ParameterLoader;
use crate::models::detection::detection_io::pytorch_stubs::{
    load_faster_rcnn_weights, load_keypoint_rcnn_weights,
};
use crate::models::detection::faster_rcnn::FasterRcnn;
use crate::models::detection::keypoint_rcnn::KeypointRcnn;
use burn::prelude::Backend;
use std::path::Path;

/// Loads ``torchvision`` ``.pth`` checkpoints into detection models.
#[derive(Debug, Clone, Copy, Default)]
pub struct PyTorchCheckpointLoader;

impl<B: Backend> ParameterLoader<B, FasterRcnn<B>> for PyTorchCheckpointLoader {
    fn load(
        &self,
        model: FasterRcnn<B>,
        payload: &Path,
        device: &B::Device,
    ) -> anyhow::Result<FasterRcnn<B>> {
        load_faster_rcnn_weights(model, payload, device)
    }
}

impl<B: Backend> ParameterLoader<B, KeypointRcnn<B>> for PyTorchCheckpointLoader {
    fn load(
        &self,
        model: KeypointRcnn<B>,
        payload: &Path,
        device: &B::Device,
    ) -> anyhow::Result<KeypointRcnn<B>> {
        load_keypoint_rcnn_weights(model, payload, device)
    }
}
