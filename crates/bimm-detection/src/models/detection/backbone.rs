//! # Detection Backbone Collaborators
//!
//! The default [`BackboneProvider`] and [`FeaturePyramidWrapper`] of the
//! `ResNet-FPN` detectors.

use crate::builder::assembly::{BackboneProvider, FeaturePyramidWrapper};
use crate::cache::weights::RetrievalService;
use crate::errors::{ModelBuildError, Result};
use crate::models::detection::fpn::{BackboneWithFpn, resnet_fpn_extractor};
use crate::models::resnet::body::{ResNetBody, ResNetBodyConfig};
use crate::models::resnet::resnet_io::pytorch_stubs::load_resnet_body_weights;
use crate::weights::Weights;
use burn::prelude::Backend;

/// Builds a [`ResNetBody`], loading ``torchvision`` `ResNet` weights when
/// backbone weights are selected.
#[derive(Debug, Clone)]
pub struct ResNetBodyProvider {
    /// The body architecture.
    pub config: ResNetBodyConfig,
}

impl Default for ResNetBodyProvider {
    fn default() -> Self {
        Self {
            config: ResNetBodyConfig::resnet50(),
        }
    }
}

impl<B: Backend> BackboneProvider<B> for ResNetBodyProvider {
    type Backbone = ResNetBody<B>;

    fn construct(
        &self,
        weights_backbone: Option<&'static Weights>,
        progress: bool,
        retrieval: &dyn RetrievalService,
        device: &B::Device,
    ) -> Result<Self::Backbone> {
        let body = self.config.init(device);

        let Some(weights) = weights_backbone else {
            return Ok(body);
        };

        let path = weights.fetch(retrieval, progress)?;
        tracing::info!(weights = %weights, path = %path.display(), "loading backbone weights");
        load_resnet_body_weights(body, &path, device)
            .map_err(|source| ModelBuildError::LoadFailure { path, source })
    }
}

/// Wraps a [`ResNetBody`] with [`resnet_fpn_extractor`].
#[derive(Debug, Clone)]
pub struct ResNetFpnWrapper {
    /// Channels of every pyramid level.
    pub out_channels: usize,
}

impl Default for ResNetFpnWrapper {
    fn default() -> Self {
        Self { out_channels: 256 }
    }
}

impl<B: Backend> FeaturePyramidWrapper<B, ResNetBody<B>> for ResNetFpnWrapper {
    type Extractor = BackboneWithFpn<B>;

    fn wrap(
        &self,
        backbone: ResNetBody<B>,
        trainable_layers: usize,
        device: &B::Device,
    ) -> Self::Extractor {
        resnet_fpn_extractor(backbone, trainable_layers, self.out_channels, device)
    }
}
