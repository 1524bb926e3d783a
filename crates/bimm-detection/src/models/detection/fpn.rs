//! # Feature Pyramid Network
//!
//! [`FeaturePyramidNetwork`] merges a list of backbone feature maps, from
//! highest resolution to lowest, into same-width pyramid levels: a 1x1
//! lateral conv per input, nearest-neighbour top-down merging, and a 3x3
//! output conv per level. An optional last-level max pool appends one
//! extra, half-resolution level.
//!
//! [`BackboneWithFpn`] pairs a [`ResNetBody`] with a pyramid.

use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::resnet::body::ResNetBody;
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Uniform ``a=1`` Kaiming init used by the pyramid convs.
pub static FPN_INITIALIZER: Initializer = Initializer::KaimingUniform {
    gain: 1.0,
    fan_out_only: false,
};

/// [`FeaturePyramidNetwork`] Config.
#[derive(Config, Debug)]
pub struct FpnConfig {
    /// Channels of each input level, highest resolution first.
    pub in_channels: Vec<usize>,

    /// Channels of every output level.
    #[config(default = 256)]
    pub out_channels: usize,

    /// Append a stride-2 max pool of the last level.
    #[config(default = true)]
    pub last_level_max_pool: bool,
}

impl FpnConfig {
    /// The number of output levels.
    pub fn num_levels(&self) -> usize {
        self.in_channels.len() + usize::from(self.last_level_max_pool)
    }

    /// Initialize a [`FeaturePyramidNetwork`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FeaturePyramidNetwork<B> {
        let out = self.out_channels;
        FeaturePyramidNetwork {
            inner_blocks: self
                .in_channels
                .iter()
                .map(|&c| {
                    Conv2dConfig::new([c, out], [1, 1])
                        .with_initializer(FPN_INITIALIZER.clone())
                        .init(device)
                })
                .collect(),
            layer_blocks: self
                .in_channels
                .iter()
                .map(|_| {
                    Conv2dConfig::new([out, out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .with_initializer(FPN_INITIALIZER.clone())
                        .init(device)
                })
                .collect(),
            extra_pool: self.last_level_max_pool.then(|| {
                MaxPool2dConfig::new([1, 1])
                    .with_strides([2, 2])
                    .init()
            }),
        }
    }
}

/// Feature Pyramid Network.
#[derive(Module, Debug)]
pub struct FeaturePyramidNetwork<B: Backend> {
    /// 1x1 lateral convs.
    pub inner_blocks: Vec<Conv2d<B>>,

    /// 3x3 output convs.
    pub layer_blocks: Vec<Conv2d<B>>,

    /// Optional last-level max pool.
    pub extra_pool: Option<MaxPool2d>,
}

impl<B: Backend> FeaturePyramidNetwork<B> {
    /// Channels of every output level.
    pub fn out_channels(&self) -> usize {
        self.layer_blocks
            .first()
            .map_or(0, |conv| conv.weight.dims()[0])
    }

    /// The number of output levels.
    pub fn num_levels(&self) -> usize {
        self.layer_blocks.len() + usize::from(self.extra_pool.is_some())
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `features`: one ``[batch, in_channels[i], height_i, width_i]`` tensor
    ///   per level, highest resolution first.
    ///
    /// # Returns
    ///
    /// One ``[batch, out_channels, height_i, width_i]`` tensor per level,
    /// plus the pooled level when enabled.
    ///
    /// # Panics
    ///
    /// If the number of features does not match the number of levels.
    pub fn forward(
        &self,
        features: Vec<Tensor<B, 4>>,
    ) -> Vec<Tensor<B, 4>> {
        assert_eq!(
            features.len(),
            self.inner_blocks.len(),
            "expected {} feature levels",
            self.inner_blocks.len()
        );
        let out_channels = self.out_channels();

        let mut levels = features
            .into_iter()
            .zip(&self.inner_blocks)
            .map(|(x, inner)| inner.forward(x))
            .collect::<Vec<_>>();

        // Top-down merge, from the lowest resolution level.
        for idx in (0..levels.len().saturating_sub(1)).rev() {
            let [_, _, height, width] = levels[idx].dims();
            let top_down = interpolate(
                levels[idx + 1].clone(),
                [height, width],
                InterpolateOptions::new(InterpolateMode::Nearest),
            );
            levels[idx] = levels[idx].clone() + top_down;
        }

        let mut results = levels
            .into_iter()
            .zip(&self.layer_blocks)
            .map(|(x, layer)| layer.forward(x))
            .collect::<Vec<_>>();

        if let (Some(pool), Some(last)) = (&self.extra_pool, results.last()) {
            let pooled = pool.forward(last.clone());
            results.push(pooled);
        }

        for level in &results {
            assert_shape_contract_periodically!(
                ["batch", "out_channels", "height", "width"],
                level,
                &[("out_channels", out_channels)]
            );
        }

        results
    }
}

/// A [`ResNetBody`] feeding a [`FeaturePyramidNetwork`].
#[derive(Module, Debug)]
pub struct BackboneWithFpn<B: Backend> {
    /// The feature body.
    pub body: ResNetBody<B>,

    /// The pyramid.
    pub fpn: FeaturePyramidNetwork<B>,

    /// The number of trainable body stages.
    pub trainable_layers: usize,
}

impl<B: Backend> BackboneWithFpn<B> {
    /// Channels of every pyramid level.
    pub fn out_channels(&self) -> usize {
        self.fpn.out_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `images`: a ``[batch, channels, height=h32*32, width=w32*32]`` tensor.
    ///
    /// # Returns
    ///
    /// The pyramid levels, at strides 4, 8, 16, 32 and 64.
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
    ) -> Vec<Tensor<B, 4>> {
        self.fpn.forward(self.body.forward(images).to_vec())
    }
}

impl<B: Backend> EpsilonPatch for BackboneWithFpn<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            body: self.body.overwrite_eps(eps),
            ..self
        }
    }
}

/// Wrap a [`ResNetBody`] in a feature pyramid.
///
/// Freezes the body to `trainable_layers` stages and attaches an
/// `out_channels` pyramid over all four stages, with a last-level max pool.
pub fn resnet_fpn_extractor<B: Backend>(
    body: ResNetBody<B>,
    trainable_layers: usize,
    out_channels: usize,
    device: &B::Device,
) -> BackboneWithFpn<B> {
    let fpn = FpnConfig::new(body.out_channels().to_vec())
        .with_out_channels(out_channels)
        .init(device);
    BackboneWithFpn {
        body: body.freeze(trainable_layers),
        fpn,
        trainable_layers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::body::ResNetBodyConfig;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_fpn_config() {
        let config = FpnConfig::new(vec![256, 512, 1024, 2048]);
        assert_eq!(config.out_channels, 256);
        assert_eq!(config.num_levels(), 5);
        assert_eq!(config.with_last_level_max_pool(false).num_levels(), 4);
    }

    #[test]
    fn test_fpn_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let fpn: FeaturePyramidNetwork<B> = FpnConfig::new(vec![2, 4, 8])
            .with_out_channels(6)
            .init(&device);
        assert_eq!(fpn.out_channels(), 6);
        assert_eq!(fpn.num_levels(), 4);

        let levels = fpn.forward(vec![
            Tensor::ones([2, 2, 16, 12], &device),
            Tensor::ones([2, 4, 8, 6], &device),
            Tensor::ones([2, 8, 4, 3], &device),
        ]);
        let dims = levels.iter().map(|t| t.dims()).collect::<Vec<_>>();
        assert_eq!(
            dims,
            vec![[2, 6, 16, 12], [2, 6, 8, 6], [2, 6, 4, 3], [2, 6, 2, 2]]
        );
    }

    #[test]
    fn test_resnet_fpn_extractor() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let body: ResNetBody<B> = ResNetBodyConfig::new([1, 1, 1, 1])
            .with_stem_width(2)
            .init(&device);
        let backbone = resnet_fpn_extractor(body, 3, 256, &device);

        assert_eq!(backbone.trainable_layers, 3);
        assert_eq!(backbone.out_channels(), 256);
        assert_eq!(backbone.fpn.inner_blocks.len(), 4);
        assert_eq!(backbone.fpn.inner_blocks[3].weight.dims(), [256, 64, 1, 1]);
        assert!(!backbone.body.layer1.blocks[0].conv1.conv.weight.is_require_grad());
        assert!(backbone.body.layer2.blocks[0].conv1.conv.weight.is_require_grad());
        assert!(backbone.fpn.layer_blocks[0].weight.is_require_grad());

        let levels = backbone.forward(Tensor::ones([1, 3, 64, 64], &device));
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0].dims(), [1, 256, 16, 16]);
        assert_eq!(levels[4].dims(), [1, 256, 1, 1]);

        let backbone = backbone.overwrite_eps(0.0);
        assert_eq!(backbone.body.stem.norm.eps, 0.0);
    }
}
