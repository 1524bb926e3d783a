//! # Residual Projection
//!
//! [`ConvDownsample`] projects the residual branch of a block whose stride
//! or width changes: a bias-free 1x1 strided conv and a frozen norm.
//! Checkpoints store it as ``downsample.0`` / ``downsample.1``.

use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig};
use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::unpack_shape_contract;
use burn::nn::Initializer;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ConvDownsample`] Config.
#[derive(Config, Debug)]
pub struct ConvDownsampleConfig {
    /// Input channels.
    pub in_channels: usize,

    /// Output channels.
    pub out_channels: usize,

    /// Spatial stride.
    #[config(default = 1)]
    pub stride: usize,

    /// Frozen norm `eps`.
    #[config(default = 1e-5)]
    pub eps: f64,

    /// Conv initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER.clone()")]
    pub initializer: Initializer,
}

impl ConvDownsampleConfig {
    /// Initialize a [`ConvDownsample`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvDownsample<B> {
        let conv = Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
            .with_stride([self.stride; 2])
            .with_initializer(self.initializer.clone())
            .with_bias(false);

        ConvDownsample {
            conv_norm: ConvNorm2dConfig::from(conv)
                .with_eps(self.eps)
                .init(device),
        }
    }
}

/// Strided 1x1 conv/norm projection.
#[derive(Module, Debug)]
pub struct ConvDownsample<B: Backend> {
    /// Embedded conv/norm.
    pub conv_norm: ConvNorm2d<B>,
}

impl<B: Backend> ConvDownsample<B> {
    /// Input channels.
    pub fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    /// Output channels.
    pub fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    /// Spatial stride.
    pub fn stride(&self) -> usize {
        self.conv_norm.stride()[0]
    }

    /// Forward Pass.
    ///
    /// ``[batch, in_channels, h*stride, w*stride] -> [batch, out_channels, h, w]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_height" = "h" * "stride",
                "in_width" = "w" * "stride"
            ],
            &input,
            &[],
            &[
                ("in_channels", self.in_channels()),
                ("stride", self.stride())
            ]
        );

        self.conv_norm.forward(input)
    }
}

impl<B: Backend> EpsilonPatch for ConvDownsample<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            conv_norm: self.conv_norm.overwrite_eps(eps),
        }
    }
}
