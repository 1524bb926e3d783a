//! # Conv + Frozen Norm
//!
//! [`ConvNorm2d`] pairs a [`Conv2d`] with a [`FrozenBatchNorm2d`] sized to
//! its output channels. Every `ResNet` conv in the detection backbones is
//! one of these.

use crate::layers::frozen_norm::{EpsilonPatch, FrozenBatchNorm2d, FrozenBatchNorm2dConfig};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`ConvNorm2d`] Config.
#[derive(Config, Debug)]
pub struct ConvNorm2dConfig {
    /// The wrapped conv.
    pub conv: Conv2dConfig,

    /// Frozen norm `eps`.
    #[config(default = 1e-5)]
    pub eps: f64,
}

impl From<Conv2dConfig> for ConvNorm2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self::new(conv)
    }
}

impl ConvNorm2dConfig {
    /// Initialize a [`ConvNorm2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvNorm2d<B> {
        let [_, out_channels] = self.conv.channels;
        let norm = FrozenBatchNorm2dConfig::new(out_channels)
            .with_eps(self.eps)
            .init(device);
        ConvNorm2d {
            conv: self.conv.init(device),
            norm,
        }
    }
}

/// [`Conv2d`] then [`FrozenBatchNorm2d`].
#[derive(Module, Debug)]
pub struct ConvNorm2d<B: Backend> {
    /// Conv layer.
    pub conv: Conv2d<B>,

    /// Frozen norm over the conv output.
    pub norm: FrozenBatchNorm2d<B>,
}

impl<B: Backend> ConvNorm2d<B> {
    /// Input channels.
    pub fn in_channels(&self) -> usize {
        let [_, per_group, _, _] = self.conv.weight.dims();
        per_group * self.conv.groups
    }

    /// Output channels.
    pub fn out_channels(&self) -> usize {
        self.conv.weight.dims()[0]
    }

    /// ``[height, width]`` stride.
    pub fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    /// Forward Pass.
    ///
    /// Assumes "same" padding, so each output side is the input side over
    /// the stride:
    /// ``[batch, in_channels, h*sh, w*sw] -> [batch, out_channels, h, w]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [sh, sw] = self.stride();
        let [batch, h, w] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_height" = "h" * "sh",
                "in_width" = "w" * "sw"
            ],
            &input,
            &["batch", "h", "w"],
            &[
                ("in_channels", self.in_channels()),
                ("sh", sh),
                ("sw", sw)
            ]
        );

        let out = self.norm.forward(self.conv.forward(input));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "h", "w"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("h", h),
                ("w", w)
            ]
        );
        out
    }
}

impl<B: Backend> EpsilonPatch for ConvNorm2d<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            norm: self.norm.overwrite_eps(eps),
            ..self
        }
    }
}
