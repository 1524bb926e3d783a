//! # Bottleneck Residual Unit
//!
//! Three conv/norm stages (``1x1 -> 3x3/stride -> 1x1``) whose output is
//! summed with the identity branch. The identity is projected by a
//! [`ConvDownsample`] whenever the stride or the channel count changes.

use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig};
use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::resnet::downsample::{ConvDownsample, ConvDownsampleConfig};
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Config, Module, Tensor};
use burn::tensor::activation::relu;

/// [`BottleneckBlock`] Config.
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// Input channels.
    pub in_planes: usize,

    /// Inner width; ``out_planes = planes * expansion_factor``.
    pub planes: usize,

    /// Channel expansion of the last stage.
    #[config(default = 4)]
    pub expansion_factor: usize,

    /// Stride of the middle 3x3 conv.
    #[config(default = 1)]
    pub stride: usize,

    /// Frozen norm `eps`.
    #[config(default = 1e-5)]
    pub eps: f64,
}

impl BottleneckBlockConfig {
    /// Output channels.
    pub fn out_planes(&self) -> usize {
        self.planes * self.expansion_factor
    }

    /// Check if the identity branch must be projected.
    pub fn needs_projection(&self) -> bool {
        self.stride != 1 || self.in_planes != self.out_planes()
    }

    fn stage(
        &self,
        conv: Conv2dConfig,
    ) -> ConvNorm2dConfig {
        let conv = conv
            .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
            .with_bias(false);
        ConvNorm2dConfig::new(conv).with_eps(self.eps)
    }

    /// Initialize a [`BottleneckBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        let [c_in, mid, c_out] = [self.in_planes, self.planes, self.out_planes()];

        let reduce = self.stage(Conv2dConfig::new([c_in, mid], [1, 1]));
        let spatial = self.stage(
            Conv2dConfig::new([mid, mid], [3, 3])
                .with_stride([self.stride; 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1)),
        );
        let expand = self.stage(Conv2dConfig::new([mid, c_out], [1, 1]));

        let downsample = self.needs_projection().then(|| {
            ConvDownsampleConfig::new(c_in, c_out)
                .with_stride(self.stride)
                .with_eps(self.eps)
                .init(device)
        });

        BottleneckBlock {
            expansion_factor: self.expansion_factor,
            downsample,
            conv1: reduce.init(device),
            conv2: spatial.init(device),
            conv3: expand.init(device),
        }
    }
}

/// Bottleneck residual unit with frozen norms.
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// Channel expansion of `conv3` over `conv2`.
    pub expansion_factor: usize,

    /// Identity projection; absent when shapes already agree.
    pub downsample: Option<ConvDownsample<B>>,

    /// 1x1 reduction.
    pub conv1: ConvNorm2d<B>,

    /// Strided 3x3.
    pub conv2: ConvNorm2d<B>,

    /// 1x1 expansion.
    pub conv3: ConvNorm2d<B>,
}

impl<B: Backend> BottleneckBlock<B> {
    /// Input channels.
    pub fn in_planes(&self) -> usize {
        self.conv1.in_channels()
    }

    /// Output channels.
    pub fn out_planes(&self) -> usize {
        self.conv3.out_channels()
    }

    /// Stride of the middle conv.
    pub fn stride(&self) -> usize {
        self.conv2.stride()[0]
    }

    /// Forward Pass.
    ///
    /// ``[batch, in_planes, h*stride, w*stride] -> [batch, out_planes, h, w]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, h, w] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_height" = "h" * "stride",
                "in_width" = "w" * "stride"
            ],
            &input,
            &["batch", "h", "w"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())]
        );

        let shortcut = self
            .downsample
            .as_ref()
            .map_or_else(|| input.clone(), |proj| proj.forward(input.clone()));

        let residual = [&self.conv1, &self.conv2]
            .into_iter()
            .fold(input, |x, stage| relu(stage.forward(x)));
        let out = relu(self.conv3.forward(residual) + shortcut);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "h", "w"],
            &out,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("h", h),
                ("w", w)
            ]
        );
        out
    }
}

impl<B: Backend> EpsilonPatch for BottleneckBlock<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        let Self {
            expansion_factor,
            downsample,
            conv1,
            conv2,
            conv3,
        } = self;
        Self {
            expansion_factor,
            downsample: downsample.overwrite_eps(eps),
            conv1: conv1.overwrite_eps(eps),
            conv2: conv2.overwrite_eps(eps),
            conv3: conv3.overwrite_eps(eps),
        }
    }
}
