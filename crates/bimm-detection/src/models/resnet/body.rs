//! # `ResNet` Feature Body
//!
//! [`ResNetBody`] is a `ResNet` without its classifier: the stem and the four
//! bottleneck stages, returning the feature map of every stage.
//!
//! Stage freezing follows the fine-tuning convention: with `k` trainable
//! layers, the trainable stages are the first `k` of [`FREEZE_ORDER`]; the
//! parameters of every other stage are marked `no_grad`.

use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig};
use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig};
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

/// A freezable stage of a [`ResNetBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetStage {
    /// The input conv/norm.
    Stem,

    /// Stage 1, stride 4.
    Layer1,

    /// Stage 2, stride 8.
    Layer2,

    /// Stage 3, stride 16.
    Layer3,

    /// Stage 4, stride 32.
    Layer4,
}

impl ResNetStage {
    /// The checkpoint name of the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stem => "conv1",
            Self::Layer1 => "layer1",
            Self::Layer2 => "layer2",
            Self::Layer3 => "layer3",
            Self::Layer4 => "layer4",
        }
    }
}

/// Stages in the order they become trainable.
pub const FREEZE_ORDER: [ResNetStage; 5] = [
    ResNetStage::Layer4,
    ResNetStage::Layer3,
    ResNetStage::Layer2,
    ResNetStage::Layer1,
    ResNetStage::Stem,
];

/// The maximum number of trainable stages.
pub const MAX_TRAINABLE_STAGES: usize = FREEZE_ORDER.len();

/// The trainable stages for a trainable layer count.
///
/// Counts above [`MAX_TRAINABLE_STAGES`] saturate.
pub fn trainable_stages(trainable_layers: usize) -> &'static [ResNetStage] {
    &FREEZE_ORDER[..trainable_layers.min(MAX_TRAINABLE_STAGES)]
}

/// [`ResNetBody`] Config.
#[derive(Config, Debug)]
pub struct ResNetBodyConfig {
    /// Blocks per stage.
    pub layers: [usize; 4],

    /// Input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Stem output channels; also the stage 1 bottleneck width.
    #[config(default = 64)]
    pub stem_width: usize,

    /// The frozen norm `eps`.
    #[config(default = 1e-5)]
    pub eps: f64,
}

impl ResNetBodyConfig {
    /// `ResNet-50`: ``[3, 4, 6, 3]`` bottleneck blocks.
    pub fn resnet50() -> Self {
        Self::new([3, 4, 6, 3])
    }

    /// Output channels of each stage.
    pub fn out_channels(&self) -> [usize; 4] {
        let base = self.stem_width * 4;
        [base, base * 2, base * 4, base * 8]
    }

    /// Initialize a [`ResNetBody`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetBody<B> {
        let stem: ConvNorm2dConfig =
            Conv2dConfig::new([self.in_channels, self.stem_width], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
                .with_bias(false)
                .into();

        let mut in_planes = self.stem_width;
        let [layer1, layer2, layer3, layer4] = [0, 1, 2, 3].map(|idx: usize| {
            let stride = if idx == 0 { 1 } else { 2 };
            let config = LayerBlockConfig::build(
                self.layers[idx],
                in_planes,
                self.stem_width << idx,
                stride,
                self.eps,
            );
            in_planes = config.out_planes();
            config.init(device)
        });

        ResNetBody {
            stem: stem.with_eps(self.eps).init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            layer1,
            layer2,
            layer3,
            layer4,
        }
    }
}

/// `ResNet` stem and stages.
#[derive(Module, Debug)]
pub struct ResNetBody<B: Backend> {
    /// Input 7x7 conv/norm.
    pub stem: ConvNorm2d<B>,

    /// Stem max pool.
    pub pool: MaxPool2d,

    /// Stage 1.
    pub layer1: LayerBlock<B>,

    /// Stage 2.
    pub layer2: LayerBlock<B>,

    /// Stage 3.
    pub layer3: LayerBlock<B>,

    /// Stage 4.
    pub layer4: LayerBlock<B>,
}

impl<B: Backend> ResNetBody<B> {
    /// Output channels of each stage.
    pub fn out_channels(&self) -> [usize; 4] {
        [
            self.layer1.out_planes(),
            self.layer2.out_planes(),
            self.layer3.out_planes(),
            self.layer4.out_planes(),
        ]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, channels, height=h32*32, width=w32*32]`` tensor.
    ///
    /// # Returns
    ///
    /// The stage feature maps, at strides 4, 8, 16 and 32.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> [Tensor<B, 4>; 4] {
        assert_shape_contract_periodically!(
            [
                "batch",
                "channels",
                "height" = "h32" * "stride",
                "width" = "w32" * "stride"
            ],
            &input,
            &[("stride", 32)]
        );

        let x = relu(self.stem.forward(input));
        let x = self.pool.forward(x);

        let c2 = self.layer1.forward(x);
        let c3 = self.layer2.forward(c2.clone());
        let c4 = self.layer3.forward(c3.clone());
        let c5 = self.layer4.forward(c4.clone());

        [c2, c3, c4, c5]
    }

    /// Freeze every stage outside of the first `trainable_layers` of
    /// [`FREEZE_ORDER`].
    pub fn freeze(
        self,
        trainable_layers: usize,
    ) -> Self {
        let trainable = trainable_stages(trainable_layers);
        let is_frozen = |stage: ResNetStage| !trainable.contains(&stage);

        fn maybe_freeze<B: Backend, M: Module<B>>(
            module: M,
            frozen: bool,
        ) -> M {
            if frozen { module.no_grad() } else { module }
        }

        Self {
            stem: maybe_freeze(self.stem, is_frozen(ResNetStage::Stem)),
            pool: self.pool,
            layer1: maybe_freeze(self.layer1, is_frozen(ResNetStage::Layer1)),
            layer2: maybe_freeze(self.layer2, is_frozen(ResNetStage::Layer2)),
            layer3: maybe_freeze(self.layer3, is_frozen(ResNetStage::Layer3)),
            layer4: maybe_freeze(self.layer4, is_frozen(ResNetStage::Layer4)),
        }
    }
}

impl<B: Backend> EpsilonPatch for ResNetBody<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            stem: self.stem.overwrite_eps(eps),
            pool: self.pool,
            layer1: self.layer1.overwrite_eps(eps),
            layer2: self.layer2.overwrite_eps(eps),
            layer3: self.layer3.overwrite_eps(eps),
            layer4: self.layer4.overwrite_eps(eps),
        }
    }
}
