//! # Region Proposal Network Head
//!
//! [`RpnHead`] scores and regresses the anchors of every pyramid level with
//! a shared 3x3 conv followed by two 1x1 convs. Anchor generation and
//! proposal selection happen outside of this module.

use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;

/// ``N(0, 0.01)`` init used by the RPN convs.
pub static RPN_INITIALIZER: Initializer = Initializer::Normal {
    mean: 0.0,
    std: 0.01,
};

/// [`RpnHead`] Config.
#[derive(Config, Debug)]
pub struct RpnHeadConfig {
    /// Pyramid channels.
    pub in_channels: usize,

    /// Anchors per location.
    pub num_anchors: usize,
}

impl RpnHeadConfig {
    /// Initialize a [`RpnHead`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> RpnHead<B> {
        let c = self.in_channels;
        let a = self.num_anchors;
        let conv = |channels: [usize; 2], kernel: usize| {
            Conv2dConfig::new(channels, [kernel, kernel])
                .with_padding(PaddingConfig2d::Explicit(kernel / 2, kernel / 2))
                .with_initializer(RPN_INITIALIZER.clone())
                .init(device)
        };
        RpnHead {
            conv: conv([c, c], 3),
            cls_logits: conv([c, a], 1),
            bbox_pred: conv([c, 4 * a], 1),
        }
    }
}

/// Per-level RPN output.
#[derive(Debug, Clone)]
pub struct RpnLevelOutput<B: Backend> {
    /// ``[batch, anchors, height, width]`` objectness logits.
    pub objectness: Tensor<B, 4>,

    /// ``[batch, anchors * 4, height, width]`` box deltas.
    pub bbox_deltas: Tensor<B, 4>,
}

/// RPN head.
#[derive(Module, Debug)]
pub struct RpnHead<B: Backend> {
    /// Shared 3x3 conv.
    pub conv: Conv2d<B>,

    /// Objectness logits.
    pub cls_logits: Conv2d<B>,

    /// Box deltas.
    pub bbox_pred: Conv2d<B>,
}

impl<B: Backend> RpnHead<B> {
    /// Input channels.
    pub fn in_channels(&self) -> usize {
        self.conv.weight.dims()[1]
    }

    /// Anchors per location.
    pub fn num_anchors(&self) -> usize {
        self.cls_logits.weight.dims()[0]
    }

    /// Forward one pyramid level.
    pub fn forward_level(
        &self,
        feature: Tensor<B, 4>,
    ) -> RpnLevelOutput<B> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &feature,
            &["batch", "height", "width"],
            &[("channels", self.in_channels())]
        );

        let t = relu(self.conv.forward(feature));
        let objectness = self.cls_logits.forward(t.clone());
        let bbox_deltas = self.bbox_pred.forward(t);

        debug_assert_eq!(objectness.dims(), [batch, self.num_anchors(), height, width]);

        RpnLevelOutput {
            objectness,
            bbox_deltas,
        }
    }

    /// Forward every pyramid level.
    pub fn forward(
        &self,
        features: &[Tensor<B, 4>],
    ) -> Vec<RpnLevelOutput<B>> {
        features
            .iter()
            .map(|f| self.forward_level(f.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_rpn_head() {
        type B = NdArray<f32>;
        let device = Default::default();

        let head: RpnHead<B> = RpnHeadConfig::new(8, 3).init(&device);
        assert_eq!(head.in_channels(), 8);
        assert_eq!(head.num_anchors(), 3);

        let outputs = head.forward(&[
            Tensor::ones([2, 8, 8, 8], &device),
            Tensor::ones([2, 8, 4, 4], &device),
        ]);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].objectness.dims(), [2, 3, 8, 8]);
        assert_eq!(outputs[1].bbox_deltas.dims(), [2, 12, 4, 4]);
    }
}
