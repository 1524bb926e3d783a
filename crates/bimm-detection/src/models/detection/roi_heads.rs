//! # ROI Heads
//!
//! Per-region heads, applied to pooled region features:
//!
//! * [`TwoMlpHead`] and [`FastRcnnPredictor`] - the box branch.
//! * [`KeypointRcnnHeads`] and [`KeypointRcnnPredictor`] - the keypoint branch.
//!
//! ROI pooling, box decoding and post-processing happen outside of these
//! modules.

use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::relu;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Kaiming normal initializer over `fan_in`.
///
/// [`ConvTranspose2d`] only reports `fan_in` to its initializer.
pub static KEYPOINT_LOGITS_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: false,
};

/// [`TwoMlpHead`] Config.
#[derive(Config, Debug)]
pub struct TwoMlpHeadConfig {
    /// Flattened pooled feature size.
    pub in_channels: usize,

    /// Hidden and output size.
    #[config(default = 1024)]
    pub representation_size: usize,
}

impl TwoMlpHeadConfig {
    /// Config for ``[channels, resolution, resolution]`` pooled features.
    pub fn for_pooled(
        channels: usize,
        resolution: usize,
    ) -> Self {
        Self::new(channels * resolution * resolution)
    }

    /// Initialize a [`TwoMlpHead`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> TwoMlpHead<B> {
        TwoMlpHead {
            fc6: LinearConfig::new(self.in_channels, self.representation_size).init(device),
            fc7: LinearConfig::new(self.representation_size, self.representation_size)
                .init(device),
        }
    }
}

/// Two fully connected layers over flattened region features.
#[derive(Module, Debug)]
pub struct TwoMlpHead<B: Backend> {
    /// First layer.
    pub fc6: Linear<B>,

    /// Second layer.
    pub fc7: Linear<B>,
}

impl<B: Backend> TwoMlpHead<B> {
    /// Output size.
    pub fn representation_size(&self) -> usize {
        self.fc7.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `pooled`: a ``[regions, channels, height, width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[regions, representation_size]`` tensor.
    pub fn forward(
        &self,
        pooled: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x: Tensor<B, 2> = pooled.flatten(1, 3);
        let x = relu(self.fc6.forward(x));
        relu(self.fc7.forward(x))
    }
}

/// [`FastRcnnPredictor`] Config.
#[derive(Config, Debug)]
pub struct FastRcnnPredictorConfig {
    /// Input representation size.
    pub in_channels: usize,

    /// Number of classes, including background.
    pub num_classes: usize,
}

impl FastRcnnPredictorConfig {
    /// Initialize a [`FastRcnnPredictor`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FastRcnnPredictor<B> {
        FastRcnnPredictor {
            cls_score: LinearConfig::new(self.in_channels, self.num_classes).init(device),
            bbox_pred: LinearConfig::new(self.in_channels, self.num_classes * 4).init(device),
        }
    }
}

/// Class scores and per-class box deltas.
#[derive(Module, Debug)]
pub struct FastRcnnPredictor<B: Backend> {
    /// Class logits.
    pub cls_score: Linear<B>,

    /// Per-class box deltas.
    pub bbox_pred: Linear<B>,
}

impl<B: Backend> FastRcnnPredictor<B> {
    /// Number of classes, including background.
    pub fn num_classes(&self) -> usize {
        self.cls_score.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Returns
    ///
    /// ``([regions, num_classes], [regions, num_classes * 4])``
    pub fn forward(
        &self,
        x: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (self.cls_score.forward(x.clone()), self.bbox_pred.forward(x))
    }
}

/// [`KeypointRcnnHeads`] Config.
#[derive(Config, Debug)]
pub struct KeypointRcnnHeadsConfig {
    /// Pooled feature channels.
    pub in_channels: usize,

    /// Output channels of each 3x3 conv.
    pub layers: Vec<usize>,
}

impl KeypointRcnnHeadsConfig {
    /// Initialize a [`KeypointRcnnHeads`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> KeypointRcnnHeads<B> {
        let mut in_channels = self.in_channels;
        KeypointRcnnHeads {
            convs: self
                .layers
                .iter()
                .map(|&out_channels| {
                    let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
                        .init(device);
                    in_channels = out_channels;
                    conv
                })
                .collect(),
        }
    }
}

/// Stack of 3x3 conv / relu layers over pooled keypoint regions.
#[derive(Module, Debug)]
pub struct KeypointRcnnHeads<B: Backend> {
    /// The conv layers.
    pub convs: Vec<Conv2d<B>>,
}

impl<B: Backend> KeypointRcnnHeads<B> {
    /// Output channels.
    pub fn out_channels(&self) -> usize {
        self.convs.last().map_or(0, |conv| conv.weight.dims()[0])
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        pooled: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.convs
            .iter()
            .fold(pooled, |x, conv| relu(conv.forward(x)))
    }
}

/// [`KeypointRcnnPredictor`] Config.
#[derive(Config, Debug)]
pub struct KeypointRcnnPredictorConfig {
    /// Input channels.
    pub in_channels: usize,

    /// Number of keypoints.
    pub num_keypoints: usize,
}

impl KeypointRcnnPredictorConfig {
    /// Initialize a [`KeypointRcnnPredictor`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> KeypointRcnnPredictor<B> {
        KeypointRcnnPredictor {
            kps_score_lowres: ConvTranspose2dConfig::new(
                [self.in_channels, self.num_keypoints],
                [4, 4],
            )
            .with_stride([2, 2])
            .with_padding([1, 1])
            .with_initializer(KEYPOINT_LOGITS_INITIALIZER.clone())
            .init(device),
        }
    }
}

/// Keypoint heatmap predictor.
///
/// A stride-2 transposed conv followed by a 2x bilinear upsample; heatmaps
/// are 4x the pooled resolution.
#[derive(Module, Debug)]
pub struct KeypointRcnnPredictor<B: Backend> {
    /// Low resolution keypoint logits.
    pub kps_score_lowres: ConvTranspose2d<B>,
}

impl<B: Backend> KeypointRcnnPredictor<B> {
    /// Number of keypoints.
    pub fn num_keypoints(&self) -> usize {
        self.kps_score_lowres.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `x`: a ``[regions, in_channels, height, width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[regions, num_keypoints, height * 4, width * 4]`` tensor.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [regions, height, width] = unpack_shape_contract!(
            ["regions", "in_channels", "height", "width"],
            &x,
            &["regions", "height", "width"],
            &[("in_channels", self.kps_score_lowres.weight.dims()[0])]
        );

        let x = self.kps_score_lowres.forward(x);
        let x = interpolate(
            x,
            [height * 4, width * 4],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        );

        assert_shape_contract_periodically!(
            ["regions", "num_keypoints", "out_height", "out_width"],
            &x,
            &[
                ("regions", regions),
                ("num_keypoints", self.num_keypoints()),
                ("out_height", height * 4),
                ("out_width", width * 4)
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_box_branch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = TwoMlpHeadConfig::for_pooled(4, 7).with_representation_size(16);
        assert_eq!(config.in_channels, 196);

        let head: TwoMlpHead<B> = config.init(&device);
        let predictor: FastRcnnPredictor<B> = FastRcnnPredictorConfig::new(16, 3).init(&device);
        assert_eq!(head.representation_size(), 16);
        assert_eq!(predictor.num_classes(), 3);

        let (scores, deltas) = predictor.forward(head.forward(Tensor::ones([5, 4, 7, 7], &device)));
        assert_eq!(scores.dims(), [5, 3]);
        assert_eq!(deltas.dims(), [5, 12]);
    }

    #[test]
    fn test_keypoint_branch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let head: KeypointRcnnHeads<B> =
            KeypointRcnnHeadsConfig::new(4, vec![8; 3]).init(&device);
        assert_eq!(head.convs.len(), 3);
        assert_eq!(head.out_channels(), 8);
        assert_eq!(head.convs[0].weight.dims(), [8, 4, 3, 3]);

        let predictor: KeypointRcnnPredictor<B> =
            KeypointRcnnPredictorConfig::new(8, 17).init(&device);
        assert_eq!(predictor.num_keypoints(), 17);

        let heatmaps = predictor.forward(head.forward(Tensor::ones([2, 4, 14, 14], &device)));
        assert_eq!(heatmaps.dims(), [2, 17, 56, 56]);
    }

    #[test]
    fn test_fresh_keypoint_predictor_weights() {
        type B = NdArray<f32>;
        let device = Default::default();

        let predictor: KeypointRcnnPredictor<B> =
            KeypointRcnnPredictorConfig::new(8, 5).init(&device);
        let weight = predictor.kps_score_lowres.weight.val();
        assert_eq!(weight.dims(), [8, 5, 4, 4]);

        let values = weight.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
        assert!(values.iter().any(|v| *v != 0.0));

        let cloned = predictor.clone();
        assert_eq!(cloned.num_keypoints(), 5);

        let heatmaps = cloned.forward(Tensor::ones([1, 8, 3, 3], &device));
        assert_eq!(heatmaps.dims(), [1, 5, 12, 12]);
    }
}
