//! # Faster R-CNN
//!
//! A `ResNet-50` FPN backbone, an RPN head and the box branch.
//! [`fasterrcnn_resnet50_fpn`] resolves a [`ModelRequest`] against
//! [`FASTERRCNN_RESNET50_FPN`] and assembles the model.

use crate::builder::assembly::{HeadHyperParams, ModelAssembler, TaskHeadConstructor};
use crate::builder::request::ModelRequest;
use crate::cache::weights::DiskCacheRetrieval;
use crate::errors::Result;
use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::detection::backbone::{ResNetBodyProvider, ResNetFpnWrapper};
use crate::models::detection::detection_io::PyTorchCheckpointLoader;
use crate::models::detection::fpn::BackboneWithFpn;
use crate::models::detection::options::RcnnOptions;
use crate::models::detection::pretrained::FASTERRCNN_RESNET50_FPN;
use crate::models::detection::roi_heads::{
    FastRcnnPredictor, FastRcnnPredictorConfig, TwoMlpHead, TwoMlpHeadConfig,
};
use crate::models::detection::rpn::{RpnHead, RpnHeadConfig, RpnLevelOutput};
use bimm_contracts::unpack_shape_contract;
use burn::module::{Ignored, Module};
use burn::prelude::{Backend, Tensor};
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Faster R-CNN modules.
#[derive(Module, Debug)]
pub struct FasterRcnn<B: Backend> {
    /// Feature pyramid backbone.
    pub backbone: BackboneWithFpn<B>,

    /// Region proposal head.
    pub rpn: RpnHead<B>,

    /// Box feature head.
    pub box_head: TwoMlpHead<B>,

    /// Box classifier / regressor.
    pub box_predictor: FastRcnnPredictor<B>,

    /// Options the heads were built with; drive [`FasterRcnn::preprocess`].
    pub options: Ignored<RcnnOptions>,
}

impl<B: Backend> FasterRcnn<B> {
    /// Number of classes, including background.
    pub fn num_classes(&self) -> usize {
        self.box_predictor.num_classes()
    }

    /// The options the model was built with.
    pub fn options(&self) -> &RcnnOptions {
        &self.options
    }

    /// Normalize and resize an image batch.
    ///
    /// # Arguments
    ///
    /// - `images`: a ``[batch, channels, height, width]`` tensor of values
    ///   in ``[0, 1]``; `channels` must match `image_mean`.
    ///
    /// # Returns
    ///
    /// The standardized batch, resized per [`RcnnOptions::resized_shape`].
    pub fn preprocess(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let options = self.options();
        let channels = options.image_mean.len();
        let [height, width] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &images,
            &["height", "width"],
            &[("channels", channels)]
        );

        let device = images.device();
        let stat = |values: &[f64]| {
            Tensor::<B, 1>::from_floats(values, &device).reshape([1, channels, 1, 1])
        };
        let images = (images - stat(&options.image_mean)) / stat(&options.image_std);

        interpolate(
            images,
            options.resized_shape([height, width]),
            InterpolateOptions::new(InterpolateMode::Bilinear),
        )
    }

    /// Pyramid features of a normalized image batch.
    pub fn features(
        &self,
        images: Tensor<B, 4>,
    ) -> Vec<Tensor<B, 4>> {
        self.backbone.forward(images)
    }

    /// RPN outputs for every pyramid level.
    pub fn propose(
        &self,
        features: &[Tensor<B, 4>],
    ) -> Vec<RpnLevelOutput<B>> {
        self.rpn.forward(features)
    }

    /// Class logits and box deltas of pooled box regions.
    ///
    /// # Arguments
    ///
    /// - `pooled`: a ``[regions, channels, size, size]`` tensor.
    pub fn classify(
        &self,
        pooled: Tensor<B, 4>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        self.box_predictor.forward(self.box_head.forward(pooled))
    }
}

impl<B: Backend> EpsilonPatch for FasterRcnn<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            backbone: self.backbone.overwrite_eps(eps),
            ..self
        }
    }
}

/// Builds the [`FasterRcnn`] heads over a [`BackboneWithFpn`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FasterRcnnHeadConstructor;

impl<B: Backend> TaskHeadConstructor<B, BackboneWithFpn<B>> for FasterRcnnHeadConstructor {
    type Model = FasterRcnn<B>;

    fn build(
        &self,
        extractor: BackboneWithFpn<B>,
        params: &HeadHyperParams<'_>,
        device: &B::Device,
    ) -> Self::Model {
        let options = params.options;
        let channels = extractor.out_channels();

        let box_head = TwoMlpHeadConfig::for_pooled(channels, options.box_roi_output_size)
            .with_representation_size(options.box_representation_size)
            .init(device);
        let box_predictor =
            FastRcnnPredictorConfig::new(options.box_representation_size, params.num_classes)
                .init(device);

        FasterRcnn {
            backbone: extractor,
            rpn: RpnHeadConfig::new(channels, options.num_anchors()).init(device),
            box_head,
            box_predictor,
            options: Ignored(options.clone()),
        }
    }
}

/// The default Faster R-CNN pipeline.
pub type FasterRcnnAssembler = ModelAssembler<
    ResNetBodyProvider,
    ResNetFpnWrapper,
    FasterRcnnHeadConstructor,
    PyTorchCheckpointLoader,
    DiskCacheRetrieval,
>;

/// Build a Faster R-CNN `ResNet-50` FPN model.
///
/// Without task weights the model has 91 classes.
///
/// # Errors
///
/// See [`ModelAssembler::assemble`].
pub fn fasterrcnn_resnet50_fpn<B: Backend>(
    request: ModelRequest,
    device: &B::Device,
) -> Result<FasterRcnn<B>> {
    FasterRcnnAssembler::default().assemble::<B>(&FASTERRCNN_RESNET50_FPN, &request, device)
}
