//! # Keypoint R-CNN
//!
//! [`KeypointRcnn`] extends a [`FasterRcnn`] detector with a keypoint
//! branch: a stack of 3x3 convs over pooled person regions, and a heatmap
//! predictor.
//!
//! [`keypointrcnn_resnet50_fpn`] resolves a [`ModelRequest`] against
//! [`KEYPOINTRCNN_RESNET50_FPN`] and assembles the model.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bimm_detection::builder::request::ModelRequest;
//! use bimm_detection::models::detection::keypoint_rcnn::keypointrcnn_resnet50_fpn;
//! use burn::backend::NdArray;
//!
//! let device = Default::default();
//! let model = keypointrcnn_resnet50_fpn::<NdArray>(
//!     ModelRequest::new().with_weights("default"),
//!     &device,
//! )
//! .unwrap();
//! assert_eq!(model.num_keypoints(), 17);
//! ```

use crate::builder::assembly::{HeadHyperParams, ModelAssembler, TaskHeadConstructor};
use crate::builder::request::ModelRequest;
use crate::cache::weights::DiskCacheRetrieval;
use crate::errors::Result;
use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::detection::backbone::{ResNetBodyProvider, ResNetFpnWrapper};
use crate::models::detection::detection_io::PyTorchCheckpointLoader;
use crate::models::detection::faster_rcnn::{FasterRcnn, FasterRcnnHeadConstructor};
use crate::models::detection::fpn::BackboneWithFpn;
use crate::models::detection::pretrained::KEYPOINTRCNN_RESNET50_FPN;
use crate::models::detection::roi_heads::{
    KeypointRcnnHeads, KeypointRcnnHeadsConfig, KeypointRcnnPredictor,
    KeypointRcnnPredictorConfig,
};
use crate::weights::meta::COCO_PERSON_KEYPOINT_NAMES;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Keypoint R-CNN modules.
#[derive(Module, Debug)]
pub struct KeypointRcnn<B: Backend> {
    /// Backbone, RPN and box branch.
    pub detector: FasterRcnn<B>,

    /// Keypoint feature head.
    pub keypoint_head: KeypointRcnnHeads<B>,

    /// Keypoint heatmap predictor.
    pub keypoint_predictor: KeypointRcnnPredictor<B>,
}

impl<B: Backend> KeypointRcnn<B> {
    /// Number of classes, including background.
    pub fn num_classes(&self) -> usize {
        self.detector.num_classes()
    }

    /// Number of keypoints.
    pub fn num_keypoints(&self) -> usize {
        self.keypoint_predictor.num_keypoints()
    }

    /// Keypoint heatmaps of pooled keypoint regions.
    ///
    /// # Arguments
    ///
    /// - `pooled`: a ``[regions, channels, size, size]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[regions, num_keypoints, size * 4, size * 4]`` tensor.
    pub fn keypoint_heatmaps(
        &self,
        pooled: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.keypoint_predictor
            .forward(self.keypoint_head.forward(pooled))
    }
}

impl<B: Backend> EpsilonPatch for KeypointRcnn<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            detector: self.detector.overwrite_eps(eps),
            ..self
        }
    }
}

/// Builds the [`KeypointRcnn`] heads over a [`BackboneWithFpn`].
///
/// Without a keypoint count, builds the COCO person keypoint predictor.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeypointRcnnHeadConstructor;

impl<B: Backend> TaskHeadConstructor<B, BackboneWithFpn<B>> for KeypointRcnnHeadConstructor {
    type Model = KeypointRcnn<B>;

    fn build(
        &self,
        extractor: BackboneWithFpn<B>,
        params: &HeadHyperParams<'_>,
        device: &B::Device,
    ) -> Self::Model {
        let channels = extractor.out_channels();
        let layers = params.options.keypoint_head_layers.clone();
        let head_channels = layers.last().copied().unwrap_or(channels);
        let num_keypoints = params
            .num_keypoints
            .unwrap_or(COCO_PERSON_KEYPOINT_NAMES.len());

        KeypointRcnn {
            detector: FasterRcnnHeadConstructor.build(extractor, params, device),
            keypoint_head: KeypointRcnnHeadsConfig::new(channels, layers).init(device),
            keypoint_predictor: KeypointRcnnPredictorConfig::new(head_channels, num_keypoints)
                .init(device),
        }
    }
}

/// The default Keypoint R-CNN pipeline.
pub type KeypointRcnnAssembler = ModelAssembler<
    ResNetBodyProvider,
    ResNetFpnWrapper,
    KeypointRcnnHeadConstructor,
    PyTorchCheckpointLoader,
    DiskCacheRetrieval,
>;

/// Build a Keypoint R-CNN `ResNet-50` FPN model.
///
/// Without task weights the model has 2 classes and 17 keypoints.
///
/// # Errors
///
/// See [`ModelAssembler::assemble`].
pub fn keypointrcnn_resnet50_fpn<B: Backend>(
    request: ModelRequest,
    device: &B::Device,
) -> Result<KeypointRcnn<B>> {
    KeypointRcnnAssembler::default().assemble::<B>(&KEYPOINTRCNN_RESNET50_FPN, &request, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::assembly::ParameterLoader;
    use crate::cache::weights::RetrievalService;
    use crate::errors::ModelBuildError;
    use crate::models::detection::faster_rcnn::tests::{tiny_backbone, tiny_options};
    use crate::models::detection::pretrained::{
        KEYPOINTRCNN_RESNET50_FPN_COCO_LEGACY, KEYPOINTRCNN_RESNET50_FPN_COCO_V1,
    };
    use crate::models::resnet::body::ResNetBodyConfig;
    use crate::weights::Weights;
    use burn::backend::{Autodiff, NdArray};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    type B = Autodiff<NdArray<f32>>;

    #[derive(Debug, Default)]
    struct LocalRetrieval {
        fetched: RefCell<Vec<String>>,
    }

    impl RetrievalService for LocalRetrieval {
        fn fetch(
            &self,
            weights: &Weights,
            _progress: bool,
        ) -> anyhow::Result<PathBuf> {
            self.fetched.borrow_mut().push(weights.qualified_name());
            Ok(PathBuf::from("/weights").join(weights.name))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingLoader {
        loaded: RefCell<Vec<PathBuf>>,
    }

    impl ParameterLoader<B, KeypointRcnn<B>> for RecordingLoader {
        fn load(
            &self,
            model: KeypointRcnn<B>,
            payload: &Path,
            _device: &<B as Backend>::Device,
        ) -> anyhow::Result<KeypointRcnn<B>> {
            self.loaded.borrow_mut().push(payload.to_path_buf());
            Ok(model)
        }
    }

    type TestAssembler = ModelAssembler<
        ResNetBodyProvider,
        ResNetFpnWrapper,
        KeypointRcnnHeadConstructor,
        RecordingLoader,
        LocalRetrieval,
    >;

    fn tiny_assembler() -> TestAssembler {
        ModelAssembler {
            backbone: ResNetBodyProvider {
                config: ResNetBodyConfig::new([1, 1, 1, 1]).with_stem_width(2),
            },
            fpn: ResNetFpnWrapper { out_channels: 8 },
            head: KeypointRcnnHeadConstructor,
            loader: RecordingLoader::default(),
            retrieval: LocalRetrieval::default(),
        }
    }

    fn build(request: ModelRequest) -> Result<(KeypointRcnn<B>, TestAssembler)> {
        let assembler = tiny_assembler();
        let model = assembler.assemble::<B>(
            &KEYPOINTRCNN_RESNET50_FPN,
            &request.with_options(tiny_options()),
            &Default::default(),
        )?;
        Ok((model, assembler))
    }

    #[test]
    fn test_head_constructor() {
        type B = NdArray<f32>;
        let device = Default::default();
        let options = tiny_options();

        let model: KeypointRcnn<B> = KeypointRcnnHeadConstructor.build(
            tiny_backbone::<B>(3, &device),
            &HeadHyperParams {
                num_classes: 2,
                num_keypoints: None,
                options: &options,
            },
            &device,
        );
        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.num_keypoints(), 17);
        assert_eq!(model.keypoint_head.convs.len(), 2);
        assert_eq!(model.keypoint_head.convs[0].weight.dims(), [8, 8, 3, 3]);

        let heatmaps = model.keypoint_heatmaps(Tensor::ones([3, 8, 14, 14], &device));
        assert_eq!(heatmaps.dims(), [3, 17, 56, 56]);
    }

    #[test]
    fn test_default_weights() {
        let (model, assembler) = build(ModelRequest::new().with_weights("default")).unwrap();

        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.num_keypoints(), 17);
        assert_eq!(model.detector.backbone.trainable_layers, 3);
        assert_eq!(model.detector.backbone.body.stem.norm.eps, 0.0);
        assert_eq!(
            *assembler.retrieval.fetched.borrow(),
            vec![KEYPOINTRCNN_RESNET50_FPN_COCO_V1.qualified_name()]
        );
        assert_eq!(
            *assembler.loader.loaded.borrow(),
            vec![PathBuf::from("/weights/Coco_V1")]
        );

        let body = &model.detector.backbone.body;
        assert!(!body.stem.conv.weight.is_require_grad());
        assert!(!body.layer1.blocks[0].conv1.conv.weight.is_require_grad());
        assert!(body.layer2.blocks[0].conv1.conv.weight.is_require_grad());
        assert!(body.layer4.blocks[0].conv1.conv.weight.is_require_grad());
        assert!(!body.layer4.blocks[0].conv1.norm.weight.is_require_grad());
    }

    #[test]
    fn test_legacy_weights_keep_eps() {
        let (model, assembler) = build(ModelRequest::new().with_pretrained("legacy")).unwrap();

        assert_eq!(model.detector.backbone.body.stem.norm.eps, 1e-5);
        assert_eq!(
            *assembler.retrieval.fetched.borrow(),
            vec![KEYPOINTRCNN_RESNET50_FPN_COCO_LEGACY.qualified_name()]
        );
    }

    #[test]
    fn test_no_weights() {
        let (model, assembler) = build(ModelRequest::new()).unwrap();

        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.num_keypoints(), 17);
        assert_eq!(model.detector.backbone.trainable_layers, 5);
        assert!(
            model
                .detector
                .backbone
                .body
                .stem
                .conv
                .weight
                .is_require_grad()
        );
        assert!(assembler.retrieval.fetched.borrow().is_empty());
        assert!(assembler.loader.loaded.borrow().is_empty());

        let device = Default::default();
        let features = model
            .detector
            .features(Tensor::ones([1, 3, 64, 64], &device));
        assert_eq!(features.len(), 5);
        assert_eq!(features[0].dims(), [1, 8, 16, 16]);

        let heatmaps = model.keypoint_heatmaps(Tensor::ones([2, 8, 4, 4], &device));
        assert_eq!(heatmaps.dims(), [2, 17, 16, 16]);
    }

    #[test]
    fn test_request_options_reach_model() {
        let (model, _) = build(ModelRequest::new()).unwrap();
        let options = model.detector.options();
        assert_eq!(options.keypoint_head_layers, vec![8, 8]);
        assert_eq!(options.box_roi_output_size, 2);
        assert_eq!(options.max_size, 48);

        let device = Default::default();
        let images = model.detector.preprocess(Tensor::ones([1, 3, 16, 24], &device));
        assert_eq!(images.dims(), [1, 3, 32, 48]);
    }

    #[test]
    fn test_custom_heads() {
        let (model, _) = build(
            ModelRequest::new()
                .with_num_classes(3)
                .with_num_keypoints(5),
        )
        .unwrap();

        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.num_keypoints(), 5);
    }

    #[test]
    fn test_conflicting_override() {
        let err = build(
            ModelRequest::new()
                .with_weights(&KEYPOINTRCNN_RESNET50_FPN_COCO_V1)
                .with_num_keypoints(5),
        )
        .unwrap_err();
        match err {
            ModelBuildError::OverrideConflict {
                param,
                expected,
                actual,
            } => {
                assert_eq!(param, "num_keypoints");
                assert_eq!(expected, 17);
                assert_eq!(actual, 5);
            }
            err => panic!("unexpected error: {err}"),
        }
    }
}
