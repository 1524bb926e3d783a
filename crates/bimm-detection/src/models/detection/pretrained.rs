//! # Pretrained Detection Weights
//!
//! ``torchvision`` COCO weights for the `ResNet-50` FPN detectors, and the
//! [`DetectionModelSpec`]s of their builders.
//!
//! Only the `ResNet-50` FPN family is registered. The `MobileNetV3-Large`
//! FPN Faster R-CNN variants (and their 320px counterparts) need a second
//! backbone family and are not provided.

use crate::builder::legacy::LegacyVariant;
use crate::builder::resolve::DetectionModelSpec;
use crate::models::resnet::pretrained::{RESNET50_IMAGENET1K_V1, RESNET50_WEIGHTS};
use crate::weights::meta::{COCO_CATEGORIES, COCO_PERSON_CATEGORIES, COCO_PERSON_KEYPOINT_NAMES};
use crate::weights::{Categories, EvalTransform, Weights, WeightsMeta, WeightsRegistry};

/// Keypoint R-CNN, first release.
///
/// Selected by ``pretrained = "legacy"``.
pub static KEYPOINTRCNN_RESNET50_FPN_COCO_LEGACY: Weights = Weights {
    name: "Coco_Legacy",
    registry: "KeypointRCNN_ResNet50_FPN_Weights",
    url: "https://download.pytorch.org/models/keypointrcnn_resnet50_fpn_coco-9f466800.pth",
    transforms: EvalTransform::CocoEval,
    meta: WeightsMeta {
        categories: Categories::Named(COCO_PERSON_CATEGORIES),
        keypoint_names: Some(COCO_PERSON_KEYPOINT_NAMES),
        recipe: Some("https://github.com/pytorch/vision/issues/1606"),
        metrics: &[("box_map", 50.6), ("kp_map", 61.1)],
    },
};

/// Keypoint R-CNN, current release.
pub static KEYPOINTRCNN_RESNET50_FPN_COCO_V1: Weights = Weights {
    name: "Coco_V1",
    registry: "KeypointRCNN_ResNet50_FPN_Weights",
    url: "https://download.pytorch.org/models/keypointrcnn_resnet50_fpn_coco-fc266e95.pth",
    transforms: EvalTransform::CocoEval,
    meta: WeightsMeta {
        categories: Categories::Named(COCO_PERSON_CATEGORIES),
        keypoint_names: Some(COCO_PERSON_KEYPOINT_NAMES),
        recipe: Some(
            "https://github.com/pytorch/vision/tree/main/references/detection#keypoint-r-cnn",
        ),
        metrics: &[("box_map", 54.6), ("kp_map", 65.0)],
    },
};

/// Keypoint R-CNN weights.
pub static KEYPOINTRCNN_RESNET50_FPN_WEIGHTS: WeightsRegistry = WeightsRegistry {
    name: "KeypointRCNN_ResNet50_FPN_Weights",
    entries: &[
        &KEYPOINTRCNN_RESNET50_FPN_COCO_LEGACY,
        &KEYPOINTRCNN_RESNET50_FPN_COCO_V1,
    ],
    default: &KEYPOINTRCNN_RESNET50_FPN_COCO_V1,
};

/// Faster R-CNN, COCO.
pub static FASTERRCNN_RESNET50_FPN_COCO_V1: Weights = Weights {
    name: "Coco_V1",
    registry: "FasterRCNN_ResNet50_FPN_Weights",
    url: "https://download.pytorch.org/models/fasterrcnn_resnet50_fpn_coco-258fb6c6.pth",
    transforms: EvalTransform::CocoEval,
    meta: WeightsMeta {
        categories: Categories::Named(COCO_CATEGORIES),
        keypoint_names: None,
        recipe: Some(
            "https://github.com/pytorch/vision/tree/main/references/detection#faster-r-cnn-resnet-50-fpn",
        ),
        metrics: &[("map", 37.0)],
    },
};

/// Faster R-CNN weights.
pub static FASTERRCNN_RESNET50_FPN_WEIGHTS: WeightsRegistry = WeightsRegistry {
    name: "FasterRCNN_ResNet50_FPN_Weights",
    entries: &[&FASTERRCNN_RESNET50_FPN_COCO_V1],
    default: &FASTERRCNN_RESNET50_FPN_COCO_V1,
};

/// ``keypointrcnn_resnet50_fpn``.
pub static KEYPOINTRCNN_RESNET50_FPN: DetectionModelSpec = DetectionModelSpec {
    name: "keypointrcnn_resnet50_fpn",
    weights: &KEYPOINTRCNN_RESNET50_FPN_WEIGHTS,
    weights_backbone: &RESNET50_WEIGHTS,
    legacy_variants: &[LegacyVariant {
        flag: "legacy",
        weights: &KEYPOINTRCNN_RESNET50_FPN_COCO_LEGACY,
    }],
    pretrained_fallback: &KEYPOINTRCNN_RESNET50_FPN_COCO_V1,
    pretrained_backbone_fallback: &RESNET50_IMAGENET1K_V1,
    default_num_classes: 2,
    default_num_keypoints: Some(17),
    max_trainable_layers: 5,
    default_trainable_layers: 3,
    eps_patched: Some(&KEYPOINTRCNN_RESNET50_FPN_COCO_V1),
};

/// ``fasterrcnn_resnet50_fpn``.
pub static FASTERRCNN_RESNET50_FPN: DetectionModelSpec = DetectionModelSpec {
    name: "fasterrcnn_resnet50_fpn",
    weights: &FASTERRCNN_RESNET50_FPN_WEIGHTS,
    weights_backbone: &RESNET50_WEIGHTS,
    legacy_variants: &[],
    pretrained_fallback: &FASTERRCNN_RESNET50_FPN_COCO_V1,
    pretrained_backbone_fallback: &RESNET50_IMAGENET1K_V1,
    default_num_classes: 91,
    default_num_keypoints: None,
    max_trainable_layers: 5,
    default_trainable_layers: 3,
    eps_patched: Some(&FASTERRCNN_RESNET50_FPN_COCO_V1),
};
