//! # Pretrained `ResNet` Weights

use crate::weights::meta::IMAGENET1K_NUM_CLASSES;
use crate::weights::{Categories, EvalTransform, Weights, WeightsMeta, WeightsRegistry};

/// `ResNet-50` `ImageNet-1K` weights, original recipe.
pub static RESNET50_IMAGENET1K_V1: Weights = Weights {
    name: "ImageNet1K_V1",
    registry: "ResNet50_Weights",
    url: "https://download.pytorch.org/models/resnet50-0676ba61.pth",
    transforms: EvalTransform::ImageClassification {
        crop_size: 224,
        resize_size: 256,
    },
    meta: WeightsMeta {
        categories: Categories::Count(IMAGENET1K_NUM_CLASSES),
        keypoint_names: None,
        recipe: Some("https://github.com/pytorch/vision/tree/main/references/classification#resnet"),
        metrics: &[("acc@1", 76.130), ("acc@5", 92.862)],
    },
};

/// `ResNet-50` `ImageNet-1K` weights, improved training recipe.
pub static RESNET50_IMAGENET1K_V2: Weights = Weights {
    name: "ImageNet1K_V2",
    registry: "ResNet50_Weights",
    url: "https://download.pytorch.org/models/resnet50-11ad3fa6.pth",
    transforms: EvalTransform::ImageClassification {
        crop_size: 224,
        resize_size: 232,
    },
    meta: WeightsMeta {
        categories: Categories::Count(IMAGENET1K_NUM_CLASSES),
        keypoint_names: None,
        recipe: Some("https://github.com/pytorch/vision/issues/3995#issuecomment-1013906621"),
        metrics: &[("acc@1", 80.858), ("acc@5", 95.434)],
    },
};

/// `ResNet-50` backbone weights.
pub static RESNET50_WEIGHTS: WeightsRegistry = WeightsRegistry {
    name: "ResNet50_Weights",
    entries: &[&RESNET50_IMAGENET1K_V1, &RESNET50_IMAGENET1K_V2],
    default: &RESNET50_IMAGENET1K_V2,
};
