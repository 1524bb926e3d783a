#![allow(missing_docs)]
//! # Detection Checkpoint Stubs.
//!
//! Stub modules mirroring the ``torchvision`` R-CNN checkpoint layout:
//!
//! * ``backbone.body.*`` - a `ResNet` body.
//! * ``backbone.fpn.{inner,layer}_blocks.{i}`` - pyramid convs.
//! * ``rpn.head.{conv,cls_logits,bbox_pred}``
//! * ``roi_heads.box_head.fc{6,7}``, ``roi_heads.box_predictor.*``
//! * ``roi_heads.keypoint_head.{2i}``, ``roi_heads.keypoint_predictor.*``
//!
//! Newer checkpoints wrap single convs in sequential blocks
//! (``inner_blocks.0.0.weight``, ``rpn.head.conv.0.0.weight``); the key
//! remaps flatten both layouts onto the same stub keys.

use crate::compat::pytorch::{
    copy_conv2d, copy_conv_transpose2d, copy_each, copy_linear, join, load_pytorch_record,
};
use crate::models::detection::faster_rcnn::FasterRcnn;
use crate::models::detection::fpn::{BackboneWithFpn, FeaturePyramidNetwork};
use crate::models::detection::keypoint_rcnn::KeypointRcnn;
use crate::models::detection::roi_heads::{
    FastRcnnPredictor, FastRcnnPredictorRecord, KeypointRcnnHeads, KeypointRcnnHeadsRecord,
    KeypointRcnnPredictor, KeypointRcnnPredictorRecord, TwoMlpHead, TwoMlpHeadRecord,
};
use crate::models::detection::rpn::{RpnHead, RpnHeadRecord};
use crate::models::resnet::resnet_io::pytorch_stubs::{
    RESNET_KEY_REMAPS, ResNetBodyStub, ResNetBodyStubRecord,
};
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::prelude::Backend;
use std::path::Path;

/// Key remaps for R-CNN checkpoints.
///
/// # Arguments
///
/// - `keypoint_head_layers`: conv layers in the keypoint head; `0` for
///   models without a keypoint branch.
pub fn detection_key_remaps(keypoint_head_layers: usize) -> Vec<(String, String)> {
    let mut remaps: Vec<(String, String)> = RESNET_KEY_REMAPS
        .iter()
        .map(|(pattern, replacement)| (pattern.to_string(), replacement.to_string()))
        .collect();

    remaps.push((
        r"^(backbone\.fpn\.(?:inner|layer)_blocks\.[0-9]+)\.0\.".to_string(),
        "$1.".to_string(),
    ));
    remaps.push((r"^rpn\.head\.conv\.0\.0\.".to_string(), "rpn.head.conv.".to_string()));

    // Sequential indices alternate conv / relu.
    remaps.extend((0..keypoint_head_layers).map(|idx| {
        (
            format!(r"^roi_heads\.keypoint_head\.{}\.", 2 * idx),
            format!("roi_heads.keypoint_head.convs.{idx}."),
        )
    }));

    remaps
}

/// Load a ``torchvision`` Faster R-CNN checkpoint onto a [`FasterRcnn`].
pub fn load_faster_rcnn_weights<B: Backend>(
    model: FasterRcnn<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<FasterRcnn<B>> {
    let record: FasterRcnnStubRecord<B> =
        load_pytorch_record(path, &detection_key_remaps(0), device)?;
    record.copy_weights(model)
}

/// Load a ``torchvision`` Keypoint R-CNN checkpoint onto a [`KeypointRcnn`].
pub fn load_keypoint_rcnn_weights<B: Backend>(
    model: KeypointRcnn<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<KeypointRcnn<B>> {
    let remaps = detection_key_remaps(model.keypoint_head.convs.len());
    let record: KeypointRcnnStubRecord<B> = load_pytorch_record(path, &remaps, device)?;
    record.copy_weights(model)
}

#[derive(Module, Debug)]
pub struct FasterRcnnStub<B: Backend> {
    pub backbone: BackboneStub<B>,
    pub rpn: RpnStub<B>,
    pub roi_heads: BoxRoiHeadsStub<B>,
}

impl<B: Backend> FasterRcnnStubRecord<B> {
    pub fn copy_weights(
        self,
        target: FasterRcnn<B>,
    ) -> anyhow::Result<FasterRcnn<B>> {
        Ok(FasterRcnn {
            backbone: self.backbone.copy_weights("backbone", target.backbone)?,
            rpn: copy_rpn_head("rpn.head", self.rpn.head, target.rpn)?,
            box_head: copy_box_head("roi_heads.box_head", self.roi_heads.box_head, target.box_head)?,
            box_predictor: copy_box_predictor(
                "roi_heads.box_predictor",
                self.roi_heads.box_predictor,
                target.box_predictor,
            )?,
            options: target.options,
        })
    }
}

#[derive(Module, Debug)]
pub struct KeypointRcnnStub<B: Backend> {
    pub backbone: BackboneStub<B>,
    pub rpn: RpnStub<B>,
    pub roi_heads: KeypointRoiHeadsStub<B>,
}

impl<B: Backend> KeypointRcnnStubRecord<B> {
    pub fn copy_weights(
        self,
        target: KeypointRcnn<B>,
    ) -> anyhow::Result<KeypointRcnn<B>> {
        let roi_heads = self.roi_heads;
        let base = FasterRcnnStubRecord {
            backbone: self.backbone,
            rpn: self.rpn,
            roi_heads: BoxRoiHeadsStubRecord {
                box_head: roi_heads.box_head,
                box_predictor: roi_heads.box_predictor,
            },
        };

        Ok(KeypointRcnn {
            detector: base.copy_weights(target.detector)?,
            keypoint_head: copy_keypoint_head(
                "roi_heads.keypoint_head",
                roi_heads.keypoint_head,
                target.keypoint_head,
            )?,
            keypoint_predictor: copy_keypoint_predictor(
                "roi_heads.keypoint_predictor",
                roi_heads.keypoint_predictor,
                target.keypoint_predictor,
            )?,
        })
    }
}

#[derive(Module, Debug)]
pub struct BackboneStub<B: Backend> {
    pub body: ResNetBodyStub<B>,
    pub fpn: FpnStub<B>,
}

impl<B: Backend> BackboneStubRecord<B> {
    pub fn copy_weights(
        self,
        prefix: &str,
        target: BackboneWithFpn<B>,
    ) -> anyhow::Result<BackboneWithFpn<B>> {
        let fpn = &join(prefix, "fpn");
        Ok(BackboneWithFpn {
            body: self.body.copy_weights(&join(prefix, "body"), target.body)?,
            fpn: FeaturePyramidNetwork {
                inner_blocks: copy_each(
                    &join(fpn, "inner_blocks"),
                    self.fpn.inner_blocks,
                    target.fpn.inner_blocks,
                    copy_conv2d,
                )?,
                layer_blocks: copy_each(
                    &join(fpn, "layer_blocks"),
                    self.fpn.layer_blocks,
                    target.fpn.layer_blocks,
                    copy_conv2d,
                )?,
                extra_pool: target.fpn.extra_pool,
            },
            trainable_layers: target.trainable_layers,
        })
    }
}

#[derive(Module, Debug)]
pub struct FpnStub<B: Backend> {
    pub inner_blocks: Vec<Conv2d<B>>,
    pub layer_blocks: Vec<Conv2d<B>>,
}

#[derive(Module, Debug)]
pub struct RpnStub<B: Backend> {
    pub head: RpnHead<B>,
}

#[derive(Module, Debug)]
pub struct BoxRoiHeadsStub<B: Backend> {
    pub box_head: TwoMlpHead<B>,
    pub box_predictor: FastRcnnPredictor<B>,
}

#[derive(Module, Debug)]
pub struct KeypointRoiHeadsStub<B: Backend> {
    pub box_head: TwoMlpHead<B>,
    pub box_predictor: FastRcnnPredictor<B>,
    pub keypoint_head: KeypointRcnnHeads<B>,
    pub keypoint_predictor: KeypointRcnnPredictor<B>,
}

fn copy_rpn_head<B: Backend>(
    prefix: &str,
    record: RpnHeadRecord<B>,
    target: RpnHead<B>,
) -> anyhow::Result<RpnHead<B>> {
    Ok(RpnHead {
        conv: copy_conv2d(&join(prefix, "conv"), record.conv, target.conv)?,
        cls_logits: copy_conv2d(&join(prefix, "cls_logits"), record.cls_logits, target.cls_logits)?,
        bbox_pred: copy_conv2d(&join(prefix, "bbox_pred"), record.bbox_pred, target.bbox_pred)?,
    })
}

fn copy_box_head<B: Backend>(
    prefix: &str,
    record: TwoMlpHeadRecord<B>,
    target: TwoMlpHead<B>,
) -> anyhow::Result<TwoMlpHead<B>> {
    Ok(TwoMlpHead {
        fc6: copy_linear(&join(prefix, "fc6"), record.fc6, target.fc6)?,
        fc7: copy_linear(&join(prefix, "fc7"), record.fc7, target.fc7)?,
    })
}

fn copy_box_predictor<B: Backend>(
    prefix: &str,
    record: FastRcnnPredictorRecord<B>,
    target: FastRcnnPredictor<B>,
) -> anyhow::Result<FastRcnnPredictor<B>> {
    Ok(FastRcnnPredictor {
        cls_score: copy_linear(&join(prefix, "cls_score"), record.cls_score, target.cls_score)?,
        bbox_pred: copy_linear(&join(prefix, "bbox_pred"), record.bbox_pred, target.bbox_pred)?,
    })
}

fn copy_keypoint_head<B: Backend>(
    prefix: &str,
    record: KeypointRcnnHeadsRecord<B>,
    target: KeypointRcnnHeads<B>,
) -> anyhow::Result<KeypointRcnnHeads<B>> {
    Ok(KeypointRcnnHeads {
        convs: copy_each(prefix, record.convs, target.convs, copy_conv2d)?,
    })
}

fn copy_keypoint_predictor<B: Backend>(
    prefix: &str,
    record: KeypointRcnnPredictorRecord<B>,
    target: KeypointRcnnPredictor<B>,
) -> anyhow::Result<KeypointRcnnPredictor<B>> {
    Ok(KeypointRcnnPredictor {
        kps_score_lowres: copy_conv_transpose2d(
            &join(prefix, "kps_score_lowres"),
            record.kps_score_lowres,
            target.kps_score_lowres,
        )?,
    })
}
