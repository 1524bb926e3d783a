#![allow(missing_docs)]
//! # `ResNet` Checkpoint Stubs.
//!
//! Stub modules mirroring the ``torchvision`` `ResNet` checkpoint layout:
//! ``conv1``, ``bn1``, ``layer{1..4}.{i}.{conv,bn}{1..3}`` and
//! ``layer{1..4}.{i}.downsample.{0,1}``. Classifier keys are ignored.

use crate::compat::pytorch::{
    FrozenBatchNormStub, FrozenBatchNormStubRecord, copy_conv_norm_weights, copy_each,
    copy_option, join, load_pytorch_record,
};
use crate::models::resnet::body::ResNetBody;
use crate::models::resnet::bottleneck::BottleneckBlock;
use crate::models::resnet::downsample::ConvDownsample;
use crate::models::resnet::layer_block::LayerBlock;
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::prelude::Backend;
use std::path::Path;

/// Key remaps for `ResNet` checkpoints.
pub const RESNET_KEY_REMAPS: &[(&str, &str)] = &[
    (r"downsample\.0\.", "downsample.conv."),
    (r"downsample\.1\.", "downsample.bn."),
];

/// Load ``torch`` `ResNet` weights onto a [`ResNetBody`].
pub fn load_resnet_body_weights<B: Backend>(
    body: ResNetBody<B>,
    path: &Path,
    device: &B::Device,
) -> anyhow::Result<ResNetBody<B>> {
    let record: ResNetBodyStubRecord<B> = load_pytorch_record(path, RESNET_KEY_REMAPS, device)?;
    record.copy_weights("", body)
}

#[derive(Module, Debug)]
pub struct ResNetBodyStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: FrozenBatchNormStub<B>,
    pub layer1: Vec<BottleneckStub<B>>,
    pub layer2: Vec<BottleneckStub<B>>,
    pub layer3: Vec<BottleneckStub<B>>,
    pub layer4: Vec<BottleneckStub<B>>,
}

impl<B: Backend> ResNetBodyStubRecord<B> {
    pub fn copy_weights(
        self,
        prefix: &str,
        target: ResNetBody<B>,
    ) -> anyhow::Result<ResNetBody<B>> {
        let layer = |name: &str, stubs: Vec<BottleneckStubRecord<B>>, target: LayerBlock<B>| {
            copy_each(&join(prefix, name), stubs, target.blocks, |name, s, t| {
                s.copy_weights(name, t)
            })
            .map(|blocks| LayerBlock { blocks })
        };

        Ok(ResNetBody {
            stem: copy_conv_norm_weights(
                (&join(prefix, "conv1"), &join(prefix, "bn1")),
                self.conv1,
                self.bn1,
                target.stem,
            )?,
            pool: target.pool,
            layer1: layer("layer1", self.layer1, target.layer1)?,
            layer2: layer("layer2", self.layer2, target.layer2)?,
            layer3: layer("layer3", self.layer3, target.layer3)?,
            layer4: layer("layer4", self.layer4, target.layer4)?,
        })
    }
}

#[derive(Module, Debug)]
pub struct BottleneckStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: FrozenBatchNormStub<B>,
    pub conv2: Conv2d<B>,
    pub bn2: FrozenBatchNormStub<B>,
    pub conv3: Conv2d<B>,
    pub bn3: FrozenBatchNormStub<B>,
    pub downsample: Option<DownsampleStub<B>>,
}

impl<B: Backend> BottleneckStubRecord<B> {
    pub fn copy_weights(
        self,
        prefix: &str,
        target: BottleneckBlock<B>,
    ) -> anyhow::Result<BottleneckBlock<B>> {
        let names = |conv: &str, bn: &str| (join(prefix, conv), join(prefix, bn));

        let (c1, b1) = names("conv1", "bn1");
        let (c2, b2) = names("conv2", "bn2");
        let (c3, b3) = names("conv3", "bn3");

        Ok(BottleneckBlock {
            expansion_factor: target.expansion_factor,
            downsample: copy_option(
                &join(prefix, "downsample"),
                self.downsample,
                target.downsample,
                |name, s, t| s.copy_weights(name, t),
            )?,
            conv1: copy_conv_norm_weights((&c1, &b1), self.conv1, self.bn1, target.conv1)?,
            conv2: copy_conv_norm_weights((&c2, &b2), self.conv2, self.bn2, target.conv2)?,
            conv3: copy_conv_norm_weights((&c3, &b3), self.conv3, self.bn3, target.conv3)?,
        })
    }
}

#[derive(Module, Debug)]
pub struct DownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: FrozenBatchNormStub<B>,
}

impl<B: Backend> DownsampleStubRecord<B> {
    pub fn copy_weights(
        self,
        prefix: &str,
        target: ConvDownsample<B>,
    ) -> anyhow::Result<ConvDownsample<B>> {
        Ok(ConvDownsample {
            conv_norm: copy_conv_norm_weights(
                (&format!("{prefix}.0"), &format!("{prefix}.1")),
                self.conv,
                self.bn,
                target.conv_norm,
            )?,
        })
    }
}
