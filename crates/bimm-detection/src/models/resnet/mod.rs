//! # `ResNet` Backbones
//!
//! Bottleneck `ResNet` feature bodies with frozen batch norm, for use as
//! detection backbones.
//!
//! * [`body::ResNetBody`] - stem and four stages; returns every stage's features.
//! * [`pretrained::RESNET50_WEIGHTS`] - `ImageNet` pretrained weights.
//! * [`resnet_io::pytorch_stubs`] - ``torchvision`` checkpoint loading.

pub mod body;
pub mod bottleneck;
pub mod downsample;
pub mod layer_block;
pub mod pretrained;
pub mod resnet_io;
pub mod util;
