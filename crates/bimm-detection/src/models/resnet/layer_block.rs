//! # `ResNet` Stage
//!
//! A [`LayerBlock`] chains [`BottleneckBlock`]s. Only the leading block
//! changes stride and width; the rest keep `out_planes`.

use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::resnet::bottleneck::{BottleneckBlock, BottleneckBlockConfig};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`LayerBlock`] Configuration.
#[derive(Config, Debug)]
pub struct LayerBlockConfig {
    /// Per-block configs.
    pub blocks: Vec<BottleneckBlockConfig>,
}

impl LayerBlockConfig {
    /// Build a stage config.
    ///
    /// # Arguments
    ///
    /// - `num_blocks`: block count.
    /// - `in_planes`: input channels of the leading block.
    /// - `planes`: bottleneck width.
    /// - `stride`: stride of the leading block.
    /// - `eps`: frozen norm `eps`.
    pub fn build(
        num_blocks: usize,
        in_planes: usize,
        planes: usize,
        stride: usize,
        eps: f64,
    ) -> Self {
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut c_in = in_planes;
        for idx in 0..num_blocks {
            let block = BottleneckBlockConfig::new(c_in, planes)
                .with_stride(if idx == 0 { stride } else { 1 })
                .with_eps(eps);
            c_in = block.out_planes();
            blocks.push(block);
        }
        Self { blocks }
    }

    /// Output channels; `0` when empty.
    pub fn out_planes(&self) -> usize {
        self.blocks.last().map_or(0, BottleneckBlockConfig::out_planes)
    }

    /// Combined stride.
    pub fn stride(&self) -> usize {
        self.blocks.iter().map(|b| b.stride).product()
    }

    /// Initialize a new [`LayerBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> LayerBlock<B> {
        let blocks = self.blocks.into_iter().map(|b| b.init(device)).collect();
        LayerBlock { blocks }
    }
}

/// `ResNet` stage.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    /// Residual units, in order.
    pub blocks: Vec<BottleneckBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    /// Input channels; `0` when empty.
    pub fn in_planes(&self) -> usize {
        self.blocks.first().map_or(0, BottleneckBlock::in_planes)
    }

    /// Output channels; `0` when empty.
    pub fn out_planes(&self) -> usize {
        self.blocks.last().map_or(0, BottleneckBlock::out_planes)
    }

    /// Combined stride.
    pub fn stride(&self) -> usize {
        self.blocks.iter().map(BottleneckBlock::stride).product()
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }
}

impl<B: Backend> EpsilonPatch for LayerBlock<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self {
            blocks: self.blocks.overwrite_eps(eps),
        }
    }
}
