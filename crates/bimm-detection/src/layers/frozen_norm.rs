//! # Frozen Batch Norm
//!
//! [`FrozenBatchNorm2d`] is a 2d batch norm whose statistics and affine
//! parameters are fixed. It behaves identically in training and inference,
//! and none of its parameters require gradients.
//!
//! [`EpsilonPatch`] rewrites the `eps` of every frozen norm in a module tree.

use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::{Module, Param};
use burn::prelude::{Backend, Tensor};

/// Rewrite the `eps` of every [`FrozenBatchNorm2d`] in a module tree.
pub trait EpsilonPatch: Sized {
    /// Replace `eps` on every reachable frozen norm.
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self;
}

impl<T: EpsilonPatch> EpsilonPatch for Vec<T> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        self.into_iter().map(|m| m.overwrite_eps(eps)).collect()
    }
}

impl<T: EpsilonPatch> EpsilonPatch for Option<T> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        self.map(|m| m.overwrite_eps(eps))
    }
}

/// [`FrozenBatchNorm2d`] Config.
#[derive(Config, Debug)]
pub struct FrozenBatchNorm2dConfig {
    /// The number of channels.
    pub num_features: usize,

    /// Added to the variance before the square root.
    #[config(default = 1e-5)]
    pub eps: f64,
}

impl FrozenBatchNorm2dConfig {
    /// Initialize an identity [`FrozenBatchNorm2d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FrozenBatchNorm2d<B> {
        let n = self.num_features;
        FrozenBatchNorm2d {
            weight: Param::from_tensor(Tensor::ones([n], device)),
            bias: Param::from_tensor(Tensor::zeros([n], device)),
            running_mean: Param::from_tensor(Tensor::zeros([n], device)),
            running_var: Param::from_tensor(Tensor::ones([n], device)),
            eps: self.eps,
        }
        .no_grad()
    }
}

/// Batch norm with fixed statistics and affine parameters.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm2d<B: Backend> {
    /// Scale.
    pub weight: Param<Tensor<B, 1>>,

    /// Shift.
    pub bias: Param<Tensor<B, 1>>,

    /// Fixed mean.
    pub running_mean: Param<Tensor<B, 1>>,

    /// Fixed variance.
    pub running_var: Param<Tensor<B, 1>>,

    /// Added to the variance before the square root.
    pub eps: f64,
}

impl<B: Backend> FrozenBatchNorm2d<B> {
    /// The number of channels.
    pub fn num_features(&self) -> usize {
        self.weight.shape().dims[0]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, channels, height, width]`` tensor.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let channels = self.num_features();
        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &input,
            &[("channels", channels)]
        );

        let scale = self.weight.val() * self.running_var.val().add_scalar(self.eps).sqrt().recip();
        let shift = self.bias.val() - self.running_mean.val() * scale.clone();

        input * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

impl<B: Backend> EpsilonPatch for FrozenBatchNorm2d<B> {
    fn overwrite_eps(
        self,
        eps: f64,
    ) -> Self {
        Self { eps, ..self }
    }
}
