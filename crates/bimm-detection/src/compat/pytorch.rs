//! # `PyTorch` Checkpoint Compatibility
//!
//! Checkpoints are loaded with `burn-import` into stub module trees that
//! mirror the checkpoint key layout, then copied onto the constructed
//! modules. The stubs hold only tensors, so constant-only state (norm `eps`,
//! pooling, strides) is carried over from the target module.
//!
//! Every copy checks the tensor shapes against the target; a mismatch is an
//! error, not a panic.

use crate::layers::conv_norm::ConvNorm2d;
use crate::layers::frozen_norm::FrozenBatchNorm2d;
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dRecord, ConvTranspose2d, ConvTranspose2dRecord};
use burn::nn::{Linear, LinearRecord};
use burn::prelude::{Backend, Tensor};
use burn::record::{FullPrecisionSettings, Record, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

/// Load a stub record from a ``torch`` checkpoint.
///
/// # Arguments
///
/// - `path`: the checkpoint path.
/// - `key_remaps`: ``(pattern, replacement)`` regex remaps, applied in order.
/// - `device`: the target device.
pub fn load_pytorch_record<B: Backend, R: Record<B>, K: AsRef<str>>(
    path: &Path,
    key_remaps: &[(K, K)],
    device: &B::Device,
) -> anyhow::Result<R> {
    let load_args = key_remaps
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern.as_ref(), replacement.as_ref())
        });

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

    Ok(record)
}

/// Join a checkpoint key prefix and a field name.
pub fn join(
    prefix: &str,
    name: &str,
) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Check that a loaded tensor matches the target shape.
pub fn ensure_dims<const D: usize>(
    name: &str,
    expected: [usize; D],
    found: [usize; D],
) -> anyhow::Result<()> {
    anyhow::ensure!(
        expected == found,
        "{name}: expected shape {expected:?}, found {found:?}"
    );
    Ok(())
}

/// Copy a list of stubs onto a list of targets of the same length.
pub fn copy_each<S, T, F>(
    name: &str,
    stubs: Vec<S>,
    targets: Vec<T>,
    mut copy: F,
) -> anyhow::Result<Vec<T>>
where
    F: FnMut(&str, S, T) -> anyhow::Result<T>,
{
    anyhow::ensure!(
        stubs.len() == targets.len(),
        "{name}: expected {} entries, found {}",
        targets.len(),
        stubs.len()
    );
    stubs
        .into_iter()
        .zip(targets)
        .enumerate()
        .map(|(idx, (stub, target))| copy(&format!("{name}.{idx}"), stub, target))
        .collect()
}

/// Copy an optional stub onto an optional target; both must be present or absent.
pub fn copy_option<S, T, F>(
    name: &str,
    stub: Option<S>,
    target: Option<T>,
    copy: F,
) -> anyhow::Result<Option<T>>
where
    F: FnOnce(&str, S, T) -> anyhow::Result<T>,
{
    match (stub, target) {
        (Some(stub), Some(target)) => copy(name, stub, target).map(Some),
        (None, None) => Ok(None),
        (None, Some(_)) => anyhow::bail!("{name}: missing from checkpoint"),
        (Some(_), None) => anyhow::bail!("{name}: unexpected in checkpoint"),
    }
}

/// Copy a [`Conv2d`] record.
pub fn copy_conv2d<B: Backend>(
    name: &str,
    record: Conv2dRecord<B>,
    target: Conv2d<B>,
) -> anyhow::Result<Conv2d<B>> {
    ensure_dims(&format!("{name}.weight"), target.weight.dims(), record.weight.dims())?;
    Ok(target.load_record(record))
}

/// Copy a [`ConvTranspose2d`] record.
pub fn copy_conv_transpose2d<B: Backend>(
    name: &str,
    record: ConvTranspose2dRecord<B>,
    target: ConvTranspose2d<B>,
) -> anyhow::Result<ConvTranspose2d<B>> {
    ensure_dims(&format!("{name}.weight"), target.weight.dims(), record.weight.dims())?;
    Ok(target.load_record(record))
}

/// Copy a [`Linear`] record.
pub fn copy_linear<B: Backend>(
    name: &str,
    record: LinearRecord<B>,
    target: Linear<B>,
) -> anyhow::Result<Linear<B>> {
    ensure_dims(&format!("{name}.weight"), target.weight.dims(), record.weight.dims())?;
    Ok(target.load_record(record))
}

/// Checkpoint layout of a frozen (or plain) batch norm.
#[derive(Module, Debug)]
pub struct FrozenBatchNormStub<B: Backend> {
    /// Scale.
    pub weight: Param<Tensor<B, 1>>,

    /// Shift.
    pub bias: Param<Tensor<B, 1>>,

    /// Mean.
    pub running_mean: Param<Tensor<B, 1>>,

    /// Variance.
    pub running_var: Param<Tensor<B, 1>>,
}

impl<B: Backend> FrozenBatchNormStubRecord<B> {
    /// Copy onto a [`FrozenBatchNorm2d`], keeping its `eps`.
    pub fn copy_weights(
        self,
        name: &str,
        target: FrozenBatchNorm2d<B>,
    ) -> anyhow::Result<FrozenBatchNorm2d<B>> {
        let expected = [target.num_features()];
        for (field, found) in [
            ("weight", self.weight.dims()),
            ("bias", self.bias.dims()),
            ("running_mean", self.running_mean.dims()),
            ("running_var", self.running_var.dims()),
        ] {
            ensure_dims(&format!("{name}.{field}"), expected, found)?;
        }

        Ok(FrozenBatchNorm2d {
            weight: self.weight,
            bias: self.bias,
            running_mean: self.running_mean,
            running_var: self.running_var,
            eps: target.eps,
        }
        .no_grad())
    }
}

/// Copy a (conv, norm) checkpoint pair onto a [`ConvNorm2d`].
pub fn copy_conv_norm_weights<B: Backend>(
    names: (&str, &str),
    conv: Conv2dRecord<B>,
    bn: FrozenBatchNormStubRecord<B>,
    target: ConvNorm2d<B>,
) -> anyhow::Result<ConvNorm2d<B>> {
    let (conv_name, bn_name) = names;
    Ok(ConvNorm2d {
        conv: copy_conv2d(conv_name, conv, target.conv)?,
        norm: bn.copy_weights(bn_name, target.norm)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::frozen_norm::FrozenBatchNorm2dConfig;
    use burn::backend::NdArray;
    use burn::nn::conv::Conv2dConfig;

    #[test]
    fn test_join() {
        assert_eq!(join("", "conv1"), "conv1");
        assert_eq!(join("backbone.body", "conv1"), "backbone.body.conv1");
    }

    #[test]
    fn test_ensure_dims() {
        assert!(ensure_dims("w", [2, 3], [2, 3]).is_ok());
        let err = ensure_dims("w", [2, 3], [3, 2]).unwrap_err();
        assert_eq!(err.to_string(), "w: expected shape [2, 3], found [3, 2]");
    }

    #[test]
    fn test_copy_each_and_option() {
        let copied = copy_each("xs", vec![1, 2], vec![10, 20], |_, s, t| Ok(s + t)).unwrap();
        assert_eq!(copied, vec![11, 22]);

        let err = copy_each("xs", vec![1], vec![10, 20], |_, s, t| Ok(s + t)).unwrap_err();
        assert_eq!(err.to_string(), "xs: expected 2 entries, found 1");

        let names = copy_each("xs", vec![1, 2], vec![10, 20], |name, _, _| {
            Ok(if name == "xs.1" { 1 } else { 0 })
        })
        .unwrap();
        assert_eq!(names, vec![0, 1]);

        assert_eq!(
            copy_option("o", Some(1), Some(2), |_, s, t| Ok(s + t)).unwrap(),
            Some(3)
        );
        assert_eq!(
            copy_option::<i32, i32, _>("o", None, None, |_, s, t| Ok(s + t)).unwrap(),
            None
        );
        assert!(copy_option("o", None, Some(2), |_, s: i32, t| Ok(s + t)).is_err());
        assert!(copy_option("o", Some(1), None, |_, s, t: i32| Ok(s + t)).is_err());
    }

    #[test]
    fn test_copy_frozen_norm_keeps_eps() {
        type B = NdArray<f32>;
        let device = Default::default();

        let source: FrozenBatchNorm2d<B> = FrozenBatchNorm2dConfig::new(2).init(&device);
        let record = FrozenBatchNormStubRecord {
            weight: Param::from_tensor(Tensor::from_floats([2.0, 3.0], &device)),
            bias: source.bias.clone(),
            running_mean: source.running_mean.clone(),
            running_var: source.running_var.clone(),
        };

        let target = FrozenBatchNorm2dConfig::new(2).with_eps(0.5).init(&device);
        let copied = record.copy_weights("bn", target).unwrap();
        assert_eq!(copied.eps, 0.5);
        assert_eq!(
            copied.weight.val().to_data().to_vec::<f32>().unwrap(),
            vec![2.0, 3.0]
        );

        let record = FrozenBatchNormStubRecord {
            weight: Param::from_tensor(Tensor::from_floats([2.0, 3.0, 4.0], &device)),
            bias: source.bias.clone(),
            running_mean: source.running_mean.clone(),
            running_var: source.running_var,
        };
        let err = record
            .copy_weights("bn", FrozenBatchNorm2dConfig::new(2).init(&device))
            .unwrap_err();
        assert_eq!(err.to_string(), "bn.weight: expected shape [2], found [3]");
    }

    #[test]
    fn test_copy_conv2d_shape_mismatch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let source: Conv2d<B> = Conv2dConfig::new([2, 4], [3, 3]).init(&device);
        let target: Conv2d<B> = Conv2dConfig::new([2, 4], [1, 1]).init(&device);

        let err = copy_conv2d("conv", source.clone().into_record(), target).unwrap_err();
        assert_eq!(
            err.to_string(),
            "conv.weight: expected shape [4, 2, 1, 1], found [4, 2, 3, 3]"
        );

        let target: Conv2d<B> = Conv2dConfig::new([2, 4], [3, 3]).init(&device);
        let copied = copy_conv2d("conv", source.clone().into_record(), target).unwrap();
        assert_eq!(
            copied.weight.val().to_data().to_vec::<f32>().unwrap(),
            source.weight.val().to_data().to_vec::<f32>().unwrap()
        );
    }
}
