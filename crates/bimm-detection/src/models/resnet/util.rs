//! # `ResNet` Utilities
use burn::nn::Initializer;

/// Kaiming normal ``fan_out`` initializer, for convolutions feeding a ReLU.
pub static CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: true,
};
