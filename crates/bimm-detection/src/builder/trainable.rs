//! # Trainable Layer Policy
//!
//! Fine-tuning from pretrained parameters freezes the early backbone
//! stages by default; training from scratch leaves every stage trainable.

use crate::errors::{ModelBuildError, Result};

/// Resolve the number of trainable backbone stages.
///
/// # Arguments
///
/// - `any_pretrained`: task weights or backbone weights are in use.
/// - `requested`: the caller's requested count, if any.
/// - `max_value`: the number of freezable stages.
/// - `default_value`: the default count when pretrained.
///
/// # Returns
///
/// - pretrained: `requested`, or `default_value` when absent.
/// - not pretrained: `max_value`; a requested count is ignored with a warning.
///
/// # Errors
///
/// [`ModelBuildError::OutOfRange`] when pretrained and `requested > max_value`.
pub fn resolve_trainable_layers(
    any_pretrained: bool,
    requested: Option<usize>,
    max_value: usize,
    default_value: usize,
) -> Result<usize> {
    if !any_pretrained {
        if let Some(requested) = requested {
            tracing::warn!(
                requested,
                "Changing trainable_backbone_layers has no effect if neither pretrained weights \
                 nor pretrained backbone weights are used; falling back to \
                 trainable_backbone_layers={max_value} so that all layers are trainable"
            );
        }
        return Ok(max_value);
    }

    let layers = requested.unwrap_or(default_value);
    if layers > max_value {
        return Err(ModelBuildError::OutOfRange {
            requested: layers,
            max: max_value,
        });
    }
    Ok(layers)
}
