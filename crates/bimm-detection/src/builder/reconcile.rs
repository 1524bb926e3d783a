//! # Override Validation
//!
//! Weights metadata is the source of truth for the head sizes it was
//! trained with; explicit values may restate it, never contradict it.

use crate::errors::{ModelBuildError, Result};

/// Reconcile an explicit value with the value implied by the weights.
///
/// # Arguments
///
/// - `param`: the parameter name, for error reporting.
/// - `explicit`: the caller's value, if any.
/// - `implied`: the value implied by the weights metadata.
///
/// # Returns
///
/// `implied`, when `explicit` is absent or equal.
///
/// # Errors
///
/// [`ModelBuildError::OverrideConflict`] when `explicit` differs.
pub fn reconcile(
    param: &'static str,
    explicit: Option<usize>,
    implied: usize,
) -> Result<usize> {
    match explicit {
        Some(actual) if actual != implied => Err(ModelBuildError::OverrideConflict {
            param,
            expected: implied,
            actual,
        }),
        _ => Ok(implied),
    }
}
