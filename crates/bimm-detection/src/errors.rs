//! # Model Build Errors
//!
//! Every failure of the resolution / assembly pipeline surfaces as a
//! [`ModelBuildError`]; no partially built model is ever returned.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving weights and assembling a model.
#[derive(Debug, Error)]
pub enum ModelBuildError {
    /// A weights selection could not be resolved against its registry.
    #[error(
        "invalid weights selection {value} for {registry}; expected one of: {}",
        .valid.join(", ")
    )]
    InvalidSelection {
        /// The registry the selection was verified against.
        registry: &'static str,

        /// The offending value, rendered for display.
        value: String,

        /// The valid identifiers of the registry.
        valid: Vec<&'static str>,
    },

    /// An explicit hyperparameter contradicts the value implied by the weights.
    #[error("the parameter '{param}' expected value {expected} but got {actual} instead")]
    OverrideConflict {
        /// The parameter name.
        param: &'static str,

        /// The value implied by the weights metadata.
        expected: usize,

        /// The value supplied by the caller.
        actual: usize,
    },

    /// The trainable layer count is outside of the policy bounds.
    #[error("trainable_backbone_layers should be in the range [0, {max}], got {requested}")]
    OutOfRange {
        /// The requested count.
        requested: usize,

        /// The inclusive maximum.
        max: usize,
    },

    /// The retrieval service could not obtain the parameter payload.
    #[error("failed to retrieve weights from {url}")]
    RetrievalFailure {
        /// The source location.
        url: String,

        /// The underlying retrieval error.
        #[source]
        source: anyhow::Error,
    },

    /// The parameter payload could not be loaded into the model.
    #[error("failed to load parameters from {}", .path.display())]
    LoadFailure {
        /// The payload path.
        path: PathBuf,

        /// The underlying loader error.
        #[source]
        source: anyhow::Error,
    },
}

/// Result alias for model building.
pub type Result<T> = std::result::Result<T, ModelBuildError>;
