//! # Model Builder Pipeline
//!
//! Request normalization, weights resolution and model assembly, shared by
//! every detection builder.
//!
//! * [`request::ModelRequest`] - builder arguments.
//! * [`legacy`] - the ``pretrained`` / ``pretrained_backbone`` shim.
//! * [`reconcile::reconcile`] - explicit vs. weights-implied head sizes.
//! * [`trainable::resolve_trainable_layers`] - the backbone freeze policy.
//! * [`resolve::resolve`] - the above, in order.
//! * [`assembly::ModelAssembler`] - construction, loading and patching.

pub mod assembly;
pub mod legacy;
pub mod reconcile;
pub mod request;
pub mod resolve;
pub mod trainable;
