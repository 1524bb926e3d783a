//! # Pretrained Weights Registries
//!
//! A [`Weights`] entry describes one named, versioned set of pretrained
//! parameters: where to fetch it, which evaluation transform it expects,
//! and the metadata (categories, keypoint names) its head was trained with.
//!
//! A [`WeightsRegistry`] is a closed, named set of `'static` entries with
//! one designated default. Entries are singletons; two entries are the same
//! entry only if they are the same static (see [`Weights::is`]).
//!
//! A [`Selection`] is caller input naming an entry; [`WeightsRegistry::verify`]
//! resolves it.

pub mod meta;

use crate::cache::weights::RetrievalService;
use crate::errors::{ModelBuildError, Result};
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

/// Reference to the evaluation transform a weights entry was trained for.
///
/// The transforms themselves live outside this crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvalTransform {
    /// COCO detection evaluation: convert to float, no resize.
    CocoEval,

    /// `ImageNet` classification evaluation.
    ImageClassification {
        /// Center crop size.
        crop_size: usize,

        /// Resize size applied before cropping.
        resize_size: usize,
    },
}

/// The label space of a weights entry.
#[derive(Debug, Clone, Copy)]
pub enum Categories {
    /// Named labels, in head output order.
    Named(&'static [&'static str]),

    /// A label space whose names are not bundled with this crate.
    Count(usize),
}

impl Categories {
    /// The number of labels.
    pub fn len(&self) -> usize {
        match self {
            Self::Named(names) => names.len(),
            Self::Count(count) => *count,
        }
    }

    /// Check if the label space is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The label names, if bundled.
    pub fn names(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Named(names) => Some(names),
            Self::Count(_) => None,
        }
    }
}

/// Metadata attached to a [`Weights`] entry.
#[derive(Debug, Clone, Copy)]
pub struct WeightsMeta {
    /// Output categories.
    pub categories: Categories,

    /// Keypoint names, for keypoint tasks.
    pub keypoint_names: Option<&'static [&'static str]>,

    /// Link to the training recipe.
    pub recipe: Option<&'static str>,

    /// Named benchmark scores.
    pub metrics: &'static [(&'static str, f64)],
}

impl WeightsMeta {
    /// The number of output categories.
    pub fn num_classes(&self) -> usize {
        self.categories.len()
    }

    /// The number of keypoints, for keypoint tasks.
    pub fn num_keypoints(&self) -> Option<usize> {
        self.keypoint_names.map(|names| names.len())
    }

    /// Lookup a benchmark metric by name.
    pub fn metric(
        &self,
        name: &str,
    ) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }
}

/// One pretrained weights entry.
///
/// Entries are compared by identity, never by value.
pub struct Weights {
    /// Entry name, unique within its registry.
    pub name: &'static str,

    /// The name of the owning registry.
    pub registry: &'static str,

    /// URL to download the weights from.
    pub url: &'static str,

    /// The evaluation transform.
    pub transforms: EvalTransform,

    /// Entry metadata.
    pub meta: WeightsMeta,
}

impl Weights {
    /// Identity comparison.
    pub fn is(
        &self,
        other: &Weights,
    ) -> bool {
        std::ptr::eq(self, other)
    }

    /// The qualified name: ``{registry}.{name}``.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.registry, self.name)
    }

    /// Fetch the parameter payload through a retrieval service.
    ///
    /// # Returns
    ///
    /// The local path of the payload.
    pub fn fetch(
        &self,
        retrieval: &dyn RetrievalService,
        progress: bool,
    ) -> Result<PathBuf> {
        retrieval
            .fetch(self, progress)
            .map_err(|source| ModelBuildError::RetrievalFailure {
                url: self.url.to_string(),
                source,
            })
    }
}

impl Debug for Weights {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Weights")
            .field("name", &self.qualified_name())
            .field("url", &self.url)
            .field("transforms", &self.transforms)
            .finish()
    }
}

impl Display for Weights {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}.{}", self.registry, self.name)
    }
}

/// A closed, named set of [`Weights`] entries.
#[derive(Debug)]
pub struct WeightsRegistry {
    /// Registry name.
    pub name: &'static str,

    /// The entries, in declaration order.
    pub entries: &'static [&'static Weights],

    /// The designated default entry.
    pub default: &'static Weights,
}

/// Name alias resolving to [`WeightsRegistry::default`].
pub const DEFAULT_ALIAS: &str = "default";

impl WeightsRegistry {
    /// Check if an entry belongs to this registry.
    pub fn contains(
        &self,
        weights: &Weights,
    ) -> bool {
        self.entries.iter().any(|w| w.is(weights))
    }

    /// Lookup an entry by name.
    ///
    /// Accepts bare names, names prefixed with ``{registry}.``, and the
    /// [`DEFAULT_ALIAS`].
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<&'static Weights> {
        let name = name
            .strip_prefix(self.name)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name);
        if name == DEFAULT_ALIAS {
            return Some(self.default);
        }
        self.entries.iter().find(|w| w.name == name).copied()
    }

    /// The valid entry names.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|w| w.name).collect()
    }

    fn invalid(
        &self,
        value: String,
    ) -> ModelBuildError {
        ModelBuildError::InvalidSelection {
            registry: self.name,
            value,
            valid: self.names(),
        }
    }

    /// Verify a selection against this registry.
    ///
    /// # Returns
    ///
    /// - `None` for `None`,
    /// - the matching entry for an entry or a convertible name.
    ///
    /// # Errors
    ///
    /// [`ModelBuildError::InvalidSelection`] for entries of other registries,
    /// unknown names, and boolean flags.
    pub fn verify(
        &self,
        selection: Option<&Selection>,
    ) -> Result<Option<&'static Weights>> {
        match selection {
            None => Ok(None),
            Some(Selection::Entry(weights)) => {
                if self.contains(weights) {
                    Ok(Some(*weights))
                } else {
                    Err(self.invalid(weights.qualified_name()))
                }
            }
            Some(Selection::Name(name)) => self
                .lookup_by_name(name)
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{name}'"))),
            Some(Selection::Flag(flag)) => Err(self.invalid(flag.to_string())),
        }
    }
}

/// Caller input identifying a weights entry.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A registry entry.
    Entry(&'static Weights),

    /// An entry name; optionally prefixed by the registry name.
    Name(String),

    /// A boolean passed in the weights slot.
    ///
    /// Deprecated; `true` is translated by the legacy shim.
    Flag(bool),
}

impl From<&'static Weights> for Selection {
    fn from(weights: &'static Weights) -> Self {
        Self::Entry(weights)
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Selection {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<bool> for Selection {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}
