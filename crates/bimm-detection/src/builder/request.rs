//! # Model Request
//!
//! [`ModelRequest`] is the caller-facing argument bundle of a model builder.
//! It carries both the current-style selections and the deprecated legacy
//! flags; resolution reads it and never modifies it.

use crate::builder::legacy::LegacyFlag;
use crate::models::detection::options::RcnnOptions;
use crate::weights::Selection;

/// Arguments to a detection model builder.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Task weights selection.
    pub weights: Option<Selection>,

    /// Report download progress.
    pub progress: bool,

    /// Explicit class count, including background.
    pub num_classes: Option<usize>,

    /// Explicit keypoint count.
    pub num_keypoints: Option<usize>,

    /// Backbone weights selection.
    pub weights_backbone: Option<Selection>,

    /// Requested trainable backbone stage count.
    pub trainable_backbone_layers: Option<usize>,

    /// Deprecated: ``pretrained``.
    pub pretrained: Option<LegacyFlag>,

    /// Deprecated: ``pretrained_backbone``.
    pub pretrained_backbone: Option<LegacyFlag>,

    /// Head options, passed through to the head constructor.
    pub options: RcnnOptions,
}

impl Default for ModelRequest {
    fn default() -> Self {
        Self {
            weights: None,
            progress: true,
            num_classes: None,
            num_keypoints: None,
            weights_backbone: None,
            trainable_backbone_layers: None,
            pretrained: None,
            pretrained_backbone: None,
            options: RcnnOptions::default(),
        }
    }
}

impl ModelRequest {
    /// Create a request with no selections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select task weights.
    pub fn with_weights<S: Into<Selection>>(
        self,
        weights: S,
    ) -> Self {
        Self {
            weights: Some(weights.into()),
            ..self
        }
    }

    /// Set progress reporting.
    pub fn with_progress(
        self,
        progress: bool,
    ) -> Self {
        Self { progress, ..self }
    }

    /// Set the class count.
    pub fn with_num_classes(
        self,
        num_classes: usize,
    ) -> Self {
        Self {
            num_classes: Some(num_classes),
            ..self
        }
    }

    /// Set the keypoint count.
    pub fn with_num_keypoints(
        self,
        num_keypoints: usize,
    ) -> Self {
        Self {
            num_keypoints: Some(num_keypoints),
            ..self
        }
    }

    /// Select backbone weights.
    pub fn with_weights_backbone<S: Into<Selection>>(
        self,
        weights_backbone: S,
    ) -> Self {
        Self {
            weights_backbone: Some(weights_backbone.into()),
            ..self
        }
    }

    /// Set the trainable backbone stage count.
    pub fn with_trainable_backbone_layers(
        self,
        trainable_backbone_layers: usize,
    ) -> Self {
        Self {
            trainable_backbone_layers: Some(trainable_backbone_layers),
            ..self
        }
    }

    /// Set the deprecated ``pretrained`` flag.
    pub fn with_pretrained<F: Into<LegacyFlag>>(
        self,
        pretrained: F,
    ) -> Self {
        Self {
            pretrained: Some(pretrained.into()),
            ..self
        }
    }

    /// Set the deprecated ``pretrained_backbone`` flag.
    pub fn with_pretrained_backbone<F: Into<LegacyFlag>>(
        self,
        pretrained_backbone: F,
    ) -> Self {
        Self {
            pretrained_backbone: Some(pretrained_backbone.into()),
            ..self
        }
    }

    /// Set the head options.
    pub fn with_options(
        self,
        options: RcnnOptions,
    ) -> Self {
        Self { options, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = ModelRequest::new();
        assert!(request.weights.is_none());
        assert!(request.progress);
        assert!(request.pretrained.is_none());
        assert_eq!(request.options.min_size, 800);
    }

    #[test]
    fn test_builders() {
        let request = ModelRequest::new()
            .with_weights("Coco_V1")
            .with_progress(false)
            .with_num_classes(2)
            .with_num_keypoints(17)
            .with_weights_backbone(true)
            .with_trainable_backbone_layers(4)
            .with_pretrained("legacy")
            .with_pretrained_backbone(false);

        assert!(matches!(request.weights, Some(Selection::Name(ref n)) if n == "Coco_V1"));
        assert!(!request.progress);
        assert_eq!(request.num_classes, Some(2));
        assert_eq!(request.num_keypoints, Some(17));
        assert!(matches!(request.weights_backbone, Some(Selection::Flag(true))));
        assert_eq!(request.trainable_backbone_layers, Some(4));
        assert_eq!(request.pretrained, Some(LegacyFlag::Named("legacy".to_string())));
        assert_eq!(request.pretrained_backbone, Some(LegacyFlag::Bool(false)));
    }
}
