//! # Request Resolution
//!
//! [`resolve`] turns a [`ModelRequest`] into a [`ResolvedConfig`]:
//!
//! 1. legacy flags are translated into selections,
//! 2. selections are verified against the model's registries,
//! 3. head sizes are derived from (and checked against) the task weights,
//! 4. the trainable backbone stage count is computed.
//!
//! Resolution has no side effects beyond `tracing` events; nothing is
//! constructed or downloaded.

use crate::builder::legacy::{
    DeprecationNotice, LegacyVariant, PRETRAINED, PRETRAINED_BACKBONE, normalize_selection,
};
use crate::builder::reconcile::reconcile;
use crate::builder::request::ModelRequest;
use crate::builder::trainable::resolve_trainable_layers;
use crate::errors::Result;
use crate::weights::{Weights, WeightsRegistry};
use serde::Serialize;

/// Static description of a buildable detection model.
#[derive(Debug)]
pub struct DetectionModelSpec {
    /// Builder name.
    pub name: &'static str,

    /// Task weights registry.
    pub weights: &'static WeightsRegistry,

    /// Backbone weights registry.
    pub weights_backbone: &'static WeightsRegistry,

    /// Named ``pretrained`` values selecting older task entries.
    pub legacy_variants: &'static [LegacyVariant],

    /// The entry selected by a truthy ``pretrained`` flag.
    pub pretrained_fallback: &'static Weights,

    /// The entry selected by a truthy ``pretrained_backbone`` flag.
    pub pretrained_backbone_fallback: &'static Weights,

    /// Class count without task weights.
    pub default_num_classes: usize,

    /// Keypoint count without task weights; `None` for models without a
    /// keypoint branch.
    pub default_num_keypoints: Option<usize>,

    /// The number of freezable backbone stages.
    pub max_trainable_layers: usize,

    /// The trainable stage count when pretrained.
    pub default_trainable_layers: usize,

    /// The task entry whose frozen norms get ``eps = 0.0`` after loading.
    pub eps_patched: Option<&'static Weights>,
}

/// A fully resolved build configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Builder name.
    pub model: &'static str,

    /// Task weights to load.
    pub weights: Option<&'static Weights>,

    /// Backbone weights to load; always `None` when `weights` is set.
    pub weights_backbone: Option<&'static Weights>,

    /// Class count, including background.
    pub num_classes: usize,

    /// Keypoint count, for keypoint models.
    pub num_keypoints: Option<usize>,

    /// Trainable backbone stages.
    pub trainable_backbone_layers: usize,

    /// Report download progress.
    pub progress: bool,
}

impl ResolvedConfig {
    /// Task or backbone weights are in use.
    pub fn any_pretrained(&self) -> bool {
        self.weights.is_some() || self.weights_backbone.is_some()
    }

    /// A serializable summary.
    pub fn summary(&self) -> ResolvedSummary {
        ResolvedSummary {
            model: self.model.to_string(),
            weights: self.weights.map(Weights::qualified_name),
            weights_backbone: self.weights_backbone.map(Weights::qualified_name),
            num_classes: self.num_classes,
            num_keypoints: self.num_keypoints,
            trainable_backbone_layers: self.trainable_backbone_layers,
        }
    }
}

/// Serializable view of a [`ResolvedConfig`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSummary {
    /// Builder name.
    pub model: String,

    /// Qualified task weights name.
    pub weights: Option<String>,

    /// Qualified backbone weights name.
    pub weights_backbone: Option<String>,

    /// Class count.
    pub num_classes: usize,

    /// Keypoint count.
    pub num_keypoints: Option<usize>,

    /// Trainable backbone stages.
    pub trainable_backbone_layers: usize,
}

/// Resolution result.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The resolved configuration.
    pub config: ResolvedConfig,

    /// Deprecation notices raised, in order; each was also logged.
    pub notices: Vec<DeprecationNotice>,
}

fn warn_all(
    model: &str,
    notices: &[DeprecationNotice],
) {
    for notice in notices {
        tracing::warn!(model, "{notice}");
    }
}

/// Resolve a request against a model spec.
///
/// # Errors
///
/// - [`crate::errors::ModelBuildError::InvalidSelection`] for selections outside
///   of the registries.
/// - [`crate::errors::ModelBuildError::OverrideConflict`] for explicit head sizes
///   contradicting the task weights.
/// - [`crate::errors::ModelBuildError::OutOfRange`] for trainable layer counts
///   above the maximum.
pub fn resolve(
    spec: &DetectionModelSpec,
    request: &ModelRequest,
) -> Result<Resolution> {
    let mut notices = Vec::new();

    let selection = normalize_selection(
        PRETRAINED,
        request.pretrained.clone(),
        request.weights.clone(),
        spec.legacy_variants,
        spec.pretrained_fallback,
    );
    warn_all(spec.name, &selection.notices);
    notices.extend(selection.notices);
    let weights = spec.weights.verify(selection.value.as_ref())?;

    let selection = normalize_selection(
        PRETRAINED_BACKBONE,
        request.pretrained_backbone.clone(),
        request.weights_backbone.clone(),
        &[],
        spec.pretrained_backbone_fallback,
    );
    warn_all(spec.name, &selection.notices);
    notices.extend(selection.notices);
    let mut weights_backbone = spec.weights_backbone.verify(selection.value.as_ref())?;

    if spec.default_num_keypoints.is_none() && request.num_keypoints.is_some() {
        tracing::warn!(
            model = spec.name,
            "num_keypoints is ignored by models without a keypoint head"
        );
    }

    let (num_classes, num_keypoints) = match weights {
        Some(w) => {
            if weights_backbone.take().is_some() {
                tracing::debug!(
                    model = spec.name,
                    "weights_backbone is superseded by the task weights"
                );
            }
            let num_classes = reconcile("num_classes", request.num_classes, w.meta.num_classes())?;
            let num_keypoints = match spec.default_num_keypoints {
                Some(default) => Some(reconcile(
                    "num_keypoints",
                    request.num_keypoints,
                    w.meta.num_keypoints().unwrap_or(default),
                )?),
                None => None,
            };
            (num_classes, num_keypoints)
        }
        None => (
            request.num_classes.unwrap_or(spec.default_num_classes),
            spec.default_num_keypoints
                .map(|default| request.num_keypoints.unwrap_or(default)),
        ),
    };

    let trainable_backbone_layers = resolve_trainable_layers(
        weights.is_some() || weights_backbone.is_some(),
        request.trainable_backbone_layers,
        spec.max_trainable_layers,
        spec.default_trainable_layers,
    )?;

    let config = ResolvedConfig {
        model: spec.name,
        weights,
        weights_backbone,
        num_classes,
        num_keypoints,
        trainable_backbone_layers,
        progress: request.progress,
    };
    tracing::debug!(summary = ?config.summary(), "resolved model config");

    Ok(Resolution { config, notices })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::legacy::NoticeKind;
    use crate::errors::ModelBuildError;
    use crate::weights::{Categories, EvalTransform, Selection, WeightsMeta};
    use hamcrest::prelude::*;

    pub static TASK_OLD: Weights = Weights {
        name: "Old_V1",
        registry: "Task_Weights",
        url: "https://example.com/models/task-old.pth",
        transforms: EvalTransform::CocoEval,
        meta: WeightsMeta {
            categories: Categories::Named(&["bg", "a", "b"]),
            keypoint_names: Some(&["k0", "k1", "k2", "k3"]),
            recipe: None,
            metrics: &[],
        },
    };

    pub static TASK_NEW: Weights = Weights {
        name: "New_V1",
        registry: "Task_Weights",
        url: "https://example.com/models/task-new.pth",
        transforms: EvalTransform::CocoEval,
        meta: WeightsMeta {
            categories: Categories::Named(&["bg", "a", "b"]),
            keypoint_names: Some(&["k0", "k1", "k2", "k3"]),
            recipe: None,
            metrics: &[],
        },
    };

    pub static TASK_WEIGHTS: WeightsRegistry = WeightsRegistry {
        name: "Task_Weights",
        entries: &[&TASK_OLD, &TASK_NEW],
        default: &TASK_NEW,
    };

    pub static BODY_V1: Weights = Weights {
        name: "Body_V1",
        registry: "Body_Weights",
        url: "https://example.com/models/body-v1.pth",
        transforms: EvalTransform::ImageClassification {
            crop_size: 224,
            resize_size: 256,
        },
        meta: WeightsMeta {
            categories: Categories::Count(1000),
            keypoint_names: None,
            recipe: None,
            metrics: &[],
        },
    };

    pub static BODY_V2: Weights = Weights {
        name: "Body_V2",
        registry: "Body_Weights",
        url: "https://example.com/models/body-v2.pth",
        transforms: EvalTransform::ImageClassification {
            crop_size: 224,
            resize_size: 232,
        },
        meta: WeightsMeta {
            categories: Categories::Count(1000),
            keypoint_names: None,
            recipe: None,
            metrics: &[],
        },
    };

    pub static BODY_WEIGHTS: WeightsRegistry = WeightsRegistry {
        name: "Body_Weights",
        entries: &[&BODY_V1, &BODY_V2],
        default: &BODY_V2,
    };

    pub static KEYPOINT_SPEC: DetectionModelSpec = DetectionModelSpec {
        name: "task_keypoints",
        weights: &TASK_WEIGHTS,
        weights_backbone: &BODY_WEIGHTS,
        legacy_variants: &[LegacyVariant {
            flag: "legacy",
            weights: &TASK_OLD,
        }],
        pretrained_fallback: &TASK_NEW,
        pretrained_backbone_fallback: &BODY_V1,
        default_num_classes: 2,
        default_num_keypoints: Some(17),
        max_trainable_layers: 5,
        default_trainable_layers: 3,
        eps_patched: Some(&TASK_NEW),
    };

    pub static BOX_SPEC: DetectionModelSpec = DetectionModelSpec {
        name: "task_boxes",
        weights: &TASK_WEIGHTS,
        weights_backbone: &BODY_WEIGHTS,
        legacy_variants: &[],
        pretrained_fallback: &TASK_NEW,
        pretrained_backbone_fallback: &BODY_V1,
        default_num_classes: 91,
        default_num_keypoints: None,
        max_trainable_layers: 5,
        default_trainable_layers: 3,
        eps_patched: None,
    };

    fn kinds(notices: &[DeprecationNotice]) -> Vec<NoticeKind> {
        notices.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn test_no_weights() {
        let resolution = resolve(&KEYPOINT_SPEC, &ModelRequest::new()).unwrap();
        let config = resolution.config;
        assert!(resolution.notices.is_empty());
        assert!(config.weights.is_none());
        assert!(config.weights_backbone.is_none());
        assert!(!config.any_pretrained());
        assert_that!(config.num_classes, is(equal_to(2)));
        assert_eq!(config.num_keypoints, Some(17));
        assert_that!(config.trainable_backbone_layers, is(equal_to(5)));
    }

    #[test]
    fn test_no_weights_explicit_sizes() {
        let request = ModelRequest::new()
            .with_num_classes(7)
            .with_num_keypoints(5)
            .with_trainable_backbone_layers(1);
        let config = resolve(&KEYPOINT_SPEC, &request).unwrap().config;
        assert_eq!(config.num_classes, 7);
        assert_eq!(config.num_keypoints, Some(5));
        // Nothing is pretrained: every stage trains.
        assert_eq!(config.trainable_backbone_layers, 5);
    }

    #[test]
    fn test_task_weights() {
        let request = ModelRequest::new()
            .with_weights(&TASK_OLD)
            .with_weights_backbone("Body_V2")
            .with_num_classes(3);
        let config = resolve(&KEYPOINT_SPEC, &request).unwrap().config;
        assert!(config.weights.unwrap().is(&TASK_OLD));
        assert!(config.weights_backbone.is_none());
        assert!(config.any_pretrained());
        assert_eq!(config.num_classes, 3);
        assert_eq!(config.num_keypoints, Some(4));
        assert_eq!(config.trainable_backbone_layers, 3);

        let summary = config.summary();
        assert_eq!(summary.weights.as_deref(), Some("Task_Weights.Old_V1"));
        assert_eq!(summary.weights_backbone, None);
    }

    #[test]
    fn test_conflicts() {
        let request = ModelRequest::new().with_weights("New_V1").with_num_classes(5);
        match resolve(&KEYPOINT_SPEC, &request).unwrap_err() {
            ModelBuildError::OverrideConflict {
                param,
                expected,
                actual,
            } => {
                assert_eq!(param, "num_classes");
                assert_eq!(expected, 3);
                assert_eq!(actual, 5);
            }
            err => panic!("unexpected error: {err}"),
        }

        let request = ModelRequest::new().with_weights("New_V1").with_num_keypoints(17);
        assert!(matches!(
            resolve(&KEYPOINT_SPEC, &request).unwrap_err(),
            ModelBuildError::OverrideConflict {
                param: "num_keypoints",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_selections() {
        let request = ModelRequest::new().with_weights("Body_V1");
        assert!(matches!(
            resolve(&KEYPOINT_SPEC, &request).unwrap_err(),
            ModelBuildError::InvalidSelection {
                registry: "Task_Weights",
                ..
            }
        ));

        let request = ModelRequest::new().with_weights_backbone(&TASK_NEW);
        assert!(matches!(
            resolve(&KEYPOINT_SPEC, &request).unwrap_err(),
            ModelBuildError::InvalidSelection {
                registry: "Body_Weights",
                ..
            }
        ));
    }

    #[test]
    fn test_trainable_layers_out_of_range() {
        let request = ModelRequest::new()
            .with_weights_backbone(&BODY_V2)
            .with_trainable_backbone_layers(6);
        assert!(matches!(
            resolve(&KEYPOINT_SPEC, &request).unwrap_err(),
            ModelBuildError::OutOfRange {
                requested: 6,
                max: 5
            }
        ));

        let request = ModelRequest::new()
            .with_weights_backbone(&BODY_V2)
            .with_trainable_backbone_layers(0);
        let config = resolve(&KEYPOINT_SPEC, &request).unwrap().config;
        assert_eq!(config.trainable_backbone_layers, 0);
        assert!(config.weights_backbone.unwrap().is(&BODY_V2));
    }

    #[test]
    fn test_legacy_flags() {
        let request = ModelRequest::new().with_pretrained(true);
        let resolution = resolve(&KEYPOINT_SPEC, &request).unwrap();
        assert!(resolution.config.weights.unwrap().is(&TASK_NEW));
        assert_eq!(kinds(&resolution.notices), vec![NoticeKind::Keyword]);

        let request = ModelRequest::new().with_pretrained("legacy");
        let config = resolve(&KEYPOINT_SPEC, &request).unwrap().config;
        assert!(config.weights.unwrap().is(&TASK_OLD));

        let request = ModelRequest::new().with_weights(true);
        let resolution = resolve(&KEYPOINT_SPEC, &request).unwrap();
        assert!(resolution.config.weights.unwrap().is(&TASK_NEW));
        assert_eq!(
            kinds(&resolution.notices),
            vec![NoticeKind::Positional, NoticeKind::Keyword]
        );

        let request = ModelRequest::new().with_pretrained_backbone(true);
        let resolution = resolve(&KEYPOINT_SPEC, &request).unwrap();
        assert!(resolution.config.weights_backbone.unwrap().is(&BODY_V1));
        assert_eq!(resolution.notices[0].pair, PRETRAINED_BACKBONE);
        assert_eq!(resolution.config.trainable_backbone_layers, 3);

        let request = ModelRequest::new()
            .with_weights(&TASK_OLD)
            .with_pretrained(false);
        let resolution = resolve(&KEYPOINT_SPEC, &request).unwrap();
        assert!(resolution.config.weights.is_none());
        assert_eq!(
            kinds(&resolution.notices),
            vec![NoticeKind::Keyword, NoticeKind::Overridden]
        );
    }

    #[test]
    fn test_false_flag_in_weights_slot() {
        let request = ModelRequest::new().with_weights(Selection::Flag(false));
        assert!(matches!(
            resolve(&KEYPOINT_SPEC, &request).unwrap_err(),
            ModelBuildError::InvalidSelection { .. }
        ));
    }

    #[test]
    fn test_box_spec() {
        let config = resolve(&BOX_SPEC, &ModelRequest::new().with_num_keypoints(3))
            .unwrap()
            .config;
        assert_eq!(config.num_classes, 91);
        assert_eq!(config.num_keypoints, None);

        let config = resolve(&BOX_SPEC, &ModelRequest::new().with_weights("default"))
            .unwrap()
            .config;
        assert!(config.weights.unwrap().is(&TASK_NEW));
        assert_eq!(config.num_classes, 3);
        assert_eq!(config.num_keypoints, None);
    }

    #[test]
    fn test_request_is_not_modified() {
        let request = ModelRequest::new()
            .with_pretrained(true)
            .with_weights_backbone("Body_V1");
        let before = format!("{request:?}");
        resolve(&KEYPOINT_SPEC, &request).unwrap();
        assert_eq!(format!("{request:?}"), before);
    }
}
