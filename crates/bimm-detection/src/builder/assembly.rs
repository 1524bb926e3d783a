//! # Model Assembly
//!
//! [`ModelAssembler`] runs the full build pipeline:
//!
//! 1. resolve the request ([`resolve`]),
//! 2. construct the backbone ([`BackboneProvider`]),
//! 3. wrap it in a feature extractor ([`FeaturePyramidWrapper`]),
//! 4. attach the task heads ([`TaskHeadConstructor`]),
//! 5. fetch and load the task weights ([`ParameterLoader`]), then apply
//!    the epsilon patch to the model's patched entry.
//!
//! Failures in resolution abort before anything is constructed; failures
//! while loading drop the partially built model.

use crate::builder::request::ModelRequest;
use crate::builder::resolve::{DetectionModelSpec, Resolution, ResolvedConfig, resolve};
use crate::cache::weights::RetrievalService;
use crate::errors::{ModelBuildError, Result};
use crate::layers::frozen_norm::EpsilonPatch;
use crate::models::detection::options::RcnnOptions;
use crate::weights::Weights;
use burn::prelude::Backend;
use std::path::Path;

/// The `eps` written by the post-load patch.
pub const PATCHED_EPS: f64 = 0.0;

/// Head sizes and options handed to a [`TaskHeadConstructor`].
#[derive(Debug, Clone, Copy)]
pub struct HeadHyperParams<'a> {
    /// Class count, including background.
    pub num_classes: usize,

    /// Keypoint count, for keypoint heads.
    pub num_keypoints: Option<usize>,

    /// Pass-through head options.
    pub options: &'a RcnnOptions,
}

/// Constructs a backbone, optionally loading backbone weights.
pub trait BackboneProvider<B: Backend> {
    /// The backbone module.
    type Backbone;

    /// Construct the backbone.
    ///
    /// # Arguments
    ///
    /// - `weights_backbone`: backbone weights to load, if any.
    /// - `progress`: report download progress.
    /// - `retrieval`: the retrieval service for `weights_backbone`.
    /// - `device`: the target device.
    fn construct(
        &self,
        weights_backbone: Option<&'static Weights>,
        progress: bool,
        retrieval: &dyn RetrievalService,
        device: &B::Device,
    ) -> Result<Self::Backbone>;
}

/// Wraps a backbone into a multi-scale feature extractor.
pub trait FeaturePyramidWrapper<B: Backend, Backbone> {
    /// The extractor module.
    type Extractor;

    /// Wrap `backbone`, leaving `trainable_layers` stages trainable.
    fn wrap(
        &self,
        backbone: Backbone,
        trainable_layers: usize,
        device: &B::Device,
    ) -> Self::Extractor;
}

/// Attaches task heads to a feature extractor.
pub trait TaskHeadConstructor<B: Backend, Extractor> {
    /// The complete model.
    type Model;

    /// Build the model.
    fn build(
        &self,
        extractor: Extractor,
        params: &HeadHyperParams<'_>,
        device: &B::Device,
    ) -> Self::Model;
}

/// Loads a parameter payload into a model.
pub trait ParameterLoader<B: Backend, M> {
    /// Load `payload` into `model`.
    ///
    /// Implementations must fail, not panic, on payloads that do not match
    /// the model.
    fn load(
        &self,
        model: M,
        payload: &Path,
        device: &B::Device,
    ) -> anyhow::Result<M>;
}

/// The build pipeline and its collaborators.
#[derive(Debug, Clone, Default)]
pub struct ModelAssembler<P, W, H, L, R> {
    /// Backbone provider.
    pub backbone: P,

    /// Feature extractor wrapper.
    pub fpn: W,

    /// Task head constructor.
    pub head: H,

    /// Parameter loader.
    pub loader: L,

    /// Weights retrieval.
    pub retrieval: R,
}

impl<P, W, H, L, R> ModelAssembler<P, W, H, L, R> {
    /// Resolve `request` and build the model.
    ///
    /// # Errors
    ///
    /// Any [`ModelBuildError`] from resolution, retrieval or loading.
    pub fn assemble<B: Backend>(
        &self,
        spec: &DetectionModelSpec,
        request: &ModelRequest,
        device: &B::Device,
    ) -> Result<H::Model>
    where
        P: BackboneProvider<B>,
        W: FeaturePyramidWrapper<B, P::Backbone>,
        H: TaskHeadConstructor<B, W::Extractor>,
        H::Model: EpsilonPatch,
        L: ParameterLoader<B, H::Model>,
        R: RetrievalService,
    {
        let Resolution { config, .. } = resolve(spec, request)?;
        self.assemble_resolved(spec, &config, &request.options, device)
    }

    /// Build the model for an already resolved configuration.
    pub fn assemble_resolved<B: Backend>(
        &self,
        spec: &DetectionModelSpec,
        config: &ResolvedConfig,
        options: &RcnnOptions,
        device: &B::Device,
    ) -> Result<H::Model>
    where
        P: BackboneProvider<B>,
        W: FeaturePyramidWrapper<B, P::Backbone>,
        H: TaskHeadConstructor<B, W::Extractor>,
        H::Model: EpsilonPatch,
        L: ParameterLoader<B, H::Model>,
        R: RetrievalService,
    {
        tracing::info!(
            model = spec.name,
            weights = ?config.weights.map(Weights::qualified_name),
            weights_backbone = ?config.weights_backbone.map(Weights::qualified_name),
            num_classes = config.num_classes,
            num_keypoints = ?config.num_keypoints,
            trainable_backbone_layers = config.trainable_backbone_layers,
            "assembling model"
        );

        let backbone = self.backbone.construct(
            config.weights_backbone,
            config.progress,
            &self.retrieval,
            device,
        )?;
        let extractor = self
            .fpn
            .wrap(backbone, config.trainable_backbone_layers, device);
        let model = self.head.build(
            extractor,
            &HeadHyperParams {
                num_classes: config.num_classes,
                num_keypoints: config.num_keypoints,
                options,
            },
            device,
        );

        let Some(weights) = config.weights else {
            return Ok(model);
        };

        let path = weights.fetch(&self.retrieval, config.progress)?;
        tracing::info!(weights = %weights, path = %path.display(), "loading weights");
        let model = self
            .loader
            .load(model, &path, device)
            .map_err(|source| ModelBuildError::LoadFailure {
                path: path.clone(),
                source,
            })?;

        if spec.eps_patched.is_some_and(|patched| patched.is(weights)) {
            tracing::info!(weights = %weights, eps = PATCHED_EPS, "overwriting frozen norm eps");
            return Ok(model.overwrite_eps(PATCHED_EPS));
        }

        Ok(model)
    }
}
