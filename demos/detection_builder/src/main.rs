use bimm_detection::builder::request::ModelRequest;
use bimm_detection::builder::resolve::{DetectionModelSpec, resolve};
use bimm_detection::models::detection::faster_rcnn::fasterrcnn_resnet50_fpn;
use bimm_detection::models::detection::keypoint_rcnn::keypointrcnn_resnet50_fpn;
use bimm_detection::models::detection::pretrained::{
    FASTERRCNN_RESNET50_FPN, KEYPOINTRCNN_RESNET50_FPN,
};
use burn::backend::NdArray;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    Keypoint,
    Faster,
}

impl Model {
    fn spec(&self) -> &'static DetectionModelSpec {
        match self {
            Model::Keypoint => &KEYPOINTRCNN_RESNET50_FPN,
            Model::Faster => &FASTERRCNN_RESNET50_FPN,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Model family.
    #[arg(long, value_enum, default_value = "keypoint")]
    model: Model,

    /// Task weights name; ``default`` selects the registry default.
    #[arg(long)]
    weights: Option<String>,

    /// Backbone weights name.
    #[arg(long)]
    weights_backbone: Option<String>,

    /// Deprecated ``pretrained`` flag: ``true``, ``false`` or a variant name.
    #[arg(long)]
    pretrained: Option<String>,

    /// Deprecated ``pretrained_backbone`` flag.
    #[arg(long)]
    pretrained_backbone: Option<bool>,

    #[arg(long)]
    num_classes: Option<usize>,

    #[arg(long)]
    num_keypoints: Option<usize>,

    #[arg(long)]
    trainable_backbone_layers: Option<usize>,

    /// Hide download progress.
    #[arg(long, default_value = "false")]
    quiet: bool,

    /// Build the model (downloading weights) after resolving.
    #[arg(long, default_value = "false")]
    build: bool,
}

impl Args {
    fn request(&self) -> ModelRequest {
        let mut request = ModelRequest::new().with_progress(!self.quiet);
        request.weights = self.weights.clone().map(Into::into);
        request.weights_backbone = self.weights_backbone.clone().map(Into::into);
        request.pretrained = self.pretrained.as_deref().map(|flag| match flag {
            "true" => true.into(),
            "false" => false.into(),
            name => name.into(),
        });
        request.pretrained_backbone = self.pretrained_backbone.map(Into::into);
        request.num_classes = self.num_classes;
        request.num_keypoints = self.num_keypoints;
        request.trainable_backbone_layers = self.trainable_backbone_layers;
        request
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let request = args.request();

    let resolution = resolve(args.model.spec(), &request)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&resolution.config.summary())?
    );
    for notice in &resolution.notices {
        println!("deprecated: {notice}");
    }

    if !args.build {
        return Ok(());
    }

    type B = NdArray;
    let device = Default::default();
    match args.model {
        Model::Keypoint => {
            let model = keypointrcnn_resnet50_fpn::<B>(request, &device)?;
            tracing::info!(
                num_classes = model.num_classes(),
                num_keypoints = model.num_keypoints(),
                "built model"
            );
        }
        Model::Faster => {
            let model = fasterrcnn_resnet50_fpn::<B>(request, &device)?;
            tracing::info!(num_classes = model.num_classes(), "built model");
        }
    }

    Ok(())
}
