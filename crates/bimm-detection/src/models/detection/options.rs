//! # R-CNN Head Options
//!
//! Pass-through options for the detection heads. The resolution pipeline
//! never inspects these; the head constructor sizes the heads from them and
//! the built model keeps them for its input transform.
//!
//! Sampling, NMS and score thresholds belong to the detection inference
//! pipeline, which this crate does not provide.

use burn::config::Config;

/// R-CNN head options.
///
/// Defaults follow the torchvision R-CNN family.
#[derive(Config, Debug)]
pub struct RcnnOptions {
    /// Target length of the shorter image side.
    #[config(default = 800)]
    pub min_size: usize,

    /// Upper bound on the longer image side.
    #[config(default = 1333)]
    pub max_size: usize,

    /// Per-channel input normalization mean.
    #[config(default = "vec![0.485, 0.456, 0.406]")]
    pub image_mean: Vec<f64>,

    /// Per-channel input normalization std.
    #[config(default = "vec![0.229, 0.224, 0.225]")]
    pub image_std: Vec<f64>,

    /// Anchor aspect ratios; one anchor per ratio per location.
    #[config(default = "vec![0.5, 1.0, 2.0]")]
    pub rpn_aspect_ratios: Vec<f64>,

    /// Box ROI pooling output size.
    #[config(default = 7)]
    pub box_roi_output_size: usize,

    /// Box head representation size.
    #[config(default = 1024)]
    pub box_representation_size: usize,

    /// Keypoint head conv layer widths.
    #[config(default = "vec![512; 8]")]
    pub keypoint_head_layers: Vec<usize>,
}

impl Default for RcnnOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RcnnOptions {
    /// Anchors per feature map location.
    pub fn num_anchors(&self) -> usize {
        self.rpn_aspect_ratios.len()
    }

    /// Resize factor for a ``[height, width]`` image.
    ///
    /// Scales the shorter side to `min_size`, unless that would push the
    /// longer side past `max_size`.
    pub fn resize_scale(
        &self,
        [height, width]: [usize; 2],
    ) -> f64 {
        let short = height.min(width) as f64;
        let long = height.max(width) as f64;
        (self.min_size as f64 / short).min(self.max_size as f64 / long)
    }

    /// The ``[height, width]`` of an image after resizing.
    pub fn resized_shape(
        &self,
        shape: [usize; 2],
    ) -> [usize; 2] {
        let scale = self.resize_scale(shape);
        shape.map(|side| ((side as f64 * scale).floor() as usize).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RcnnOptions::default();
        assert_eq!(options.min_size, 800);
        assert_eq!(options.max_size, 1333);
        assert_eq!(options.num_anchors(), 3);
        assert_eq!(options.image_mean.len(), 3);
        assert_eq!(options.keypoint_head_layers, vec![512; 8]);

        let options = options.with_min_size(320);
        assert_eq!(options.min_size, 320);
    }

    #[test]
    fn test_resize() {
        let options = RcnnOptions::default();

        // Short side bound.
        assert_eq!(options.resize_scale([400, 600]), 2.0);
        assert_eq!(options.resized_shape([400, 600]), [800, 1200]);

        // Long side bound.
        let options = options.with_min_size(100).with_max_size(150);
        assert_eq!(options.resize_scale([100, 300]), 0.5);
        assert_eq!(options.resized_shape([100, 300]), [50, 150]);
        assert_eq!(options.resized_shape([300, 100]), [150, 50]);
    }
}
