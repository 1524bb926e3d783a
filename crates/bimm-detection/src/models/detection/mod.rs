//! # `ResNet-50` FPN Detectors
//!
//! * [`keypoint_rcnn::keypointrcnn_resnet50_fpn`] - person keypoint detection.
//! * [`faster_rcnn::fasterrcnn_resnet50_fpn`] - COCO box detection.
//!
//! Both builders share the same collaborators: [`backbone::ResNetBodyProvider`],
//! [`backbone::ResNetFpnWrapper`], [`detection_io::PyTorchCheckpointLoader`];
//! and the same head options, [`options::RcnnOptions`].

pub mod backbone;
pub mod detection_io;
pub mod faster_rcnn;
pub mod fpn;
pub mod keypoint_rcnn;
pub mod options;
pub mod pretrained;
pub mod roi_heads;
pub mod rpn;
