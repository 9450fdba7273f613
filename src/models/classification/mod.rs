//! Tissue classification networks.
//!
//! State-dict checkpoints run on the native candle implementation of
//! MobileNetV3-Small; full-model checkpoints run through ONNX Runtime.

pub mod backend;
pub mod graph;
pub mod mobilenetv3;
pub mod native;

pub use backend::{ClassifierBackend, TissueModel};
pub use graph::GraphClassifier;
pub use mobilenetv3::MobileNetV3Small;
pub use native::NativeClassifier;
