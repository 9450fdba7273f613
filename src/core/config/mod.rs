//! Configuration types for the inference service.

pub mod errors;
pub mod onnx;
pub mod service;

pub use errors::{ConfigError, ConfigValidator};
pub use onnx::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
pub use service::{DevicePreference, ServiceConfig};
