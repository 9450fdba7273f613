//! Image preprocessing and output postprocessing.
//!
//! # Modules
//!
//! * `normalization` - Per-channel scale/mean/std normalization into NCHW tensors
//! * `resize_crop` - Shorter-side resize and center crop
//! * `preprocess` - The full decode, resize, crop, normalize chain
//! * `postprocess` - Raw output normalization and the binary/multi-class decision

pub mod normalization;
pub mod postprocess;
pub mod preprocess;
pub mod resize_crop;

pub use normalization::NormalizeImage;
pub use postprocess::{Postprocessor, RawOutput, decide, normalize_output, sigmoid, softmax};
pub use preprocess::{PreprocessConfig, Preprocessor};
pub use resize_crop::{center_crop, resize_shorter_side};
