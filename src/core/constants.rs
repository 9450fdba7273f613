//! Constants used throughout the inference path.
//!
//! Preprocessing constants must match the transform the checkpoints were
//! trained with.

/// Length the shorter image side is resized to before cropping.
pub const RESIZE_SHORTER_SIDE: u32 = 256;

/// Side length of the square center crop fed to the network.
pub const CROP_SIZE: u32 = 224;

/// Number of color channels in the network input.
pub const INPUT_CHANNELS: usize = 3;

/// Per-channel mean used for normalization (R, G, B).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation used for normalization (R, G, B).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Number of tissue classes the default architecture is built with.
pub const DEFAULT_NUM_CLASSES: usize = 8;

/// Default checkpoint location, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "saved_models/global_model.safetensors";

/// Probability at or above which a single-logit output predicts class 1.
pub const BINARY_DECISION_THRESHOLD: f32 = 0.5;

/// Decimal places kept in the presented confidence.
pub const CONFIDENCE_DECIMALS: i32 = 4;

/// Maximum number of raw output values written to the diagnostic log.
pub const RAW_OUTPUT_SAMPLE_LEN: usize = 5;
