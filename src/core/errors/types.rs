//! Error enums shared across the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Stage of the request path an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Tensor construction or conversion.
    TensorOperation,
    /// Conversion of raw model output into a decision.
    PostProcessing,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
        }
    }
}

/// Reasons a checkpoint could not be turned into a ready model.
///
/// The loader memoizes its outcome for the lifetime of the process, failures
/// included, so every variant only carries owned data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The configured checkpoint path does not exist.
    #[error("model file not found at {}", .path.display())]
    ModelFileNotFound { path: PathBuf },

    /// The checkpoint decoded but matches none of the known encodings.
    #[error("unsupported checkpoint format: {found}")]
    UnsupportedCheckpointFormat { found: String },

    /// The parameter mapping does not fit the architecture.
    #[error("checkpoint parameters do not match the architecture: {message}")]
    ParameterMismatch { message: String },

    /// Reading the checkpoint from disk failed.
    #[error("failed to read checkpoint {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// The selected compute device could not be initialized.
    #[error("device selection failed: {message}")]
    Device { message: String },

    /// ONNX Runtime refused to build or configure a session.
    #[error("failed to create inference session: {message}")]
    Session { message: String },
}

/// Errors produced by the prediction path.
#[derive(Error, Debug)]
pub enum HistoError {
    /// The input image could not be decoded.
    #[error("failed to decode image {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The model could not be loaded (memoized for the process lifetime).
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The forward pass returned a shape the decision logic cannot interpret.
    #[error("unexpected model output shape: {shape}")]
    UnexpectedOutputShape { shape: String },

    /// The forward pass itself failed.
    #[error("inference failed for model '{model_name}': {context}")]
    Inference {
        model_name: String,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A pre- or post-processing step failed.
    #[error("{kind} failed: {context}")]
    Processing {
        kind: ProcessingStage,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid configuration.
    #[error("configuration: {message}")]
    ConfigError { message: String },

    /// The worker pool could not run or finish the job.
    #[error("inference worker unavailable: {message}")]
    WorkerUnavailable { message: String },

    /// Tensor shape error from ndarray.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),
}

/// Error carrying only a message, for wrapping conditions that have no source.
#[derive(Debug, Clone)]
pub struct OpaqueError(pub String);

impl std::fmt::Display for OpaqueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for OpaqueError {}
