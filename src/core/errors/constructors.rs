//! Error constructor utilities.
//!
//! Helper functions for building [`HistoError`] and [`LoadError`] values with
//! consistent context strings. Library code maps foreign errors (candle, ONNX
//! Runtime, image) through these instead of formatting messages ad hoc.

use super::types::{HistoError, LoadError, OpaqueError, ProcessingStage};
use std::path::Path;

impl HistoError {
    /// Internal helper to build a Processing error with minimal boilerplate.
    #[inline]
    fn processing_with_context(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an error for tensor construction or conversion failures.
    pub fn tensor_operation(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::TensorOperation, context, error)
    }

    /// Creates an error for post-processing failures.
    pub fn post_processing(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::PostProcessing, context, error)
    }

    /// Creates an error for a failed forward pass.
    pub fn inference_error(
        model_name: &str,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.to_string(),
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an error for an image that could not be decoded.
    pub fn decode(path: &Path, error: image::ImageError) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            source: error,
        }
    }

    /// Creates an error for a raw output tensor with an uninterpretable shape.
    pub fn unexpected_output_shape(shape: &[usize]) -> Self {
        Self::UnexpectedOutputShape {
            shape: format!("{shape:?}"),
        }
    }

    /// Creates an error for raw output that is not a tensor at the expected depth.
    pub fn unexpected_output_structure(description: impl Into<String>) -> Self {
        Self::UnexpectedOutputShape {
            shape: description.into(),
        }
    }

    /// Creates an error for configuration errors.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates an error for a job the worker pool could not complete.
    pub fn worker_unavailable(message: impl Into<String>) -> Self {
        Self::WorkerUnavailable {
            message: message.into(),
        }
    }

    /// Creates a processing error with only a message.
    pub fn processing_message(kind: ProcessingStage, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::processing_with_context(kind, message.clone(), OpaqueError(message))
    }

    /// Returns true if retrying the call cannot succeed without a restart or a
    /// configuration change.
    ///
    /// Load errors are memoized and shape errors reproduce deterministically;
    /// decode errors are local to one input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HistoError::Load(_) | HistoError::UnexpectedOutputShape { .. }
        )
    }

    /// Returns the load error if this is one.
    pub fn as_load_error(&self) -> Option<&LoadError> {
        match self {
            HistoError::Load(err) => Some(err),
            _ => None,
        }
    }
}

impl LoadError {
    /// Creates an IO error for the checkpoint at `path`.
    pub fn io(path: &Path, error: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    /// Creates an unsupported-format error naming what was found.
    pub fn unsupported(found: impl Into<String>) -> Self {
        Self::UnsupportedCheckpointFormat {
            found: found.into(),
        }
    }

    /// Creates a parameter mismatch error.
    pub fn parameter_mismatch(message: impl Into<String>) -> Self {
        Self::ParameterMismatch {
            message: message.into(),
        }
    }

    /// Creates a session error from an ONNX Runtime failure.
    pub fn session(error: impl std::fmt::Display) -> Self {
        Self::Session {
            message: error.to_string(),
        }
    }

    /// Creates a device error.
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_load_errors_are_fatal() {
        let err: HistoError = LoadError::unsupported("pickle stream").into();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "unsupported checkpoint format: pickle stream"
        );
        assert!(matches!(
            err.as_load_error(),
            Some(LoadError::UnsupportedCheckpointFormat { .. })
        ));
    }

    #[test]
    fn test_decode_error_is_not_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "garbage");
        let err = HistoError::decode(Path::new("upload.png"), image::ImageError::IoError(io));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("upload.png"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_processing_errors_name_their_stage() {
        let err = HistoError::processing_message(ProcessingStage::PostProcessing, "NaN logits");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "post-processing failed: NaN logits");

        let io = std::io::Error::other("device lost");
        let err = HistoError::tensor_operation("copy model output to host", io);
        match &err {
            HistoError::Processing { kind, .. } => {
                assert_eq!(*kind, ProcessingStage::TensorOperation)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "tensor operation failed: copy model output to host"
        );
    }

    #[test]
    fn test_unexpected_output_shape_reports_shape() {
        let err = HistoError::unexpected_output_shape(&[1, 3, 7, 7]);
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "unexpected model output shape: [1, 3, 7, 7]");
    }

    #[test]
    fn test_load_error_clone_is_identical() {
        let err = LoadError::ModelFileNotFound {
            path: "missing.safetensors".into(),
        };
        assert_eq!(err.clone(), err);
        assert_eq!(err.to_string(), "model file not found at missing.safetensors");
    }
}
