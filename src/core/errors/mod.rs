//! Error types for the inference service.
//!
//! Errors fall into two groups. Load errors ([`LoadError`]) describe why the
//! checkpoint could not be turned into a ready model; they are memoized by the
//! loader together with the rest of the load outcome, so they are plain data
//! and `Clone`. Everything else is a [`HistoError`] produced per call.
//!
//! # Usage
//!
//! ```rust
//! use histo_infer::core::errors::{HistoError, LoadError};
//!
//! let err: HistoError = LoadError::ModelFileNotFound {
//!     path: "saved_models/global_model.safetensors".into(),
//! }
//! .into();
//! assert!(err.is_fatal());
//!
//! let shape_err = HistoError::unexpected_output_shape(&[1, 8, 2]);
//! assert!(shape_err.to_string().contains("[1, 8, 2]"));
//! ```

pub mod constructors;
pub mod types;

pub use types::{HistoError, LoadError, OpaqueError, ProcessingStage};

/// Convenient result alias for inference operations.
pub type HistoResult<T> = Result<T, HistoError>;
