//! # histo-infer
//!
//! Histology tissue classification: turns an image tile into a tissue label
//! with a confidence score, using a trained MobileNetV3 classifier whose
//! checkpoint encoding is resolved at load time.
//!
//! ## Features
//!
//! - Memoized, single-flight model loading shared by all callers
//! - Checkpoints as ONNX graphs, flat safetensors state dicts, or training
//!   checkpoints with the state dict nested under `state_dict`
//! - Legacy architecture identifiers redirected through a migration table
//! - Binary (single logit) and multi-class decision procedures
//! - Async facade over a bounded worker pool
//!
//! ## Modules
//!
//! * [`core`] - Configuration, errors, model loading and execution
//! * [`domain`] - Label table and prediction results
//! * [`models`] - Checkpoint resolution and the network implementations
//! * [`predictor`] - Synchronous classifier and async service
//! * [`processors`] - Preprocessing and postprocessing
//! * [`utils`] - Image decoding and candle helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use histo_infer::prelude::*;
//!
//! # async fn run() -> Result<(), HistoError> {
//! let service = PredictionService::new(
//!     ServiceConfig::new("saved_models/global_model.safetensors")
//!         .with_device(DevicePreference::Auto),
//! )?;
//!
//! let prediction = service.predict("uploads/tile.png").await?;
//! println!("{} ({:.4})", prediction.label, prediction.confidence);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod models;
pub mod predictor;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use histo_infer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::config::{DevicePreference, OrtSessionConfig, ServiceConfig};
    pub use crate::core::errors::{HistoError, HistoResult, LoadError};
    pub use crate::domain::{LabelTable, Prediction, TissueClass};
    pub use crate::predictor::{PredictionService, TissueClassifier};
}
