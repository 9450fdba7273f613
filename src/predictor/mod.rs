//! Prediction entry points.
//!
//! [`TissueClassifier`] is the synchronous core; [`PredictionService`] wraps
//! it for async callers, running each prediction on a bounded worker pool.

pub mod service;
pub mod tissue_classifier;
pub mod workers;

pub use service::PredictionService;
pub use tissue_classifier::TissueClassifier;
pub use workers::InferencePool;
