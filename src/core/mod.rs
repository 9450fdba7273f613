//! Core building blocks of the inference service.
//!
//! - Configuration ([`config`])
//! - Constants shared by pre- and post-processing ([`constants`])
//! - Error types ([`errors`])
//! - Model loading and execution ([`inference`])
//! - Tensor aliases ([`tensor`])

pub mod config;
pub mod constants;
pub mod errors;
pub mod inference;
pub mod tensor;

pub use config::{ConfigError, ConfigValidator, DevicePreference, ServiceConfig};
pub use constants::*;
pub use errors::{HistoError, HistoResult, LoadError, ProcessingStage};
pub use inference::ModelLoader;
pub use tensor::{Tensor2D, Tensor4D, TensorD};

/// Initializes the tracing subscriber for logging.
///
/// Sets up the tracing subscriber with an environment filter (`RUST_LOG`) and
/// a formatting layer. Call once at the start of an application.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
