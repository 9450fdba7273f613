//! Process-level configuration for the prediction service.
//!
//! The checkpoint path is fixed here at process configuration time; callers
//! only ever pass image paths per request.

use super::errors::{ConfigError, ConfigValidator};
use super::onnx::OrtSessionConfig;
use crate::core::constants::DEFAULT_MODEL_PATH;
use crate::domain::labels::default_labels;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Compute device preference, resolved once when the model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DevicePreference {
    /// Use an accelerator when one is available, otherwise the CPU.
    #[default]
    Auto,
    /// Always use the CPU.
    Cpu,
    /// Use the CUDA device with the given ordinal.
    Cuda(usize),
}

impl FromStr for DevicePreference {
    type Err = ConfigError;

    /// Parses `"auto"`, `"cpu"`, `"cuda"`/`"gpu"` (ordinal 0) or `"cuda:N"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let device = s.trim().to_lowercase();
        match device.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(ordinal) => ordinal.parse().map(Self::Cuda).map_err(|_| {
                    ConfigError::InvalidConfig {
                        message: format!("invalid CUDA device ordinal in '{s}'"),
                    }
                }),
                None => Err(ConfigError::InvalidConfig {
                    message: format!("unknown device '{s}'; use 'auto', 'cpu', 'cuda' or 'cuda:N'"),
                }),
            },
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePreference::Auto => write!(f, "auto"),
            DevicePreference::Cpu => write!(f, "cpu"),
            DevicePreference::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl TryFrom<String> for DevicePreference {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DevicePreference> for String {
    fn from(value: DevicePreference) -> Self {
        value.to_string()
    }
}

/// Configuration for [`crate::predictor::PredictionService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Path to the model checkpoint.
    #[serde(default = "ServiceConfig::default_model_path")]
    pub model_path: PathBuf,

    /// Compute device preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Size of the bounded inference worker pool.
    #[serde(default = "ServiceConfig::default_worker_threads")]
    pub worker_threads: usize,

    /// Class labels in training-time index order.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    /// ONNX Runtime options used when the checkpoint is a full model graph.
    #[serde(default)]
    pub ort_session: Option<OrtSessionConfig>,
}

impl ServiceConfig {
    fn default_model_path() -> PathBuf {
        PathBuf::from(DEFAULT_MODEL_PATH)
    }

    fn default_worker_threads() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Creates a configuration for the checkpoint at `model_path`.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Sets the checkpoint path.
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    /// Sets the device preference.
    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Sets the worker pool size.
    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    /// Replaces the label table.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the ONNX Runtime session options.
    pub fn with_ort_session(mut self, config: OrtSessionConfig) -> Self {
        self.ort_session = Some(config);
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            device: DevicePreference::default(),
            worker_threads: Self::default_worker_threads(),
            labels: default_labels(),
            ort_session: None,
        }
    }
}

impl ConfigValidator for ServiceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "model_path must not be empty".to_string(),
            });
        }
        self.validate_worker_threads(self.worker_threads)?;
        if self.labels.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "labels must contain at least one entry".to_string(),
            });
        }
        Ok(())
    }
}
