//! ONNX Runtime backend for full-model checkpoints.
//!
//! Sessions are pooled; each forward pass takes the next session round-robin
//! and holds its lock only for the duration of `run`.

use super::backend::ClassifierBackend;
use crate::core::Tensor4D;
use crate::core::config::{
    DevicePreference, OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig,
};
use crate::core::errors::{HistoError, HistoResult, LoadError, OpaqueError};
use crate::core::tensor::TensorD;
use crate::processors::RawOutput;
use ndarray::IxDyn;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::value::TensorRef;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

pub struct GraphClassifier {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_names: Vec<String>,
    model_name: String,
    providers: Vec<OrtExecutionProvider>,
}

impl std::fmt::Debug for GraphClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClassifier")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_names", &self.output_names)
            .field("model_name", &self.model_name)
            .finish()
    }
}

/// Execution providers implied by a device preference when the session
/// options don't list any.
pub fn providers_for_device(device: DevicePreference) -> Vec<OrtExecutionProvider> {
    match device {
        DevicePreference::Cpu => vec![OrtExecutionProvider::CPU],
        DevicePreference::Cuda(ordinal) => vec![
            OrtExecutionProvider::CUDA {
                device_id: Some(ordinal as i32),
            },
            OrtExecutionProvider::CPU,
        ],
        DevicePreference::Auto if cfg!(feature = "cuda") => vec![
            OrtExecutionProvider::CUDA { device_id: None },
            OrtExecutionProvider::CPU,
        ],
        DevicePreference::Auto => vec![OrtExecutionProvider::CPU],
    }
}

impl GraphClassifier {
    /// Builds a pool of `pool_size` sessions over the serialized graph.
    pub fn from_memory(
        model_bytes: &[u8],
        model_name: &str,
        pool_size: usize,
        device: DevicePreference,
        options: Option<&OrtSessionConfig>,
    ) -> Result<Self, LoadError> {
        let pool_size = pool_size.max(1);
        let providers = options
            .and_then(|cfg| cfg.execution_providers.clone())
            .unwrap_or_else(|| providers_for_device(device));

        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let builder = Session::builder()
                .and_then(|b| b.with_log_level(LogLevel::Error))
                .map_err(LoadError::session)?;
            let builder = Self::apply_ort_config(builder, options, pool_size, &providers)
                .map_err(LoadError::session)?;
            let session = builder
                .commit_from_memory(model_bytes)
                .map_err(|e| LoadError::unsupported(format!("ONNX graph rejected by runtime: {e}")))?;
            sessions.push(Mutex::new(session));
        }

        let (input_name, output_names) = {
            let first = &sessions[0];
            let session = first
                .lock()
                .map_err(|_| LoadError::session("session lock poisoned"))?;
            let input = session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .ok_or_else(|| LoadError::unsupported("ONNX graph without inputs"))?;
            let outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
            if outputs.is_empty() {
                return Err(LoadError::unsupported("ONNX graph without outputs"));
            }
            (input, outputs)
        };
        info!(
            sessions = pool_size,
            input = %input_name,
            outputs = ?output_names,
            providers = ?providers,
            "created ONNX Runtime session pool"
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_names,
            model_name: model_name.to_string(),
            providers,
        })
    }

    /// Intra-op thread count for each pooled session: the configured value,
    /// else one thread per session when more than one session is pooled.
    fn intra_threads(options: Option<&OrtSessionConfig>, pool_size: usize) -> Option<usize> {
        options
            .and_then(|cfg| cfg.intra_threads)
            .or((pool_size > 1).then_some(1))
    }

    fn apply_ort_config(
        mut builder: SessionBuilder,
        options: Option<&OrtSessionConfig>,
        pool_size: usize,
        providers: &[OrtExecutionProvider],
    ) -> Result<SessionBuilder, ort::Error> {
        if let Some(intra) = Self::intra_threads(options, pool_size) {
            builder = builder.with_intra_threads(intra)?;
        }
        if let Some(cfg) = options {
            if let Some(inter) = cfg.inter_threads {
                builder = builder.with_inter_threads(inter)?;
            }
            if let Some(level) = cfg.optimization_level {
                use OrtGraphOptimizationLevel as OG;
                use ort::session::builder::GraphOptimizationLevel as GOL;
                let mapped = match level {
                    OG::DisableAll => GOL::Disable,
                    OG::Level1 => GOL::Level1,
                    OG::Level2 => GOL::Level2,
                    OG::Level3 => GOL::Level3,
                };
                builder = builder.with_optimization_level(mapped)?;
            }
        }
        let providers = Self::build_execution_providers(providers);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        Ok(builder)
    }

    fn build_execution_providers(eps: &[OrtExecutionProvider]) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        for ep in eps {
            match ep {
                OrtExecutionProvider::CPU => {
                    providers.push(ort::execution_providers::CPUExecutionProvider::default().build());
                }
                #[cfg(feature = "cuda")]
                OrtExecutionProvider::CUDA { device_id } => {
                    let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
                    if let Some(id) = device_id {
                        cuda = cuda.with_device_id(*id);
                    }
                    providers.push(cuda.build());
                }
                #[cfg(not(feature = "cuda"))]
                OrtExecutionProvider::CUDA { .. } => {
                    tracing::warn!("CUDA execution provider requested but the cuda feature is disabled");
                }
            }
        }
        providers
    }
}

impl ClassifierBackend for GraphClassifier {
    fn forward(&self, input: &Tensor4D) -> HistoResult<RawOutput> {
        let input_tensor = TensorRef::from_array_view(input.view()).map_err(|e| {
            HistoError::inference_error(&self.model_name, "convert input tensor", e)
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock().map_err(|_| {
            HistoError::inference_error(
                &self.model_name,
                format!("acquire session {idx}/{}", self.sessions.len()),
                OpaqueError("session lock poisoned".to_string()),
            )
        })?;
        let outputs = session
            .run(inputs)
            .map_err(|e| HistoError::inference_error(&self.model_name, "forward pass", e))?;

        let mut tensors = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let (shape, data) = outputs[name.as_str()].try_extract_tensor::<f32>().map_err(|e| {
                HistoError::inference_error(
                    &self.model_name,
                    format!("extract output '{name}' as f32"),
                    e,
                )
            })?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            let tensor = TensorD::from_shape_vec(IxDyn(&dims), data.to_vec())?;
            tensors.push(RawOutput::Tensor(tensor));
        }

        if tensors.len() == 1 {
            Ok(tensors.remove(0))
        } else {
            Ok(RawOutput::Sequence(tensors))
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> String {
        match self.providers.first() {
            Some(OrtExecutionProvider::CUDA { device_id }) => {
                format!("onnxruntime:cuda:{}", device_id.unwrap_or(0))
            }
            _ => "onnxruntime:cpu".to_string(),
        }
    }
}
