//! Process-scoped, memoized model loading.
//!
//! The first caller of [`ModelLoader::get_or_load`] reads the checkpoint,
//! resolves it, places the model on the selected device and switches it to
//! evaluation mode. Concurrent first callers block on the same initialization
//! and share its result. The outcome is cached for the lifetime of the loader,
//! failures included: a missing checkpoint keeps failing with the same error
//! until the process is restarted.

use crate::core::config::{DevicePreference, OrtSessionConfig, ServiceConfig};
use crate::core::errors::LoadError;
use crate::models::checkpoint::{
    ResolvedCheckpoint, architecture_registry, decode_checkpoint, resolve_checkpoint,
};
use crate::models::classification::{GraphClassifier, NativeClassifier, TissueModel};
use crate::utils::candle::{device_name, select_device};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info};

pub struct ModelLoader {
    model_path: PathBuf,
    device: DevicePreference,
    session_pool_size: usize,
    ort_session: Option<OrtSessionConfig>,
    cached: OnceCell<Result<Arc<TissueModel>, LoadError>>,
    load_count: AtomicUsize,
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("model_path", &self.model_path)
            .field("device", &self.device)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ModelLoader {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            device: config.device,
            session_pool_size: config.worker_threads.max(1),
            ort_session: config.ort_session.clone(),
            cached: OnceCell::new(),
            load_count: AtomicUsize::new(0),
        }
    }

    /// Returns the cached model, loading it on the first call.
    ///
    /// # Errors
    ///
    /// The [`LoadError`] of the first load attempt, on this and every later
    /// call.
    pub fn get_or_load(&self) -> Result<Arc<TissueModel>, LoadError> {
        self.cached
            .get_or_init(|| {
                self.load_count.fetch_add(1, Ordering::SeqCst);
                let result = self.load().map(Arc::new);
                if let Err(e) = &result {
                    error!(path = %self.model_path.display(), "model load failed: {e}");
                }
                result
            })
            .clone()
    }

    /// Number of load sequences executed so far (0 or 1).
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// True once a model has been loaded successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(self.cached.get(), Some(Ok(_)))
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn load(&self) -> Result<TissueModel, LoadError> {
        let registry = architecture_registry();
        info!(path = %self.model_path.display(), "loading model checkpoint");

        match self.model_path.try_exists() {
            Ok(true) => {}
            Ok(false) => {
                return Err(LoadError::ModelFileNotFound {
                    path: self.model_path.clone(),
                });
            }
            Err(e) => return Err(LoadError::io(&self.model_path, e)),
        }
        let bytes =
            std::fs::read(&self.model_path).map_err(|e| LoadError::io(&self.model_path, e))?;

        let raw = decode_checkpoint(bytes);
        let resolved = resolve_checkpoint(raw, registry)?;
        let variant = resolved.variant();
        info!(variant = %variant, "resolved checkpoint");

        let model = match resolved {
            ResolvedCheckpoint::FullModel(graph) => {
                let name = self
                    .model_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("onnx_model");
                let backend = GraphClassifier::from_memory(
                    &graph,
                    name,
                    self.session_pool_size,
                    self.device,
                    self.ort_session.as_ref(),
                )?;
                TissueModel::new(Box::new(backend), variant)
            }
            ResolvedCheckpoint::StateDict(state_dict) => {
                if let Some(legacy) = state_dict.architecture.migrated_from {
                    info!(
                        legacy,
                        current = state_dict.architecture.id,
                        "migrated legacy architecture"
                    );
                }
                let device = select_device(self.device)?;
                info!(device = device_name(&device), "selected compute device");
                let mut backend = NativeClassifier::from_state_dict(state_dict, device)?;
                backend.eval();
                TissueModel::new(Box::new(backend), variant)
            }
        };

        info!(
            path = %self.model_path.display(),
            device = %model.device(),
            "model loaded from {}",
            self.model_path.display()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckpointVariant;
    use crate::models::classification::MobileNetV3Small;
    use crate::core::Tensor4D;
    use crate::models::fixtures::{MALFORMED_GRAPH, OnnxGraphFixture, SafetensorsFixture};
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use std::thread;

    fn write_checkpoint(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("global_model.safetensors");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn random_checkpoint() -> Vec<u8> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        MobileNetV3Small::load(vb, 8).unwrap();
        SafetensorsFixture::new().varmap(&varmap, "").to_bytes()
    }

    fn loader_for(path: &Path) -> ModelLoader {
        ModelLoader::new(
            &ServiceConfig::new(path)
                .with_device(DevicePreference::Cpu)
                .with_worker_threads(2),
        )
    }

    #[test]
    fn test_missing_checkpoint_fails_identically_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_for(&dir.path().join("absent.safetensors"));

        let first = loader.get_or_load().unwrap_err();
        assert!(matches!(first, LoadError::ModelFileNotFound { .. }));
        assert_eq!(loader.get_or_load().unwrap_err(), first);
        assert_eq!(loader.load_count(), 1);
        assert!(!loader.is_loaded());
    }

    #[test]
    fn test_failure_is_not_healed_by_restoring_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global_model.safetensors");
        let loader = loader_for(&path);
        assert!(loader.get_or_load().is_err());

        std::fs::write(&path, random_checkpoint()).unwrap();
        assert!(matches!(
            loader.get_or_load(),
            Err(LoadError::ModelFileNotFound { .. })
        ));
    }

    #[test]
    fn test_unsupported_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), b"PK\x03\x04 torch zip");
        let err = loader_for(&path).get_or_load().unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedCheckpointFormat { .. }));
    }

    #[test]
    fn test_unreadable_checkpoint_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("weights.txt");
        std::fs::write(&not_a_dir, b"plain file").unwrap();

        let err = loader_for(&not_a_dir.join("global_model.safetensors"))
            .get_or_load()
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "{err:?}");

        let err = loader_for(dir.path()).get_or_load().unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "{err:?}");
    }

    #[test]
    fn test_onnx_graph_loads_as_full_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global_model.onnx");
        std::fs::write(&path, OnnxGraphFixture::channel_mean(3, 224).to_bytes()).unwrap();
        let loader = loader_for(&path);

        let model = loader.get_or_load().unwrap();
        assert_eq!(model.variant(), CheckpointVariant::FullModel);
        assert_eq!(model.device(), "onnxruntime:cpu");
        assert_eq!(model.name(), "global_model");

        let input = Tensor4D::from_shape_fn((1, 3, 224, 224), |(_, c, _, _)| [0.5, 2.0, -1.0][c]);
        let logits = model.forward(&input).unwrap();
        assert_eq!(logits.shape_summary(), "[1, 3]");
        assert!(Arc::ptr_eq(&model, &loader.get_or_load().unwrap()));
    }

    #[test]
    fn test_malformed_onnx_graph_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), MALFORMED_GRAPH);
        let loader = loader_for(&path);

        let err = loader.get_or_load().unwrap_err();
        assert!(
            matches!(err, LoadError::UnsupportedCheckpointFormat { .. }),
            "{err:?}"
        );
        assert_eq!(loader.get_or_load().unwrap_err(), err);
        assert_eq!(loader.load_count(), 1);
    }

    #[test]
    fn test_load_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), &random_checkpoint());
        let loader = loader_for(&path);

        let a = loader.get_or_load().unwrap();
        let b = loader.get_or_load().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.variant(), CheckpointVariant::StateDict);
        assert_eq!(a.device(), "cpu");
        assert!(loader.is_loaded());
        assert_eq!(loader.load_count(), 1);
    }

    #[test]
    fn test_concurrent_first_callers_share_one_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_checkpoint(dir.path(), &random_checkpoint());
        let loader = loader_for(&path);

        let models: Vec<Arc<TissueModel>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| loader.get_or_load())).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });

        assert_eq!(loader.load_count(), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
