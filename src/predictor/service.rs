//! Async prediction facade.

use super::tissue_classifier::TissueClassifier;
use super::workers::InferencePool;
use crate::core::config::ServiceConfig;
use crate::core::errors::{HistoError, HistoResult};
use crate::domain::Prediction;
use std::path::PathBuf;
use std::sync::Arc;

/// Entry point for request handlers.
///
/// Cheap to clone; clones share the model cache and the worker pool.
#[derive(Debug, Clone)]
pub struct PredictionService {
    classifier: Arc<TissueClassifier>,
    pool: Arc<InferencePool>,
}

impl PredictionService {
    /// Creates the service and starts its worker pool.
    pub fn new(config: ServiceConfig) -> HistoResult<Self> {
        let classifier = TissueClassifier::new(&config)?;
        let pool = InferencePool::new(config.worker_threads)?;
        Ok(Self {
            classifier: Arc::new(classifier),
            pool: Arc::new(pool),
        })
    }

    /// Classifies the image at `image_path` on the worker pool.
    ///
    /// The first call in the process also loads the model; concurrent first
    /// calls wait for that single load.
    pub async fn predict(&self, image_path: impl Into<PathBuf>) -> HistoResult<Prediction> {
        let image_path = image_path.into();
        let classifier = Arc::clone(&self.classifier);
        self.pool
            .run(move || classifier.predict_blocking(&image_path))
            .await
    }

    /// Like [`Self::predict`], returning the `{"label", "confidence"}` JSON
    /// payload stored alongside the upload.
    pub async fn predict_json(&self, image_path: impl Into<PathBuf>) -> HistoResult<String> {
        let prediction = self.predict(image_path).await?;
        prediction
            .to_json()
            .map_err(|e| HistoError::post_processing("serialize prediction", e))
    }

    /// Loads the model on the worker pool ahead of the first request.
    pub async fn warm_up(&self) -> HistoResult<()> {
        let classifier = Arc::clone(&self.classifier);
        self.pool.run(move || classifier.warm_up()).await
    }

    pub fn classifier(&self) -> &TissueClassifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DevicePreference;
    use crate::core::errors::LoadError;
    use crate::models::checkpoint::ARCHITECTURE_METADATA_KEY;
    use crate::models::classification::MobileNetV3Small;
    use crate::models::fixtures::{OnnxGraphFixture, SafetensorsFixture};
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    fn random_weights(num_classes: usize) -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        MobileNetV3Small::load(vb, num_classes).unwrap();
        varmap
    }

    fn tile() -> RgbImage {
        RgbImage::from_fn(300, 260, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        })
    }

    fn write_tile(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        tile().save(&path).unwrap();
        path
    }

    fn service_for(dir: &TempDir, checkpoint: &[u8]) -> PredictionService {
        let model_path = dir.path().join("global_model.safetensors");
        std::fs::write(&model_path, checkpoint).unwrap();
        PredictionService::new(
            ServiceConfig::new(model_path)
                .with_device(DevicePreference::Cpu)
                .with_worker_threads(4),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_first_calls_load_once() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = SafetensorsFixture::new().varmap(&random_weights(8), "").to_bytes();
        let service = service_for(&dir, &bytes);
        let image = write_tile(dir.path(), "tile.png");

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let service = service.clone();
                let image = image.clone();
                tokio::spawn(async move { service.predict(image).await })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }
        assert_eq!(service.classifier().loader().load_count(), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert!((0.0..=1.0).contains(&results[0].confidence));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prediction_is_idempotent_across_image_formats() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = SafetensorsFixture::new().varmap(&random_weights(8), "").to_bytes();
        let service = service_for(&dir, &bytes);

        let png = service.predict(write_tile(dir.path(), "tile.png")).await.unwrap();
        let again = service.predict(write_tile(dir.path(), "tile.png")).await.unwrap();
        let bmp = service.predict(write_tile(dir.path(), "tile.bmp")).await.unwrap();
        assert_eq!(png, again);
        assert_eq!(png, bmp);
        assert!(service.classifier().labels().labels().contains(&png.label));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_checkpoint_encodings_predict_identically() {
        let weights = random_weights(8);
        let encodings = [
            SafetensorsFixture::new().varmap(&weights, "").to_bytes(),
            SafetensorsFixture::new()
                .varmap(&weights, "state_dict.")
                .f32("optimizer.state.0.step", &[1], vec![120.0])
                .metadata("epoch", "30")
                .to_bytes(),
            SafetensorsFixture::new()
                .varmap(&weights, "model.")
                .metadata(
                    ARCHITECTURE_METADATA_KEY,
                    "models.mobilenetv3.MobileNetV3Classifier",
                )
                .to_bytes(),
        ];

        let mut predictions = Vec::new();
        for bytes in &encodings {
            let dir = tempfile::tempdir().unwrap();
            let service = service_for(&dir, bytes);
            let image = write_tile(dir.path(), "tile.png");
            predictions.push(service.predict(image).await.unwrap());
        }
        assert_eq!(predictions[0], predictions[1]);
        assert_eq!(predictions[0], predictions[2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_onnx_checkpoint_predicts_dominant_channel() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("global_model.onnx");
        std::fs::write(&model_path, OnnxGraphFixture::channel_mean(3, 224).to_bytes()).unwrap();
        let service = PredictionService::new(
            ServiceConfig::new(model_path)
                .with_device(DevicePreference::Cpu)
                .with_worker_threads(2)
                .with_labels(["RED", "GREEN", "BLUE"]),
        )
        .unwrap();

        let image = dir.path().join("green.png");
        RgbImage::from_pixel(240, 240, Rgb([0, 255, 0])).save(&image).unwrap();
        let prediction = service.predict(image).await.unwrap();
        assert_eq!(prediction.label, "GREEN");

        let logits = [-0.485f32 / 0.229, (1.0 - 0.456) / 0.224, -0.406 / 0.225];
        let total: f32 = logits.iter().map(|l| l.exp()).sum();
        let expected = logits[1].exp() / total;
        assert!((prediction.confidence - f64::from(expected)).abs() < 1e-3);

        let model = service.classifier().loader().get_or_load().unwrap();
        assert_eq!(model.variant(), crate::models::CheckpointVariant::FullModel);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_checkpoint_fails_every_call() {
        let dir = tempfile::tempdir().unwrap();
        let service = PredictionService::new(
            ServiceConfig::new(dir.path().join("absent.safetensors"))
                .with_device(DevicePreference::Cpu)
                .with_worker_threads(1),
        )
        .unwrap();
        let image = write_tile(dir.path(), "tile.png");

        for _ in 0..3 {
            let err = service.predict(image.clone()).await.unwrap_err();
            assert!(err.is_fatal());
            assert!(matches!(
                err.as_load_error(),
                Some(LoadError::ModelFileNotFound { .. })
            ));
        }
        assert_eq!(service.classifier().loader().load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_for(&dir, b"\x80\x02}q\x00(X\x05\x00\x00\x00epochq\x01K\x1eu.");
        let err = service
            .predict(write_tile(dir.path(), "tile.png"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_load_error(),
            Some(LoadError::UnsupportedCheckpointFormat { found }) if found == "pickle stream"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_decode_error_leaves_model_cached() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = SafetensorsFixture::new().varmap(&random_weights(8), "").to_bytes();
        let service = service_for(&dir, &bytes);
        service.warm_up().await.unwrap();

        let bogus = dir.path().join("upload.png");
        std::fs::write(&bogus, b"definitely not an image").unwrap();
        let err = service.predict(bogus).await.unwrap_err();
        assert!(matches!(err, HistoError::Decode { .. }));
        assert!(!err.is_fatal());

        assert!(service.predict(write_tile(dir.path(), "tile.png")).await.is_ok());
        assert!(service.classifier().loader().is_loaded());
        assert_eq!(service.classifier().loader().load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_binary_checkpoint_uses_threshold_labels() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = SafetensorsFixture::new().varmap(&random_weights(1), "").to_bytes();
        let model_path = dir.path().join("binary.safetensors");
        std::fs::write(&model_path, bytes).unwrap();
        let service = PredictionService::new(
            ServiceConfig::new(model_path)
                .with_device(DevicePreference::Cpu)
                .with_worker_threads(1)
                .with_labels(["NEG", "POS"]),
        )
        .unwrap();

        let json = service
            .predict_json(write_tile(dir.path(), "tile.png"))
            .await
            .unwrap();
        let prediction: Prediction = serde_json::from_str(&json).unwrap();
        assert!(prediction.label == "NEG" || prediction.label == "POS");
        assert!(prediction.confidence >= 0.5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = PredictionService::new(ServiceConfig::new("model.safetensors").with_worker_threads(0))
            .unwrap_err();
        assert!(matches!(err, HistoError::ConfigError { .. }));
    }
}
