//! Synchronous prediction core.

use crate::core::config::{ConfigValidator, ServiceConfig};
use crate::core::errors::HistoResult;
use crate::core::inference::{ModelLoader, infer};
use crate::domain::{LabelTable, Prediction};
use crate::processors::{Postprocessor, Preprocessor};
use std::path::Path;
use tracing::info_span;

/// Classifies histology images with a lazily loaded, shared model.
///
/// `predict_blocking` does CPU-heavy work and must not be called on an async
/// executor thread; [`super::PredictionService`] moves it onto worker threads.
#[derive(Debug)]
pub struct TissueClassifier {
    loader: ModelLoader,
    preprocessor: Preprocessor,
    postprocessor: Postprocessor,
}

impl TissueClassifier {
    /// Creates a classifier. Nothing is read from disk until the first
    /// prediction.
    pub fn new(config: &ServiceConfig) -> HistoResult<Self> {
        config.validate()?;
        Ok(Self {
            loader: ModelLoader::new(config),
            preprocessor: Preprocessor::default(),
            postprocessor: Postprocessor::new(LabelTable::new(config.labels.iter().cloned())),
        })
    }

    /// Predicts the tissue class of the image at `image_path`.
    ///
    /// # Errors
    ///
    /// - [`crate::core::errors::HistoError::Load`] when the model can't be
    ///   loaded (identical on every call);
    /// - [`crate::core::errors::HistoError::Decode`] when the file is not a
    ///   decodable image;
    /// - [`crate::core::errors::HistoError::UnexpectedOutputShape`] when the
    ///   model output can't be interpreted.
    pub fn predict_blocking(&self, image_path: &Path) -> HistoResult<Prediction> {
        let _span = info_span!("predict", path = %image_path.display()).entered();

        let model = self.loader.get_or_load()?;
        let input = self.preprocessor.load_and_preprocess(image_path)?;
        let output = infer(&model, &input)?;
        self.postprocessor.apply(&output)
    }

    /// Loads the model now instead of on the first prediction.
    pub fn warm_up(&self) -> HistoResult<()> {
        self.loader.get_or_load()?;
        Ok(())
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn labels(&self) -> &LabelTable {
        self.postprocessor.labels()
    }
}
