//! The seam between the loader and the concrete network implementations.

use crate::core::Tensor4D;
use crate::core::errors::HistoResult;
use crate::models::checkpoint::CheckpointVariant;
use crate::processors::RawOutput;
use std::fmt;

/// A model ready for inference.
pub trait ClassifierBackend: Send + Sync + fmt::Debug {
    /// Runs one forward pass over a `(batch, 3, h, w)` tensor.
    fn forward(&self, input: &Tensor4D) -> HistoResult<RawOutput>;

    /// Name used in logs and error context.
    fn name(&self) -> &str;

    /// Device the backend executes on.
    fn device(&self) -> String;
}

/// A loaded model and what it was loaded from.
#[derive(Debug)]
pub struct TissueModel {
    backend: Box<dyn ClassifierBackend>,
    variant: CheckpointVariant,
}

impl TissueModel {
    pub fn new(backend: Box<dyn ClassifierBackend>, variant: CheckpointVariant) -> Self {
        Self { backend, variant }
    }

    pub fn forward(&self, input: &Tensor4D) -> HistoResult<RawOutput> {
        self.backend.forward(input)
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn device(&self) -> String {
        self.backend.device()
    }

    /// Checkpoint encoding the model was loaded from.
    pub fn variant(&self) -> CheckpointVariant {
        self.variant
    }
}
