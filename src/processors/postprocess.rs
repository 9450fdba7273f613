//! Conversion of raw model output into a labelled prediction.
//!
//! The same service serves checkpoints trained as single-logit binary
//! detectors and as the full multi-class classifier, so the decision branches
//! on the width of the class dimension:
//!
//! - one column: sigmoid, class 1 when `p >= 0.5` (confidence `p`), otherwise
//!   class 0 (confidence `1 - p`);
//! - more columns: softmax, the arg-max class with its probability.
//!
//! Only the first row of the batch is consumed.

use crate::core::constants::BINARY_DECISION_THRESHOLD;
use crate::core::errors::{HistoError, HistoResult, ProcessingStage};
use crate::core::tensor::{Tensor2D, TensorD};
use crate::domain::labels::LabelTable;
use crate::domain::prediction::{Decision, Prediction};
use ndarray::{ArrayView1, Axis, Ix2};
use tracing::info;

/// Sequence nesting levels unwrapped before giving up.
pub const MAX_SEQUENCE_NESTING: usize = 2;

/// Raw forward-pass output.
///
/// Some architectures return auxiliary outputs next to the primary logits;
/// those come back as a sequence whose first element is the primary output.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Tensor(TensorD),
    Sequence(Vec<RawOutput>),
}

impl RawOutput {
    /// Describes the output structure, e.g. `[1, 8]` or `([1, 8], [1, 96])`.
    pub fn shape_summary(&self) -> String {
        match self {
            RawOutput::Tensor(t) => format!("{:?}", t.shape()),
            RawOutput::Sequence(items) => {
                let inner: Vec<String> = items.iter().map(RawOutput::shape_summary).collect();
                format!("({})", inner.join(", "))
            }
        }
    }

    /// Returns the primary tensor, unwrapping at most [`MAX_SEQUENCE_NESTING`]
    /// levels of sequence nesting.
    pub fn primary(&self) -> HistoResult<&TensorD> {
        let mut current = self;
        for _ in 0..MAX_SEQUENCE_NESTING {
            match current {
                RawOutput::Tensor(t) => return Ok(t),
                RawOutput::Sequence(items) => {
                    current = items.first().ok_or_else(|| {
                        HistoError::unexpected_output_structure("empty output sequence")
                    })?;
                }
            }
        }
        match current {
            RawOutput::Tensor(t) => Ok(t),
            RawOutput::Sequence(_) => Err(HistoError::unexpected_output_structure(format!(
                "output nested deeper than {MAX_SEQUENCE_NESTING} sequences: {}",
                self.shape_summary()
            ))),
        }
    }
}

impl From<TensorD> for RawOutput {
    fn from(tensor: TensorD) -> Self {
        RawOutput::Tensor(tensor)
    }
}

/// Normalizes raw output to a `batch x classes` matrix.
///
/// Unwraps sequence nesting, then adds a batch dimension to 1-D output.
///
/// # Errors
///
/// Returns [`HistoError::UnexpectedOutputShape`] when the primary tensor is
/// not 2-D after that, or when it has no rows or no classes.
pub fn normalize_output(output: &RawOutput) -> HistoResult<Tensor2D> {
    let tensor = output.primary()?;
    let tensor = if tensor.ndim() == 1 {
        tensor.clone().insert_axis(Axis(0))
    } else {
        tensor.clone()
    };

    if tensor.ndim() != 2 {
        return Err(HistoError::unexpected_output_shape(tensor.shape()));
    }
    let (rows, cols) = (tensor.shape()[0], tensor.shape()[1]);
    if rows == 0 || cols == 0 {
        return Err(HistoError::unexpected_output_shape(tensor.shape()));
    }

    Ok(tensor.into_dimensionality::<Ix2>()?)
}

/// Logistic function.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax over one row of logits.
pub fn softmax(logits: ArrayView1<'_, f32>) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Applies the binary/multi-class decision procedure to the first row.
pub fn decide(logits: &Tensor2D) -> HistoResult<Decision> {
    if logits.nrows() == 0 || logits.ncols() == 0 {
        return Err(HistoError::unexpected_output_shape(logits.shape()));
    }
    let row = logits.row(0);

    let decision = if row.len() == 1 {
        let p = sigmoid(row[0]);
        if p >= BINARY_DECISION_THRESHOLD {
            Decision {
                class_index: 1,
                confidence: p,
            }
        } else {
            Decision {
                class_index: 0,
                confidence: 1.0 - p,
            }
        }
    } else {
        let probs = softmax(row);
        let (class_index, confidence) = probs.iter().copied().enumerate().fold(
            (0usize, f32::NEG_INFINITY),
            |(best_i, best_p), (i, p)| if p > best_p { (i, p) } else { (best_i, best_p) },
        );
        Decision {
            class_index,
            confidence,
        }
    };

    if !decision.confidence.is_finite() {
        return Err(HistoError::processing_message(
            ProcessingStage::PostProcessing,
            format!("model output produced a non-finite probability: {row:?}"),
        ));
    }
    Ok(decision)
}

/// Turns raw model output into a labelled, rounded prediction.
#[derive(Debug, Clone, Default)]
pub struct Postprocessor {
    labels: LabelTable,
}

impl Postprocessor {
    pub fn new(labels: LabelTable) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Runs the decision procedure and resolves the label.
    pub fn apply(&self, output: &RawOutput) -> HistoResult<Prediction> {
        let logits = normalize_output(output)?;
        let decision = decide(&logits)?;
        let prediction = Prediction::new(self.labels.lookup(decision.class_index), decision.confidence);
        info!(
            label = %prediction.label,
            confidence = prediction.confidence,
            class_index = decision.class_index,
            "postprocessed inference result"
        );
        Ok(prediction)
    }
}
