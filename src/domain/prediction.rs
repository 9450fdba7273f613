//! Prediction result types.

use serde::{Deserialize, Serialize};

use crate::core::constants::CONFIDENCE_DECIMALS;

/// Outcome of the decision procedure before label resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Predicted class index.
    pub class_index: usize,
    /// Probability of the predicted class, unrounded.
    pub confidence: f32,
}

/// Result of one `predict` call.
///
/// Serializes to exactly `{"label": ..., "confidence": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Tissue tag, or the class index as a string when the label table has
    /// no entry for it.
    pub label: String,
    /// Probability in `[0, 1]`, rounded to four decimal places.
    pub confidence: f64,
}

impl Prediction {
    /// Builds a presentation result from a label and a raw probability.
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: round_confidence(confidence),
        }
    }

    /// Serializes the result as a JSON object string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Rounds a probability to [`CONFIDENCE_DECIMALS`] places.
pub fn round_confidence(confidence: f32) -> f64 {
    let factor = 10f64.powi(CONFIDENCE_DECIMALS);
    (f64::from(confidence) * factor).round() / factor
}
