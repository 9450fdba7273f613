//! Forward pass with best-effort diagnostics.

use crate::core::Tensor4D;
use crate::core::constants::RAW_OUTPUT_SAMPLE_LEN;
use crate::core::errors::{HistoError, HistoResult};
use crate::models::classification::TissueModel;
use crate::processors::RawOutput;
use ndarray::Axis;
use tracing::{info, warn};

/// Runs the model on a preprocessed tensor and logs the raw output.
pub fn infer(model: &TissueModel, input: &Tensor4D) -> HistoResult<RawOutput> {
    let output = model.forward(input)?;
    log_raw_output(&output);
    Ok(output)
}

/// Logs the output shape and the leading values of the first batch row.
///
/// Never fails; problems building the sample are logged as warnings.
pub fn log_raw_output(output: &RawOutput) {
    match raw_output_sample(output) {
        Ok(sample) => info!(
            shape = %output.shape_summary(),
            sample = ?sample,
            "model raw output"
        ),
        Err(e) => warn!(
            shape = %output.shape_summary(),
            "could not sample raw model output: {e}"
        ),
    }
}

fn raw_output_sample(output: &RawOutput) -> HistoResult<Vec<f32>> {
    let tensor = output.primary()?;
    if tensor.ndim() == 0 || tensor.len_of(Axis(0)) == 0 {
        return Err(HistoError::unexpected_output_shape(tensor.shape()));
    }
    Ok(tensor
        .index_axis(Axis(0), 0)
        .iter()
        .take(RAW_OUTPUT_SAMPLE_LEN)
        .copied()
        .collect())
}
