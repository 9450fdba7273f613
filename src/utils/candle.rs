//! Candle device selection and tensor conversion helpers.

use crate::core::config::DevicePreference;
use crate::core::errors::{HistoError, LoadError};
use crate::core::tensor::{Tensor4D, TensorD};
use candle_core::{DType, Device, Tensor};
use ndarray::IxDyn;
use tracing::{debug, warn};

/// Resolves a [`DevicePreference`] to a Candle [`Device`].
///
/// `Auto` prefers CUDA, then Metal, then the CPU; an accelerator that reports
/// as available but fails to initialize falls back to the CPU. An explicitly
/// requested CUDA device that cannot be created is an error.
pub fn select_device(preference: DevicePreference) -> Result<Device, LoadError> {
    match preference {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Cuda(ordinal) => Device::new_cuda(ordinal)
            .map_err(|e| LoadError::device(format!("failed to create CUDA device {ordinal}: {e}"))),
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                match Device::new_cuda(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => warn!("CUDA reported available but failed to initialize: {e}"),
                }
            }
            if candle_core::utils::metal_is_available() {
                match Device::new_metal(0) {
                    Ok(device) => return Ok(device),
                    Err(e) => warn!("Metal reported available but failed to initialize: {e}"),
                }
            }
            debug!("no accelerator available, using CPU");
            Ok(Device::Cpu)
        }
    }
}

/// Returns a short name for logging.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

/// Convert Candle error to HistoError for inference operations.
pub fn candle_to_inference(
    model_name: &str,
    context: impl Into<String>,
    err: candle_core::Error,
) -> HistoError {
    HistoError::inference_error(model_name, context, err)
}

/// Convert Candle error raised while binding parameters to a LoadError.
pub fn candle_to_load(context: &str, err: candle_core::Error) -> LoadError {
    LoadError::parameter_mismatch(format!("{context}: {err}"))
}

/// Copies an ndarray input tensor onto `device`.
pub fn tensor4d_to_candle(input: &Tensor4D, device: &Device) -> candle_core::Result<Tensor> {
    let shape = input.shape().to_vec();
    let data: Vec<f32> = input.iter().copied().collect();
    Tensor::from_vec(data, shape, device)
}

/// Copies a Candle tensor of any rank back to the host as an f32 ndarray.
pub fn candle_to_tensord(tensor: &Tensor) -> Result<TensorD, HistoError> {
    let dims = tensor.dims().to_vec();
    let data = tensor
        .to_device(&Device::Cpu)
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(|e| HistoError::tensor_operation("copy model output to host", e))?;
    Ok(TensorD::from_shape_vec(IxDyn(&dims), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_preference_is_cpu() {
        let device = select_device(DevicePreference::Cpu).unwrap();
        assert!(device.is_cpu());
        assert_eq!(device_name(&device), "cpu");
    }

    #[test]
    fn test_auto_always_yields_a_device() {
        assert!(select_device(DevicePreference::Auto).is_ok());
    }

    #[test]
    fn test_tensor_round_trip_keeps_layout() {
        let input = Tensor4D::from_shape_fn((1, 3, 2, 2), |(_, c, y, x)| (c * 4 + y * 2 + x) as f32);
        let candle = tensor4d_to_candle(&input, &Device::Cpu).unwrap();
        assert_eq!(candle.dims(), &[1, 3, 2, 2]);

        let back = candle_to_tensord(&candle).unwrap();
        assert_eq!(back.shape(), &[1, 3, 2, 2]);
        assert_eq!(back[[0, 2, 1, 0].as_slice()], 10.0);
    }
}
