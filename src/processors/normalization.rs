//! Per-channel image normalization.
//!
//! Converts an 8-bit RGB image into a normalized `f32` tensor in NCHW layout
//! with a leading batch dimension of one.

use crate::core::constants::{IMAGENET_MEAN, IMAGENET_STD, INPUT_CHANNELS};
use crate::core::errors::{HistoError, HistoResult};
use crate::core::tensor::Tensor4D;
use image::RgbImage;

/// Normalizes images with a fused scale/mean/std transform.
///
/// Each channel value `v` becomes `v * alpha[c] + beta[c]`, where
/// `alpha = scale / std` and `beta = -mean / std`. With the default scale of
/// `1/255` this is `(v / 255 - mean) / std`.
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    /// Scaling factors for each channel (alpha = scale / std)
    pub alpha: [f32; 3],
    /// Offset values for each channel (beta = -mean / std)
    pub beta: [f32; 3],
}

impl NormalizeImage {
    /// Creates a normalizer.
    ///
    /// # Errors
    ///
    /// Returns an error if the scale or any standard deviation is not a
    /// positive finite number.
    pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3]) -> HistoResult<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(HistoError::config_error(format!(
                "normalization scale must be greater than 0, got {scale}"
            )));
        }
        for (i, &s) in std.iter().enumerate() {
            if !(s.is_finite() && s > 0.0) {
                return Err(HistoError::config_error(format!(
                    "standard deviation at index {i} must be greater than 0, got {s}"
                )));
            }
        }

        let alpha = std.map(|s| scale / s);
        let mut beta = [0.0f32; 3];
        for c in 0..3 {
            beta[c] = -mean[c] / std[c];
        }
        Ok(Self { alpha, beta })
    }

    /// Creates the ImageNet normalizer used at training time.
    pub fn imagenet() -> Self {
        let alpha = IMAGENET_STD.map(|s| (1.0 / 255.0) / s);
        let mut beta = [0.0f32; 3];
        for c in 0..3 {
            beta[c] = -IMAGENET_MEAN[c] / IMAGENET_STD[c];
        }
        Self { alpha, beta }
    }

    /// Normalizes `img` into a `1 x 3 x H x W` tensor, channels in R, G, B order.
    pub fn normalize_to_tensor(&self, img: &RgbImage) -> Tensor4D {
        let (width, height) = img.dimensions();
        let mut tensor = Tensor4D::zeros((1, INPUT_CHANNELS, height as usize, width as usize));

        for (x, y, pixel) in img.enumerate_pixels() {
            for c in 0..INPUT_CHANNELS {
                tensor[[0, c, y as usize, x as usize]] =
                    f32::from(pixel[c]) * self.alpha[c] + self.beta[c];
            }
        }
        tensor
    }
}

impl Default for NormalizeImage {
    fn default() -> Self {
        Self::imagenet()
    }
}
