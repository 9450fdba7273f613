//! Image to tensor pipeline for the tissue classifier.
//!
//! Steps, in order: decode and force RGB, resize the shorter side to 256,
//! center crop 224x224, scale to `[0, 1]` and normalize per channel. The
//! output always has shape `1 x 3 x 224 x 224`.

use super::normalization::NormalizeImage;
use super::resize_crop::{center_crop, resize_shorter_side};
use crate::core::constants::{CROP_SIZE, INPUT_CHANNELS, RESIZE_SHORTER_SIDE};
use crate::core::errors::HistoResult;
use crate::core::tensor::Tensor4D;
use crate::utils::image::load_image;
use image::RgbImage;
use image::imageops::FilterType;
use std::path::Path;

/// Configuration for the classification preprocessing pipeline.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Target length of the shorter side after resizing
    pub resize_shorter_side: u32,
    /// Side of the square center crop
    pub crop_size: u32,
    /// Resizing filter to use
    pub resize_filter: FilterType,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_shorter_side: RESIZE_SHORTER_SIDE,
            crop_size: CROP_SIZE,
            resize_filter: FilterType::Triangle,
        }
    }
}

/// Deterministic preprocessing from image file to network input.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
    normalizer: NormalizeImage,
}

impl Preprocessor {
    /// Returns the shape of every tensor this pipeline produces.
    pub fn output_shape(&self) -> [usize; 4] {
        let side = self.config.crop_size as usize;
        [1, INPUT_CHANNELS, side, side]
    }

    /// Decodes the image at `path` and preprocesses it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::errors::HistoError::Decode`] if the file cannot
    /// be decoded as an image.
    pub fn load_and_preprocess(&self, path: &Path) -> HistoResult<Tensor4D> {
        let img = load_image(path)?;
        Ok(self.preprocess(&img))
    }

    /// Preprocesses an already decoded RGB image.
    pub fn preprocess(&self, img: &RgbImage) -> Tensor4D {
        let resized = resize_shorter_side(
            img,
            self.config.resize_shorter_side,
            self.config.resize_filter,
        );
        let cropped = center_crop(&resized, self.config.crop_size);
        self.normalizer.normalize_to_tensor(&cropped)
    }
}
