//! Image decoding helpers.

use crate::core::errors::{HistoError, HistoResult};
use image::{ImageReader, RgbImage};
use std::path::Path;

/// Loads an image from `path` and converts it to 8-bit RGB.
///
/// The format is sniffed from the file contents, so uploads stored with a
/// misleading extension still decode. Alpha channels are dropped and
/// grayscale is replicated across the three channels.
///
/// # Errors
///
/// Returns [`HistoError::Decode`] if the file cannot be opened or decoded.
pub fn load_image(path: &Path) -> HistoResult<RgbImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| HistoError::decode(path, image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| HistoError::decode(path, image::ImageError::IoError(e)))?;
    let img = reader.decode().map_err(|e| HistoError::decode(path, e))?;
    Ok(img.to_rgb8())
}
