//! Aspect-preserving resize and center crop.

use image::RgbImage;
use image::imageops::{self, FilterType};

/// Computes the output size when the shorter side is resized to `target`.
///
/// The longer side is scaled by the same factor and truncated toward zero.
pub fn shorter_side_size(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let long = (u64::from(target) * u64::from(height) / u64::from(width.max(1))) as u32;
        (target, long)
    } else {
        let long = (u64::from(target) * u64::from(width) / u64::from(height.max(1))) as u32;
        (long, target)
    }
}

/// Resizes `img` so that its shorter side equals `target`, preserving aspect ratio.
pub fn resize_shorter_side(img: &RgbImage, target: u32, filter: FilterType) -> RgbImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = shorter_side_size(width, height, target);
    if (new_w, new_h) == (width, height) {
        return img.clone();
    }
    imageops::resize(img, new_w, new_h, filter)
}

/// Computes the top-left corner of a centered `crop` window.
///
/// Offsets are rounded half to even.
pub fn center_crop_origin(width: u32, height: u32, crop: u32) -> (u32, u32) {
    let offset = |side: u32| -> u32 {
        let diff = f64::from(side) - f64::from(crop);
        (diff / 2.0).round_ties_even().max(0.0) as u32
    };
    (offset(width), offset(height))
}

/// Crops a `crop x crop` window from the center of `img`.
///
/// Callers resize first, so the image is never smaller than the window.
pub fn center_crop(img: &RgbImage, crop: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let (left, top) = center_crop_origin(width, height, crop);
    imageops::crop_imm(img, left, top, crop.min(width), crop.min(height)).to_image()
}
