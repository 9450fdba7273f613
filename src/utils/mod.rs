//! Utility functions for image I/O and candle interop.

pub mod candle;
pub mod image;

pub use image::load_image;
