//! Tensor type aliases shared by preprocessing, inference and postprocessing.

use ndarray::{Array2, Array4, ArrayD};

/// Type alias for 2D tensors (batch x classes).
pub type Tensor2D = Array2<f32>;

/// Type alias for 4D tensors (batch x channels x height x width).
pub type Tensor4D = Array4<f32>;

/// Type alias for tensors whose rank is only known at runtime.
pub type TensorD = ArrayD<f32>;
