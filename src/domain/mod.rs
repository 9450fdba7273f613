//! Domain types: the tissue label table and prediction results.

pub mod labels;
pub mod prediction;

pub use labels::{LabelTable, TissueClass, default_labels};
pub use prediction::{Decision, Prediction};
