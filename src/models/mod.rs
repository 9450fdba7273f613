//! Model checkpoints and the networks they load into.

pub mod checkpoint;
pub mod classification;

#[cfg(test)]
pub(crate) mod fixtures;

pub use checkpoint::{CheckpointVariant, ResolvedCheckpoint, StateDict};
pub use classification::{ClassifierBackend, TissueModel};
