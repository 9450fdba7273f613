//! Checkpoint decoding and resolution.
//!
//! A checkpoint file is decoded into one of a closed set of raw variants
//! ([`RawCheckpoint`]), then resolved in priority order into either a complete
//! model graph or a parameter mapping for the native architecture
//! ([`ResolvedCheckpoint`]). Input that matches none of the known encodings is
//! a hard [`crate::core::errors::LoadError::UnsupportedCheckpointFormat`].

pub mod decode;
pub mod migrations;
pub mod resolver;

pub use decode::{RawCheckpoint, TensorContainer, decode_checkpoint};
pub use migrations::{
    ArchitectureMigration, ArchitectureRegistry, CURRENT_ARCHITECTURE, ResolvedArchitecture,
    architecture_registry,
};
pub use resolver::{
    ARCHITECTURE_METADATA_KEY, CLASSIFIER_OUTPUT_WEIGHT, CheckpointVariant,
    NUM_CLASSES_METADATA_KEY, ResolvedCheckpoint, STATE_DICT_KEY, StateDict, resolve_checkpoint,
};
