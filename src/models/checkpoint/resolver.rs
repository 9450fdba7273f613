//! Resolution of a decoded checkpoint into something loadable.
//!
//! Variants are tried in priority order:
//!
//! 1. a complete model graph is used as-is;
//! 2. otherwise the tensor mapping is bound to the native architecture, after
//!    unwrapping a training checkpoint's `state_dict` entry when present;
//! 3. anything else is rejected.

use super::decode::{RawCheckpoint, TensorContainer};
use super::migrations::{ArchitectureRegistry, ResolvedArchitecture};
use crate::core::constants::DEFAULT_NUM_CLASSES;
use crate::core::errors::LoadError;
use candle_core::Tensor;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Reserved entry under which training checkpoints nest the parameters.
pub const STATE_DICT_KEY: &str = "state_dict";
pub const ARCHITECTURE_METADATA_KEY: &str = "architecture";
pub const NUM_CLASSES_METADATA_KEY: &str = "num_classes";
/// Final classifier layer; its row count is the number of classes.
pub const CLASSIFIER_OUTPUT_WEIGHT: &str = "classifier.3.weight";

/// Which encoding a checkpoint used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointVariant {
    FullModel,
    StateDict,
    WrappedStateDict,
}

impl fmt::Display for CheckpointVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointVariant::FullModel => write!(f, "full model"),
            CheckpointVariant::StateDict => write!(f, "state dict"),
            CheckpointVariant::WrappedStateDict => write!(f, "wrapped state dict"),
        }
    }
}

/// Parameters ready to bind to the native architecture.
#[derive(Debug, Clone)]
pub struct StateDict {
    /// Parameters keyed by their canonical (current architecture) names.
    pub params: HashMap<String, Tensor>,
    pub num_classes: usize,
    pub architecture: ResolvedArchitecture,
    pub variant: CheckpointVariant,
    /// Training metadata carried alongside the weights.
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum ResolvedCheckpoint {
    /// Serialized ONNX graph.
    FullModel(Vec<u8>),
    StateDict(StateDict),
}

impl ResolvedCheckpoint {
    pub fn variant(&self) -> CheckpointVariant {
        match self {
            ResolvedCheckpoint::FullModel(_) => CheckpointVariant::FullModel,
            ResolvedCheckpoint::StateDict(sd) => sd.variant,
        }
    }
}

/// Resolves a decoded checkpoint.
///
/// # Errors
///
/// [`LoadError::UnsupportedCheckpointFormat`] for opaque input, an unknown
/// architecture identifier, or a tensor mapping with no parameters;
/// [`LoadError::ParameterMismatch`] for an unusable `num_classes` entry.
pub fn resolve_checkpoint(
    raw: RawCheckpoint,
    registry: &ArchitectureRegistry,
) -> Result<ResolvedCheckpoint, LoadError> {
    match raw {
        RawCheckpoint::Graph(bytes) => Ok(ResolvedCheckpoint::FullModel(bytes)),
        RawCheckpoint::Tensors(container) => {
            resolve_tensors(container, registry).map(ResolvedCheckpoint::StateDict)
        }
        RawCheckpoint::Opaque { found } => Err(LoadError::unsupported(found)),
    }
}

fn resolve_tensors(
    container: TensorContainer,
    registry: &ArchitectureRegistry,
) -> Result<StateDict, LoadError> {
    let TensorContainer {
        tensors, metadata, ..
    } = container;

    let architecture = registry.resolve(
        metadata
            .get(ARCHITECTURE_METADATA_KEY)
            .map(String::as_str),
    )?;

    let (params, variant) = unwrap_state_dict(tensors);
    let params = match architecture.strip_prefix {
        Some(prefix) => strip_param_prefix(params, prefix),
        None => params,
    };
    if params.is_empty() {
        return Err(LoadError::unsupported(match variant {
            CheckpointVariant::WrappedStateDict => "wrapped checkpoint with an empty state_dict",
            _ => "safetensors with no parameter tensors",
        }));
    }

    let num_classes = num_classes(&metadata, &params)?;
    if let Some(epoch) = metadata.get("epoch") {
        debug!(epoch = %epoch, "checkpoint training metadata");
    }
    Ok(StateDict {
        params,
        num_classes,
        architecture,
        variant,
        metadata,
    })
}

fn unwrap_state_dict(tensors: HashMap<String, Tensor>) -> (HashMap<String, Tensor>, CheckpointVariant) {
    let prefix = format!("{STATE_DICT_KEY}.");
    if !tensors.keys().any(|k| k.starts_with(&prefix)) {
        return (tensors, CheckpointVariant::StateDict);
    }

    let total = tensors.len();
    let nested: HashMap<String, Tensor> = tensors
        .into_iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|name| (name.to_string(), v)))
        .collect();
    if nested.len() < total {
        debug!(
            dropped = total - nested.len(),
            "ignoring checkpoint entries outside state_dict"
        );
    }
    (nested, CheckpointVariant::WrappedStateDict)
}

fn strip_param_prefix(params: HashMap<String, Tensor>, prefix: &str) -> HashMap<String, Tensor> {
    params
        .into_iter()
        .map(|(k, v)| match k.strip_prefix(prefix) {
            Some(name) => (name.to_string(), v),
            None => (k, v),
        })
        .collect()
}

fn num_classes(
    metadata: &HashMap<String, String>,
    params: &HashMap<String, Tensor>,
) -> Result<usize, LoadError> {
    if let Some(value) = metadata.get(NUM_CLASSES_METADATA_KEY) {
        return match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(LoadError::parameter_mismatch(format!(
                "invalid num_classes metadata '{value}'"
            ))),
        };
    }
    Ok(params
        .get(CLASSIFIER_OUTPUT_WEIGHT)
        .and_then(|w| w.dims().first().copied())
        .unwrap_or(DEFAULT_NUM_CLASSES))
}
