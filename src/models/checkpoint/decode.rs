//! Byte-level decoding of checkpoint files.

use candle_core::{DType, Device, Tensor};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use tracing::debug;

/// Tensors and metadata read from a safetensors checkpoint.
#[derive(Debug, Clone, Default)]
pub struct TensorContainer {
    /// Floating point tensors by name.
    pub tensors: HashMap<String, Tensor>,
    /// The `__metadata__` string map.
    pub metadata: HashMap<String, String>,
    /// Names of non-floating-point entries that were not loaded.
    pub skipped: Vec<String>,
}

/// A checkpoint decoded just far enough to tell the encodings apart.
#[derive(Debug, Clone)]
pub enum RawCheckpoint {
    /// ONNX model protobuf: architecture and weights together.
    Graph(Vec<u8>),
    /// Named tensor container.
    Tensors(TensorContainer),
    /// Anything else; `found` names what the bytes look like.
    Opaque { found: String },
}

impl RawCheckpoint {
    /// Short name of the decoded runtime type, for logs and diagnostics.
    pub fn kind(&self) -> &str {
        match self {
            RawCheckpoint::Graph(_) => "onnx graph",
            RawCheckpoint::Tensors(_) => "tensor mapping",
            RawCheckpoint::Opaque { found } => found,
        }
    }
}

/// Decodes checkpoint bytes into a [`RawCheckpoint`].
///
/// safetensors is recognized by its length-prefixed JSON header, ONNX by the
/// `ir_version` field tag that leads every serialized `ModelProto`. Tensors
/// are materialized on the CPU; device placement happens when parameters are
/// bound to the architecture.
pub fn decode_checkpoint(bytes: Vec<u8>) -> RawCheckpoint {
    if looks_like_safetensors(&bytes) {
        return match read_safetensors(&bytes) {
            Ok(container) => RawCheckpoint::Tensors(container),
            Err(message) => RawCheckpoint::Opaque {
                found: format!("malformed safetensors ({message})"),
            },
        };
    }
    if looks_like_onnx(&bytes) {
        return RawCheckpoint::Graph(bytes);
    }
    RawCheckpoint::Opaque {
        found: describe_bytes(&bytes),
    }
}

fn looks_like_safetensors(bytes: &[u8]) -> bool {
    if bytes.len() < 9 {
        return false;
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[..8]);
    let header_len = u64::from_le_bytes(len_bytes);
    header_len > 0 && header_len <= (bytes.len() - 8) as u64 && bytes[8] == b'{'
}

fn looks_like_onnx(bytes: &[u8]) -> bool {
    // field 1 (ir_version), wire type 0 (varint)
    bytes.len() > 2 && bytes[0] == 0x08
}

fn describe_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "empty file".to_string();
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return "zip archive (pickled PyTorch checkpoint)".to_string();
    }
    if bytes.len() > 1 && bytes[0] == 0x80 && (2..=5).contains(&bytes[1]) {
        return "pickle stream".to_string();
    }
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if matches!(first, Some(b'{') | Some(b'[')) {
        return "JSON document".to_string();
    }
    format!("unrecognized binary ({} bytes)", bytes.len())
}

fn float_dtype(dtype: Dtype) -> Option<DType> {
    match dtype {
        Dtype::F32 => Some(DType::F32),
        Dtype::F16 => Some(DType::F16),
        Dtype::BF16 => Some(DType::BF16),
        Dtype::F64 => Some(DType::F64),
        _ => None,
    }
}

fn read_safetensors(bytes: &[u8]) -> Result<TensorContainer, String> {
    let (_, header) = SafeTensors::read_metadata(bytes).map_err(|e| e.to_string())?;
    let metadata = header.metadata().clone().unwrap_or_default();
    let st = SafeTensors::deserialize(bytes).map_err(|e| e.to_string())?;

    let mut container = TensorContainer {
        metadata,
        ..TensorContainer::default()
    };
    for (name, view) in st.tensors() {
        let Some(dtype) = float_dtype(view.dtype()) else {
            debug!(tensor = %name, dtype = ?view.dtype(), "skipping non-float checkpoint entry");
            container.skipped.push(name);
            continue;
        };
        let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), &Device::Cpu)
            .map_err(|e| format!("tensor '{name}': {e}"))?;
        container.tensors.insert(name, tensor);
    }
    Ok(container)
}
