//! Test helpers for writing checkpoint files.
//!
//! [`SafetensorsFixture`] writes parameter mappings; [`OnnxGraphFixture`]
//! hand-encodes a small ONNX `ModelProto` so the full-model path can run
//! without a model file on disk.

use candle_nn::VarMap;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

struct Entry {
    name: String,
    dtype: &'static str,
    shape: Vec<usize>,
    data: Vec<u8>,
}

/// Builds safetensors bytes entry by entry.
#[derive(Default)]
pub(crate) struct SafetensorsFixture {
    entries: Vec<Entry>,
    metadata: BTreeMap<String, String>,
}

impl SafetensorsFixture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn f32(mut self, name: &str, shape: &[usize], values: Vec<f32>) -> Self {
        assert_eq!(shape.iter().product::<usize>(), values.len(), "{name}");
        self.entries.push(Entry {
            name: name.to_string(),
            dtype: "F32",
            shape: shape.to_vec(),
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        });
        self
    }

    pub(crate) fn i64(mut self, name: &str, shape: &[usize], values: Vec<i64>) -> Self {
        assert_eq!(shape.iter().product::<usize>(), values.len(), "{name}");
        self.entries.push(Entry {
            name: name.to_string(),
            dtype: "I64",
            shape: shape.to_vec(),
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        });
        self
    }

    pub(crate) fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds every variable of `varmap`, each name prefixed with `prefix`.
    pub(crate) fn varmap(mut self, varmap: &VarMap, prefix: &str) -> Self {
        let data = varmap.data().lock().unwrap();
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();
        for name in names {
            let tensor = data[name].as_tensor();
            let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            self = self.f32(&format!("{prefix}{name}"), tensor.dims(), values);
        }
        self
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut header = Map::new();
        if !self.metadata.is_empty() {
            header.insert("__metadata__".to_string(), json!(self.metadata));
        }
        let mut offset = 0usize;
        for entry in &self.entries {
            let end = offset + entry.data.len();
            header.insert(
                entry.name.clone(),
                json!({"dtype": entry.dtype, "shape": entry.shape, "data_offsets": [offset, end]}),
            );
            offset = end;
        }

        let mut header = serde_json::to_vec(&Value::Object(header)).unwrap();
        while header.len() % 8 != 0 {
            header.push(b' ');
        }
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(&header);
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.data);
        }
        bytes
    }
}

fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_uint(buf: &mut Vec<u8>, field: u64, value: u64) {
    put_varint(buf, field << 3);
    put_varint(buf, value);
}

fn put_bytes(buf: &mut Vec<u8>, field: u64, data: &[u8]) {
    put_varint(buf, (field << 3) | 2);
    put_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// `ValueInfoProto` for a float tensor with a fixed shape.
fn value_info(name: &str, shape: &[usize]) -> Vec<u8> {
    let mut dims = Vec::new();
    for &d in shape {
        let mut dim = Vec::new();
        put_uint(&mut dim, 1, d as u64);
        put_bytes(&mut dims, 1, &dim);
    }
    let mut tensor_type = Vec::new();
    put_uint(&mut tensor_type, 1, 1); // FLOAT
    put_bytes(&mut tensor_type, 2, &dims);
    let mut type_proto = Vec::new();
    put_bytes(&mut type_proto, 1, &tensor_type);

    let mut info = Vec::new();
    put_bytes(&mut info, 1, name.as_bytes());
    put_bytes(&mut info, 2, &type_proto);
    info
}

struct Node {
    op_type: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Builds a single-input float ONNX graph node by node.
pub(crate) struct OnnxGraphFixture {
    input: (String, Vec<usize>),
    nodes: Vec<Node>,
    outputs: Vec<(String, Vec<usize>)>,
}

impl OnnxGraphFixture {
    pub(crate) fn new(input_name: &str, input_shape: &[usize]) -> Self {
        Self {
            input: (input_name.to_string(), input_shape.to_vec()),
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub(crate) fn node(mut self, op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        self.nodes.push(Node {
            op_type: op_type.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Declares a graph output; outputs keep their declaration order.
    pub(crate) fn output(mut self, name: &str, shape: &[usize]) -> Self {
        self.outputs.push((name.to_string(), shape.to_vec()));
        self
    }

    /// Global average pooling over `[1, C, H, W]` followed by a flatten to
    /// `[1, C]`: the logits are the per-channel means of the input.
    pub(crate) fn channel_mean(channels: usize, side: usize) -> Self {
        Self::new("input", &[1, channels, side, side])
            .node("GlobalAveragePool", &["input"], &["pooled"])
            .node("Flatten", &["pooled"], &["logits"])
            .output("logits", &[1, channels])
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut graph = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let mut proto = Vec::new();
            for input in &node.inputs {
                put_bytes(&mut proto, 1, input.as_bytes());
            }
            for output in &node.outputs {
                put_bytes(&mut proto, 2, output.as_bytes());
            }
            put_bytes(&mut proto, 3, format!("node_{i}").as_bytes());
            put_bytes(&mut proto, 4, node.op_type.as_bytes());
            put_bytes(&mut graph, 1, &proto);
        }
        put_bytes(&mut graph, 2, b"fixture");
        put_bytes(&mut graph, 11, &value_info(&self.input.0, &self.input.1));
        for (name, shape) in &self.outputs {
            put_bytes(&mut graph, 12, &value_info(name, shape));
        }

        let mut opset = Vec::new();
        put_bytes(&mut opset, 1, b"");
        put_uint(&mut opset, 2, 13);

        let mut model = Vec::new();
        put_uint(&mut model, 1, 8); // IR version
        put_bytes(&mut model, 2, b"histo-infer-tests");
        put_bytes(&mut model, 7, &graph);
        put_bytes(&mut model, 8, &opset);
        model
    }
}

/// Bytes that sniff as an ONNX graph but do not parse as one.
pub(crate) const MALFORMED_GRAPH: &[u8] = b"\x08\x07:garbage that is not a protobuf graph";
