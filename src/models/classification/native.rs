//! Native (candle) backend for state-dict checkpoints.

use super::backend::ClassifierBackend;
use super::mobilenetv3::MobileNetV3Small;
use crate::core::Tensor4D;
use crate::core::errors::{HistoResult, LoadError};
use crate::models::checkpoint::StateDict;
use crate::processors::RawOutput;
use crate::utils::candle::{
    candle_to_inference, candle_to_load, candle_to_tensord, device_name, tensor4d_to_candle,
};
use candle_core::{DType, Device, ModuleT};
use candle_nn::{VarBuilder, VarMap};
use std::collections::BTreeMap;
use tracing::debug;

const MODEL_NAME: &str = "mobilenetv3_small";
const MAX_LISTED_NAMES: usize = 5;

/// Parameter names and shapes the architecture expects for `num_classes`.
pub fn expected_parameters(num_classes: usize) -> Result<BTreeMap<String, Vec<usize>>, LoadError> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    MobileNetV3Small::load(vb, num_classes)
        .map_err(|e| candle_to_load("enumerate architecture parameters", e))?;
    let data = varmap
        .data()
        .lock()
        .map_err(|_| LoadError::parameter_mismatch("parameter table lock poisoned"))?;
    Ok(data
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().dims().to_vec()))
        .collect())
}

fn list_names<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let names: Vec<&String> = names.collect();
    let mut listed: Vec<&str> = names.iter().take(MAX_LISTED_NAMES).map(|s| s.as_str()).collect();
    if names.len() > MAX_LISTED_NAMES {
        listed.push("...");
    }
    format!("{} ({})", names.len(), listed.join(", "))
}

/// Checks that `state_dict` holds exactly the parameters the architecture
/// declares, with matching shapes.
fn check_strict(state_dict: &StateDict) -> Result<(), LoadError> {
    let expected = expected_parameters(state_dict.num_classes)?;

    let mut missing: Vec<&String> = expected
        .keys()
        .filter(|name| !state_dict.params.contains_key(*name))
        .collect();
    missing.sort();
    let mut unexpected: Vec<&String> = state_dict
        .params
        .keys()
        .filter(|name| !expected.contains_key(*name))
        .collect();
    unexpected.sort();

    let mut problems = Vec::new();
    if !missing.is_empty() {
        problems.push(format!("missing keys {}", list_names(missing.into_iter())));
    }
    if !unexpected.is_empty() {
        problems.push(format!("unexpected keys {}", list_names(unexpected.into_iter())));
    }
    for (name, dims) in &expected {
        match state_dict.params.get(name) {
            Some(tensor) if tensor.dims() != dims.as_slice() => problems.push(format!(
                "size mismatch for {name}: checkpoint {:?}, model {dims:?}",
                tensor.dims()
            )),
            _ => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(LoadError::parameter_mismatch(problems.join("; ")))
    }
}

/// MobileNetV3-Small bound to checkpoint parameters.
#[derive(Debug)]
pub struct NativeClassifier {
    net: MobileNetV3Small,
    device: Device,
    training: bool,
}

impl NativeClassifier {
    /// Binds the parameters of `state_dict` onto `device`.
    ///
    /// Binding is strict: every parameter the architecture declares must be
    /// present with the declared shape, and no others may appear.
    pub fn from_state_dict(state_dict: StateDict, device: Device) -> Result<Self, LoadError> {
        check_strict(&state_dict)?;
        debug!(
            params = state_dict.params.len(),
            num_classes = state_dict.num_classes,
            architecture = state_dict.architecture.id,
            "binding state dict"
        );
        let num_classes = state_dict.num_classes;
        let vb = VarBuilder::from_tensors(state_dict.params, DType::F32, &device);
        let net = MobileNetV3Small::load(vb, num_classes)
            .map_err(|e| candle_to_load("bind state dict", e))?;
        Ok(Self {
            net,
            device,
            training: true,
        })
    }

    /// Switches to evaluation mode: running batch-norm statistics, no dropout.
    pub fn eval(&mut self) {
        self.training = false;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn num_classes(&self) -> usize {
        self.net.num_classes()
    }
}

impl ClassifierBackend for NativeClassifier {
    fn forward(&self, input: &Tensor4D) -> HistoResult<RawOutput> {
        let xs = tensor4d_to_candle(input, &self.device)
            .map_err(|e| candle_to_inference(MODEL_NAME, "upload input tensor", e))?;
        let logits = self
            .net
            .forward_t(&xs, self.training)
            .map_err(|e| candle_to_inference(MODEL_NAME, "forward pass", e))?;
        Ok(RawOutput::Tensor(candle_to_tensord(&logits)?))
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn device(&self) -> String {
        device_name(&self.device).to_string()
    }
}
