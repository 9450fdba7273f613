//! MobileNetV3-Small tissue classifier.
//!
//! Layer layout and parameter names follow the torchvision implementation so
//! that exported state dicts bind without renaming:
//!
//! - `features.0`: 3x3 stride-2 stem convolution;
//! - `features.1` to `features.11`: inverted residual blocks, each under
//!   `features.{i}.block.{j}`;
//! - `features.12`: 1x1 convolution to 576 channels;
//! - `classifier.0` and `classifier.3`: the two linear layers of the head.

use candle_core::{D, Module, ModuleT, Result, Tensor};
use candle_nn::{
    BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Dropout, Linear, VarBuilder, batch_norm,
    conv2d, conv2d_no_bias, linear,
};

const BN_EPS: f64 = 1e-3;
const STEM_CHANNELS: usize = 16;
const LAST_CONV_CHANNELS: usize = 576;
const HEAD_HIDDEN: usize = 1024;
const HEAD_DROPOUT: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    HardSwish,
}

fn hard_sigmoid(xs: &Tensor) -> Result<Tensor> {
    xs.affine(1.0 / 6.0, 0.5)?.clamp(0f32, 1f32)
}

fn hard_swish(xs: &Tensor) -> Result<Tensor> {
    xs.mul(&hard_sigmoid(xs)?)
}

impl Activation {
    fn apply(self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Activation::Relu => xs.relu(),
            Activation::HardSwish => hard_swish(xs),
        }
    }
}

/// One inverted residual block: in, kernel, expanded, out, SE, activation, stride.
#[derive(Debug, Clone, Copy)]
struct BlockConfig {
    input: usize,
    kernel: usize,
    expanded: usize,
    output: usize,
    squeeze_excite: bool,
    activation: Activation,
    stride: usize,
}

const fn block(
    input: usize,
    kernel: usize,
    expanded: usize,
    output: usize,
    squeeze_excite: bool,
    activation: Activation,
    stride: usize,
) -> BlockConfig {
    BlockConfig {
        input,
        kernel,
        expanded,
        output,
        squeeze_excite,
        activation,
        stride,
    }
}

const SMALL_BLOCKS: [BlockConfig; 11] = {
    use Activation::{HardSwish as HS, Relu as RE};
    [
        block(16, 3, 16, 16, true, RE, 2),
        block(16, 3, 72, 24, false, RE, 2),
        block(24, 3, 88, 24, false, RE, 1),
        block(24, 5, 96, 40, true, HS, 2),
        block(40, 5, 240, 40, true, HS, 1),
        block(40, 5, 240, 40, true, HS, 1),
        block(40, 5, 120, 48, true, HS, 1),
        block(48, 5, 144, 48, true, HS, 1),
        block(48, 5, 288, 96, true, HS, 2),
        block(96, 5, 576, 96, true, HS, 1),
        block(96, 5, 576, 96, true, HS, 1),
    ]
};

/// Rounds `value` to a multiple of `divisor` without dropping more than 10%.
fn make_divisible(value: usize, divisor: usize) -> usize {
    let rounded = ((value + divisor / 2) / divisor * divisor).max(divisor);
    if (rounded as f64) < 0.9 * value as f64 {
        rounded + divisor
    } else {
        rounded
    }
}

/// Convolution, batch norm and optional activation, stored as `{0, 1}`.
#[derive(Debug, Clone)]
struct ConvNormActivation {
    conv: Conv2d,
    norm: BatchNorm,
    activation: Option<Activation>,
}

impl ConvNormActivation {
    fn load(
        vb: VarBuilder,
        input: usize,
        output: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        activation: Option<Activation>,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: (kernel - 1) / 2,
            stride,
            groups,
            ..Default::default()
        };
        let conv = conv2d_no_bias(input, output, kernel, cfg, vb.pp("0"))?;
        let norm = batch_norm(
            output,
            BatchNormConfig {
                eps: BN_EPS,
                ..Default::default()
            },
            vb.pp("1"),
        )?;
        Ok(Self {
            conv,
            norm,
            activation,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = xs.apply(&self.conv)?.apply_t(&self.norm, train)?;
        match self.activation {
            Some(act) => act.apply(&xs),
            None => Ok(xs),
        }
    }
}

#[derive(Debug, Clone)]
struct SqueezeExcitation {
    fc1: Conv2d,
    fc2: Conv2d,
}

impl SqueezeExcitation {
    fn load(vb: VarBuilder, channels: usize) -> Result<Self> {
        let squeezed = make_divisible(channels / 4, 8);
        let cfg = Conv2dConfig::default();
        Ok(Self {
            fc1: conv2d(channels, squeezed, 1, cfg, vb.pp("fc1"))?,
            fc2: conv2d(squeezed, channels, 1, cfg, vb.pp("fc2"))?,
        })
    }
}

impl Module for SqueezeExcitation {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let scale = xs.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?;
        let scale = scale.apply(&self.fc1)?.relu()?.apply(&self.fc2)?;
        xs.broadcast_mul(&hard_sigmoid(&scale)?)
    }
}

#[derive(Debug, Clone)]
struct InvertedResidual {
    expand: Option<ConvNormActivation>,
    depthwise: ConvNormActivation,
    squeeze_excite: Option<SqueezeExcitation>,
    project: ConvNormActivation,
    use_residual: bool,
}

impl InvertedResidual {
    fn load(vb: VarBuilder, cfg: &BlockConfig) -> Result<Self> {
        let mut index = 0usize;
        let mut next = || {
            let vb = vb.pp(index.to_string());
            index += 1;
            vb
        };

        let expand = if cfg.expanded != cfg.input {
            Some(ConvNormActivation::load(
                next(),
                cfg.input,
                cfg.expanded,
                1,
                1,
                1,
                Some(cfg.activation),
            )?)
        } else {
            None
        };
        let depthwise = ConvNormActivation::load(
            next(),
            cfg.expanded,
            cfg.expanded,
            cfg.kernel,
            cfg.stride,
            cfg.expanded,
            Some(cfg.activation),
        )?;
        let squeeze_excite = if cfg.squeeze_excite {
            Some(SqueezeExcitation::load(next(), cfg.expanded)?)
        } else {
            None
        };
        let project = ConvNormActivation::load(next(), cfg.expanded, cfg.output, 1, 1, 1, None)?;

        Ok(Self {
            expand,
            depthwise,
            squeeze_excite,
            project,
            use_residual: cfg.stride == 1 && cfg.input == cfg.output,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut ys = match &self.expand {
            Some(expand) => expand.forward_t(xs, train)?,
            None => xs.clone(),
        };
        ys = self.depthwise.forward_t(&ys, train)?;
        if let Some(se) = &self.squeeze_excite {
            ys = ys.apply(se)?;
        }
        ys = self.project.forward_t(&ys, train)?;
        if self.use_residual { ys + xs } else { Ok(ys) }
    }
}

/// MobileNetV3-Small with a configurable number of output classes.
#[derive(Debug, Clone)]
pub struct MobileNetV3Small {
    stem: ConvNormActivation,
    blocks: Vec<InvertedResidual>,
    last_conv: ConvNormActivation,
    hidden: Linear,
    dropout: Dropout,
    output: Linear,
    num_classes: usize,
}

impl MobileNetV3Small {
    /// Binds the network to the parameters in `vb`.
    pub fn load(vb: VarBuilder, num_classes: usize) -> Result<Self> {
        let features = vb.pp("features");
        let stem = ConvNormActivation::load(
            features.pp("0"),
            3,
            STEM_CHANNELS,
            3,
            2,
            1,
            Some(Activation::HardSwish),
        )?;

        let blocks = SMALL_BLOCKS
            .iter()
            .enumerate()
            .map(|(i, cfg)| InvertedResidual::load(features.pp(i + 1).pp("block"), cfg))
            .collect::<Result<Vec<_>>>()?;

        let last_input = SMALL_BLOCKS[SMALL_BLOCKS.len() - 1].output;
        let last_conv = ConvNormActivation::load(
            features.pp(SMALL_BLOCKS.len() + 1),
            last_input,
            LAST_CONV_CHANNELS,
            1,
            1,
            1,
            Some(Activation::HardSwish),
        )?;

        let classifier = vb.pp("classifier");
        let hidden = linear(LAST_CONV_CHANNELS, HEAD_HIDDEN, classifier.pp("0"))?;
        let output = linear(HEAD_HIDDEN, num_classes, classifier.pp("3"))?;

        Ok(Self {
            stem,
            blocks,
            last_conv,
            hidden,
            dropout: Dropout::new(HEAD_DROPOUT),
            output,
            num_classes,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl ModuleT for MobileNetV3Small {
    /// Maps a `(batch, 3, h, w)` input to `(batch, num_classes)` logits.
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut xs = self.stem.forward_t(xs, train)?;
        for block in &self.blocks {
            xs = block.forward_t(&xs, train)?;
        }
        let xs = self.last_conv.forward_t(&xs, train)?;
        let xs = xs.mean(D::Minus1)?.mean(D::Minus1)?;
        let xs = hard_swish(&xs.apply(&self.hidden)?)?;
        xs.apply_t(&self.dropout, train)?.apply(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_make_divisible_matches_squeeze_widths() {
        assert_eq!(make_divisible(16 / 4, 8), 8);
        assert_eq!(make_divisible(96 / 4, 8), 24);
        assert_eq!(make_divisible(240 / 4, 8), 64);
        assert_eq!(make_divisible(120 / 4, 8), 32);
        assert_eq!(make_divisible(576 / 4, 8), 144);
    }

    #[test]
    fn test_parameter_names_follow_torchvision_layout() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        MobileNetV3Small::load(vb, 8).unwrap();

        let data = varmap.data().lock().unwrap();
        let dims = |name: &str| data[name].as_tensor().dims().to_vec();
        assert_eq!(dims("features.0.0.weight"), vec![16, 3, 3, 3]);
        assert_eq!(dims("features.1.block.0.0.weight"), vec![16, 1, 3, 3]);
        assert_eq!(dims("features.1.block.1.fc1.weight"), vec![8, 16, 1, 1]);
        assert_eq!(dims("features.2.block.0.0.weight"), vec![72, 16, 1, 1]);
        assert_eq!(dims("features.4.block.2.fc2.bias"), vec![96]);
        assert_eq!(dims("features.11.block.3.1.running_var"), vec![96]);
        assert_eq!(dims("features.12.0.weight"), vec![576, 96, 1, 1]);
        assert_eq!(dims("classifier.0.weight"), vec![1024, 576]);
        assert_eq!(dims("classifier.3.weight"), vec![8, 1024]);
        assert!(!data.contains_key("features.2.block.3.0.weight"));
    }

    #[test]
    fn test_forward_shape_and_eval_determinism() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = MobileNetV3Small::load(vb, 8).unwrap();

        let input = Tensor::randn(0f32, 1f32, (2, 3, 64, 64), &Device::Cpu).unwrap();
        let a = model.forward_t(&input, false).unwrap();
        let b = model.forward_t(&input, false).unwrap();
        assert_eq!(a.dims(), &[2, 8]);
        let diff = (a - b).unwrap().abs().unwrap().sum_all().unwrap();
        assert_eq!(diff.to_scalar::<f32>().unwrap(), 0.0);
    }
}
