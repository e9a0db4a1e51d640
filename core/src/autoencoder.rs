/// Single per-symbol autoencoder: parameters and forward passes.
///
///   hidden_pre = l1 · x + b1                 [hidden]
///   hidden     = split_rectify(hidden_pre)   [2 · hidden]
///   output     = l2 · hidden + b2            [alphabet]
///   loss       = Σ (output − x)²
///
/// `forward_and_loss` records on a tape for gradients; `evaluate` runs the
/// same arithmetic on plain buffers and touches nothing.

use rand_chacha::ChaCha8Rng;
use serde::{Serialize, Deserialize};

use crate::tape::{self, BufId, Tape};
use crate::tensor;

/// Parameter names in registration order.
pub const PARAM_NAMES: [&str; 4] = ["l1", "b1", "l2", "b2"];

/// Network shape. Fixed once an ensemble is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// Input/output width; also the number of networks in an ensemble.
    pub alphabet: usize,
    /// Bottleneck width before the split rectifier doubles it.
    pub hidden: usize,
}

impl AutoencoderConfig {
    /// Full byte model: 256 symbols, 256 hidden units.
    pub fn bytes() -> Self {
        AutoencoderConfig { alphabet: 256, hidden: 256 }
    }

    /// Tiny model for fast tests.
    pub fn test_config() -> Self {
        AutoencoderConfig { alphabet: 4, hidden: 4 }
    }

    /// Width after the split rectifier.
    pub fn rectified(&self) -> usize {
        2 * self.hidden
    }
}

/// Learnable parameters, flat row-major. Also used as the gradient shadow.
///
/// Layout:
///   l1: [hidden, alphabet]
///   b1: [hidden]
///   l2: [alphabet, 2 * hidden]
///   b2: [alphabet]
#[derive(Clone, Debug, PartialEq)]
pub struct AutoencoderParams {
    pub l1: Vec<f32>,
    pub b1: Vec<f32>,
    pub l2: Vec<f32>,
    pub b2: Vec<f32>,
}

impl AutoencoderParams {
    /// He-scaled Gaussian weights, zero biases. Draws l1 then l2 from `rng`.
    pub fn init(cfg: &AutoencoderConfig, rng: &mut ChaCha8Rng) -> Self {
        let mut p = AutoencoderParams::zeros_like(cfg);
        tensor::fill_he_normal(rng, &mut p.l1, cfg.alphabet);
        tensor::fill_he_normal(rng, &mut p.l2, cfg.rectified());
        p
    }

    pub fn zeros_like(cfg: &AutoencoderConfig) -> Self {
        AutoencoderParams {
            l1: vec![0.0; cfg.hidden * cfg.alphabet],
            b1: vec![0.0; cfg.hidden],
            l2: vec![0.0; cfg.alphabet * cfg.rectified()],
            b2: vec![0.0; cfg.alphabet],
        }
    }

    pub fn num_params(&self) -> usize {
        self.l1.len() + self.b1.len() + self.l2.len() + self.b2.len()
    }

    /// The four tensors in `PARAM_NAMES` order.
    pub fn tensors(&self) -> [&[f32]; 4] {
        [&self.l1, &self.b1, &self.l2, &self.b2]
    }

    pub fn tensors_mut(&mut self) -> [&mut [f32]; 4] {
        [&mut self.l1, &mut self.b1, &mut self.l2, &mut self.b2]
    }

    /// L2 norm over every entry of all four tensors.
    pub fn global_norm(&self) -> f32 {
        self.tensors().iter().map(|t| tensor::sq_norm_f32(t)).sum::<f32>().sqrt()
    }
}

/// Tape handles for the registered parameters, in `PARAM_NAMES` order.
#[derive(Clone, Copy, Debug)]
pub struct ParamIds {
    pub l1: BufId,
    pub b1: BufId,
    pub l2: BufId,
    pub b2: BufId,
}

/// Record the forward pass on `tape`. Returns (loss value, loss BufId, param ids).
/// `feature` is registered as a constant and is both input and target.
pub fn forward_and_loss(
    params: &AutoencoderParams,
    cfg: &AutoencoderConfig,
    feature: &[f32],
    tape: &mut Tape,
) -> (f32, BufId, ParamIds) {
    debug_assert_eq!(feature.len(), cfg.alphabet);
    let (a, h, r) = (cfg.alphabet, cfg.hidden, cfg.rectified());

    let ids = ParamIds {
        l1: tape.register_param(&params.l1, vec![h, a]),
        b1: tape.register_param(&params.b1, vec![h, 1]),
        l2: tape.register_param(&params.l2, vec![a, r]),
        b2: tape.register_param(&params.b2, vec![a, 1]),
    };
    let x = tape.register_const(feature, vec![a, 1]);

    let pre = tape.matmul(ids.l1, x, h, a, 1);
    let pre = tape.add(pre, ids.b1);
    let hidden = tape.split_rectify(pre);
    let out = tape.matmul(ids.l2, hidden, a, r, 1);
    let out = tape.add(out, ids.b2);
    let loss_id = tape.sum_squared_diff(out, x);

    (tape.buf_data(loss_id)[0], loss_id, ids)
}

/// Loss and gradients for every parameter, via a scoped tape.
pub fn compute_gradients(
    params: &AutoencoderParams,
    cfg: &AutoencoderConfig,
    feature: &[f32],
) -> (f32, AutoencoderParams) {
    tape::with_tape(|tape| {
        let (loss, loss_id, ids) = forward_and_loss(params, cfg, feature, tape);
        tape.backward(loss_id);
        let grads = AutoencoderParams {
            l1: tape.get_param_grad(ids.l1),
            b1: tape.get_param_grad(ids.b1),
            l2: tape.get_param_grad(ids.l2),
            b2: tape.get_param_grad(ids.b2),
        };
        (loss, grads)
    })
}

/// Reconstruction loss only. No tape, no gradients, no mutation.
pub fn evaluate(params: &AutoencoderParams, cfg: &AutoencoderConfig, feature: &[f32]) -> f32 {
    debug_assert_eq!(feature.len(), cfg.alphabet);
    let (a, h, r) = (cfg.alphabet, cfg.hidden, cfg.rectified());

    let mut pre = vec![0.0f32; h];
    tensor::matmul_f32(&params.l1, feature, &mut pre, h, a, 1);
    for (p, b) in pre.iter_mut().zip(params.b1.iter()) {
        *p += b;
    }
    let mut hidden = vec![0.0f32; r];
    tensor::split_rectify_f32(&pre, &mut hidden);
    let mut out = vec![0.0f32; a];
    tensor::matmul_f32(&params.l2, &hidden, &mut out, a, r, 1);
    for (o, b) in out.iter_mut().zip(params.b2.iter()) {
        *o += b;
    }
    tensor::sum_squared_diff_f32(&out, feature)
}
