/// Per-network Adam optimizer with global-norm clipping.
///
/// Every autoencoder owns its own moment buffers and its own step counter.
/// Networks are selected by the symbol being trained, so they fire at very
/// different rates; bias correction uses the network's OWN step count, never
/// the global iteration. A rarely seen symbol keeps a small exponent and
/// therefore a larger effective step.
///
/// Update for one network (g = clipped gradient):
///   m    = β1·m + (1−β1)·g
///   v    = β2·v + (1−β2)·g²
///   m̂    = m / (1 − β1^(t+1)),  v̂ = max(v / (1 − β2^(t+1)), 0)
///   w   -= η · m̂ / (√v̂ + ε)
///   t   += 1

use serde::{Serialize, Deserialize};

use crate::autoencoder::AutoencoderParams;

/// Adam hyperparameters (shared across all networks).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    /// Gradients whose global L2 norm exceeds this are rescaled down to it.
    pub clip_norm: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            lr: 1e-3,
            beta1: 0.8,
            beta2: 0.89,
            eps: 1e-8,
            clip_norm: 1.0,
        }
    }
}

/// Moment buffers for a single parameter tensor.
#[derive(Clone, Debug)]
struct MomentBuf {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl MomentBuf {
    fn zeros(n: usize) -> Self {
        MomentBuf { m: vec![0.0; n], v: vec![0.0; n] }
    }
}

/// Optimizer state for one autoencoder: a moment pair per tensor
/// (l1, b1, l2, b2) plus the network-local step counter.
#[derive(Clone, Debug)]
pub struct AutoencoderOptState {
    bufs: [MomentBuf; 4],
    step: u32,
}

impl AutoencoderOptState {
    pub fn new(params: &AutoencoderParams) -> Self {
        let [l1, b1, l2, b2] = params.tensors();
        AutoencoderOptState {
            bufs: [
                MomentBuf::zeros(l1.len()),
                MomentBuf::zeros(b1.len()),
                MomentBuf::zeros(l2.len()),
                MomentBuf::zeros(b2.len()),
            ],
            step: 0,
        }
    }

    /// Number of updates applied to this network.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// First-moment buffer for tensor `idx` (PARAM_NAMES order).
    pub fn first_moment(&self, idx: usize) -> &[f32] {
        &self.bufs[idx].m
    }

    /// Second-moment buffer for tensor `idx` (PARAM_NAMES order).
    pub fn second_moment(&self, idx: usize) -> &[f32] {
        &self.bufs[idx].v
    }
}

/// What a single `update` did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateStats {
    /// Global L2 norm of the raw gradient.
    pub grad_norm: f32,
    /// Factor applied to every gradient entry (1.0 when unclipped).
    pub clip_scale: f32,
    /// The network's step counter after the update.
    pub step: u32,
}

/// Rescale factor for global-norm clipping. Never amplifies.
#[inline]
pub fn clip_scale(norm: f32, max_norm: f32) -> f32 {
    if norm > max_norm {
        max_norm / norm
    } else {
        1.0
    }
}

/// β^(step+1), or 0 when the power is not finite (disables correction
/// for that step instead of propagating NaN).
#[inline]
pub fn bias_power(beta: f32, step: u32) -> f32 {
    let y = (beta as f64).powf(step as f64 + 1.0);
    if y.is_nan() || y.is_infinite() {
        0.0
    } else {
        y as f32
    }
}

/// Core Adam step on a single (params, grads, m, v) group.
///
/// Modifies params, m, v in place. `scale` is the clip factor.
#[inline]
fn adam_step_buf(
    params: &mut [f32],
    grads: &[f32],
    buf: &mut MomentBuf,
    scale: f32,
    cfg: &AdamConfig,
    b1t: f32,
    b2t: f32,
) {
    debug_assert_eq!(params.len(), grads.len());
    debug_assert_eq!(params.len(), buf.m.len());
    for i in 0..params.len() {
        let g = grads[i] * scale;
        let m = cfg.beta1 * buf.m[i] + (1.0 - cfg.beta1) * g;
        let v = cfg.beta2 * buf.v[i] + (1.0 - cfg.beta2) * g * g;
        buf.m[i] = m;
        buf.v[i] = v;
        let m_hat = m / (1.0 - b1t);
        let mut v_hat = v / (1.0 - b2t);
        if v_hat < 0.0 {
            v_hat = 0.0;
        }
        params[i] -= cfg.lr * m_hat / (v_hat.sqrt() + cfg.eps);
    }
}

/// Apply one clipped Adam update to one network and advance its step counter.
pub fn update(
    params: &mut AutoencoderParams,
    grads: &AutoencoderParams,
    state: &mut AutoencoderOptState,
    cfg: &AdamConfig,
) -> UpdateStats {
    let grad_norm = grads.global_norm();
    let scale = clip_scale(grad_norm, cfg.clip_norm);
    let b1t = bias_power(cfg.beta1, state.step);
    let b2t = bias_power(cfg.beta2, state.step);

    for ((p, g), buf) in params.tensors_mut().into_iter()
        .zip(grads.tensors())
        .zip(state.bufs.iter_mut())
    {
        adam_step_buf(p, g, buf, scale, cfg, b1t, b2t);
    }

    state.step += 1;
    UpdateStats { grad_norm, clip_scale: scale, step: state.step }
}
