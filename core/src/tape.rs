// Wengert tape: reverse-mode AD via operation recording.
//
// Records operations during the forward pass into a linear tape,
// then replays them in reverse to compute gradients via the chain rule.
//
// Nothing is recorded unless a tape is handed to the forward pass.
// All intermediates stay in the arena, so backward never recomputes.
// Parameters are snapshotted at registration and are immune to later mutation.
// Constant inputs never receive gradient.

use std::cell::Cell;

use crate::tensor;

// ── Buffer management ────────────────────────────────────────────────

/// Arena index for tensor buffers. Immutable after creation.
pub type BufId = usize;

/// What role a buffer plays in the backward pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufKind {
    /// Learnable parameter: gradient is collected and handed to the optimizer.
    Param,
    /// Constant input (e.g. the feature vector): no gradient flows into it.
    Const,
    /// Result of a recorded op.
    Intermediate,
}

/// A flat tensor buffer in the tape arena.
#[derive(Clone, Debug)]
pub struct TapeBuf {
    /// Flat storage (row-major).
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
    pub kind: BufKind,
}

impl TapeBuf {
    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

// ── Tape operations ──────────────────────────────────────────────────

/// A single recorded operation on the tape.
#[derive(Debug, Clone)]
pub enum TapeOp {
    /// out = A @ B where A: [m, k], B: [k, n], out: [m, n]
    Matmul { a: BufId, b: BufId, out: BufId, m: usize, k: usize, n: usize },
    /// out = A + B
    Add { a: BufId, b: BufId, out: BufId },
    /// out = [max(x, 0) ; max(-x, 0)]
    SplitRectify { input: BufId, out: BufId },
    /// out = sum((A - B)^2)  (scalar)
    SumSquaredDiff { a: BufId, b: BufId, out: BufId },
}

// ── The Tape ─────────────────────────────────────────────────────────

/// Wengert tape for reverse-mode AD.
///
/// Records operations during forward pass, replays in reverse for gradients.
/// Created via `with_tape()`, dropped after backward pass completes.
pub struct Tape {
    /// Operations in forward order. Replayed in reverse during backward.
    ops: Vec<TapeOp>,
    /// Arena of tensor buffers. Indexed by BufId.
    bufs: Vec<TapeBuf>,
    /// Gradient accumulators, indexed by BufId. None until backward seeds them.
    grad_accum: Vec<Option<Vec<f32>>>,
    recording: bool,
}

impl Tape {
    pub fn new() -> Self {
        Tape {
            ops: Vec::new(),
            bufs: Vec::new(),
            grad_accum: Vec::new(),
            recording: true,
        }
    }

    fn push_buf(&mut self, data: Vec<f32>, shape: Vec<usize>, kind: BufKind) -> BufId {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        let id = self.bufs.len();
        self.bufs.push(TapeBuf { data, shape, kind });
        self.grad_accum.push(None);
        id
    }

    /// Register a learnable parameter. CLONES the data.
    pub fn register_param(&mut self, data: &[f32], shape: Vec<usize>) -> BufId {
        self.push_buf(data.to_vec(), shape, BufKind::Param)
    }

    /// Register a constant input. Clones the data; never receives gradient.
    pub fn register_const(&mut self, data: &[f32], shape: Vec<usize>) -> BufId {
        self.push_buf(data.to_vec(), shape, BufKind::Const)
    }

    pub fn buf_data(&self, id: BufId) -> &[f32] {
        &self.bufs[id].data
    }

    #[cfg(test)]
    fn buf_shape(&self, id: BufId) -> &[usize] {
        &self.bufs[id].shape
    }

    #[cfg(test)]
    fn buf_kind(&self, id: BufId) -> BufKind {
        self.bufs[id].kind
    }

    #[cfg(test)]
    fn num_bufs(&self) -> usize {
        self.bufs.len()
    }

    #[cfg(test)]
    fn num_ops(&self) -> usize {
        self.ops.len()
    }

    #[cfg(test)]
    fn is_recording(&self) -> bool {
        self.recording
    }

    /// Record an operation and allocate its output buffer in one step.
    fn record_with_output(&mut self, data: Vec<f32>, shape: Vec<usize>,
                          op_fn: impl FnOnce(BufId) -> TapeOp) -> BufId {
        assert!(self.recording, "Tape::record called after backward");
        let out = self.push_buf(data, shape, BufKind::Intermediate);
        self.ops.push(op_fn(out));
        out
    }

    // ── Traced ops ───────────────────────────────────────────────

    /// out[m, n] = A[m, k] @ B[k, n]
    pub fn matmul(&mut self, a: BufId, b: BufId, m: usize, k: usize, n: usize) -> BufId {
        let mut out = vec![0.0f32; m * n];
        tensor::matmul_f32(&self.bufs[a].data, &self.bufs[b].data, &mut out, m, k, n);
        self.record_with_output(out, vec![m, n], |out| TapeOp::Matmul { a, b, out, m, k, n })
    }

    pub fn add(&mut self, a: BufId, b: BufId) -> BufId {
        let mut out = vec![0.0f32; self.bufs[a].numel()];
        tensor::add_f32(&self.bufs[a].data, &self.bufs[b].data, &mut out);
        let shape = self.bufs[a].shape.clone();
        self.record_with_output(out, shape, |out| TapeOp::Add { a, b, out })
    }

    pub fn split_rectify(&mut self, input: BufId) -> BufId {
        let n = self.bufs[input].numel();
        let mut out = vec![0.0f32; 2 * n];
        tensor::split_rectify_f32(&self.bufs[input].data, &mut out);
        self.record_with_output(out, vec![2 * n, 1], |out| TapeOp::SplitRectify { input, out })
    }

    pub fn sum_squared_diff(&mut self, a: BufId, b: BufId) -> BufId {
        let loss = tensor::sum_squared_diff_f32(&self.bufs[a].data, &self.bufs[b].data);
        self.record_with_output(vec![loss], vec![1], |out| TapeOp::SumSquaredDiff { a, b, out })
    }

    // ── Gradient access ──────────────────────────────────────────

    /// Accumulate gradient into a buffer's accumulator. Constants are skipped.
    fn accumulate_grad(&mut self, id: BufId, grad: &[f32]) {
        if self.bufs[id].kind == BufKind::Const {
            return;
        }
        let n = self.bufs[id].numel();
        assert_eq!(grad.len(), n, "accumulate_grad size mismatch: grad={} buf={}", grad.len(), n);
        match &mut self.grad_accum[id] {
            Some(existing) => {
                for (e, g) in existing.iter_mut().zip(grad.iter()) {
                    *e += g;
                }
            }
            None => {
                self.grad_accum[id] = Some(grad.to_vec());
            }
        }
    }

    /// Accumulated gradient for a buffer. None if no gradient flowed to it.
    #[cfg(test)]
    fn get_grad(&self, id: BufId) -> Option<&[f32]> {
        self.grad_accum[id].as_deref()
    }

    /// Gradient for a parameter buffer, zeros if no gradient flowed.
    pub fn get_param_grad(&self, id: BufId) -> Vec<f32> {
        assert_eq!(self.bufs[id].kind, BufKind::Param,
                   "get_param_grad called on non-param buffer {}", id);
        match &self.grad_accum[id] {
            Some(g) => g.clone(),
            None => vec![0.0; self.bufs[id].numel()],
        }
    }

    // ── Backward pass ────────────────────────────────────────────

    /// Replay ops in reverse, computing VJPs. The scalar loss is seeded with 1.
    pub fn backward(&mut self, loss_id: BufId) {
        self.recording = false;

        if self.grad_accum[loss_id].is_none() {
            assert_eq!(self.bufs[loss_id].numel(), 1,
                       "Auto-seeding only works for scalar loss (got {} elements)",
                       self.bufs[loss_id].numel());
            self.grad_accum[loss_id] = Some(vec![1.0]);
        }

        for op_idx in (0..self.ops.len()).rev() {
            let op = self.ops[op_idx].clone();
            self.backward_op(&op);
        }
    }

    fn backward_op(&mut self, op: &TapeOp) {
        match *op {
            // ── Matmul: out = A @ B ──────────────────────────────
            TapeOp::Matmul { a, b, out, m, k, n } => {
                let Some(d_out) = self.grad_accum[out].clone() else { return };

                if self.bufs[a].kind != BufKind::Const {
                    // d_A = d_out @ B^T
                    let mut b_t = vec![0.0f32; n * k];
                    tensor::transpose_f32(&self.bufs[b].data, &mut b_t, k, n);
                    let mut d_a = vec![0.0f32; m * k];
                    tensor::matmul_f32(&d_out, &b_t, &mut d_a, m, n, k);
                    self.accumulate_grad(a, &d_a);
                }

                if self.bufs[b].kind != BufKind::Const {
                    // d_B = A^T @ d_out
                    let mut a_t = vec![0.0f32; k * m];
                    tensor::transpose_f32(&self.bufs[a].data, &mut a_t, m, k);
                    let mut d_b = vec![0.0f32; k * n];
                    tensor::matmul_f32(&a_t, &d_out, &mut d_b, k, m, n);
                    self.accumulate_grad(b, &d_b);
                }
            }

            // ── Add: out = A + B ─────────────────────────────────
            TapeOp::Add { a, b, out } => {
                let Some(d_out) = self.grad_accum[out].clone() else { return };
                self.accumulate_grad(a, &d_out);
                self.accumulate_grad(b, &d_out);
            }

            // ── SplitRectify: out = [relu(x) ; relu(-x)] ─────────
            TapeOp::SplitRectify { input, out } => {
                let Some(d_out) = self.grad_accum[out].clone() else { return };
                let mut d_input = vec![0.0f32; self.bufs[input].numel()];
                tensor::split_rectify_backward_f32(&self.bufs[input].data, &d_out, &mut d_input);
                self.accumulate_grad(input, &d_input);
            }

            // ── SumSquaredDiff: out = Σ(A - B)² ──────────────────
            TapeOp::SumSquaredDiff { a, b, out } => {
                let Some(d_out) = self.grad_accum[out].clone() else { return };
                let scalar = d_out[0];
                let d_a: Vec<f32> = self.bufs[a].data.iter().zip(self.bufs[b].data.iter())
                    .map(|(x, y)| 2.0 * scalar * (x - y)).collect();
                let d_b: Vec<f32> = d_a.iter().map(|d| -d).collect();
                self.accumulate_grad(a, &d_a);
                self.accumulate_grad(b, &d_b);
            }
        }
    }
}

impl Default for Tape {
    fn default() -> Self {
        Tape::new()
    }
}

// ── Scoped activation ────────────────────────────────────────────────

thread_local! {
    static TAPE_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Drop guard that clears the TAPE_ACTIVE flag when scope exits, including
/// on panic.
struct TapeGuard;

impl Drop for TapeGuard {
    fn drop(&mut self) {
        TAPE_ACTIVE.with(|flag| flag.set(false));
    }
}

/// Execute a closure with a fresh tape. The tape lives only for the duration
/// of `f`; nested calls are not supported.
pub fn with_tape<F, R>(f: F) -> R
where
    F: FnOnce(&mut Tape) -> R,
{
    TAPE_ACTIVE.with(|flag| {
        debug_assert!(!flag.get(), "nested with_tape() calls are not supported");
        flag.set(true);
    });

    let _guard = TapeGuard;
    let mut tape = Tape::new();
    f(&mut tape)
}

/// True only while inside a `with_tape()` closure on this thread.
#[cfg(test)]
fn is_tape_active() -> bool {
    TAPE_ACTIVE.with(|flag| flag.get())
}

// ── Tests ────────────────────────────────────────────────────────────
