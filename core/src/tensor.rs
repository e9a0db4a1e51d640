/// Minimal tensor utilities for the autoencoder ensemble.
///
/// All operations are free functions on flat f32 slices with explicit dimensions.
/// Row-major layout throughout. Matrices are stored `[rows = fan_out, cols = fan_in]`
/// so a matrix-vector product walks contiguous rows.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Matrix multiply: C[M,N] = A[M,K] @ B[K,N].  Row-major.
/// `out` must be pre-allocated with M*N elements (will be overwritten).
pub fn matmul_f32(a: &[f32], b: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(out.len(), m * n);

    for i in 0..m {
        let row = &a[i * k..(i + 1) * k];
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += row[p] * b[p * n + j];
            }
            out[i * n + j] = sum;
        }
    }
}

/// Transpose A[M,K] → out[K,M].
pub fn transpose_f32(a: &[f32], out: &mut [f32], m: usize, k: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(out.len(), k * m);

    for i in 0..m {
        for j in 0..k {
            out[j * m + i] = a[i * k + j];
        }
    }
}

/// Element-wise add: out[i] = a[i] + b[i].
pub fn add_f32(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for i in 0..a.len() {
        out[i] = a[i] + b[i];
    }
}

/// Channel-doubling rectifier. `out` has 2*len(x) elements:
///   out[i]       = max(x[i], 0)
///   out[n + i]   = max(-x[i], 0)
pub fn split_rectify_f32(x: &[f32], out: &mut [f32]) {
    let n = x.len();
    debug_assert_eq!(out.len(), 2 * n);
    for i in 0..n {
        let v = x[i];
        out[i] = if v > 0.0 { v } else { 0.0 };
        out[n + i] = if v < 0.0 { -v } else { 0.0 };
    }
}

/// VJP of `split_rectify_f32`: d_x[i] = d_out[i]·[x>0] − d_out[n+i]·[x<0].
pub fn split_rectify_backward_f32(x: &[f32], d_out: &[f32], d_x: &mut [f32]) {
    let n = x.len();
    debug_assert_eq!(d_out.len(), 2 * n);
    debug_assert_eq!(d_x.len(), n);
    for i in 0..n {
        let v = x[i];
        d_x[i] = if v > 0.0 {
            d_out[i]
        } else if v < 0.0 {
            -d_out[n + i]
        } else {
            0.0
        };
    }
}

/// Quadratic loss: sum_i (a[i] - b[i])^2.
pub fn sum_squared_diff_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

/// Squared L2 norm: sum(a[i]^2).
pub fn sq_norm_f32(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>()
}

/// Deterministic RNG used for weight init and sampling draws.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Fill `buf` with He-scaled Gaussian noise: N(0, 1) * sqrt(2 / fan_in).
pub fn fill_he_normal(rng: &mut ChaCha8Rng, buf: &mut [f32], fan_in: usize) {
    let scale = (2.0 / fan_in.max(1) as f64).sqrt();
    for v in buf.iter_mut() {
        let z: f64 = StandardNormal.sample(rng);
        *v = (z * scale) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_identity() {
        let a = [1.0, 0.0, 0.0, 1.0f32];
        let b = [1.0, 2.0, 3.0, 4.0f32];
        let mut out = [0.0f32; 4];
        matmul_f32(&a, &b, &mut out, 2, 2, 2);
        assert_eq!(out, b);
    }

    #[test]
    fn test_matmul_matrix_vector() {
        // [2,3] @ [3,1]
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0f32];
        let x = [1.0, 0.0, -1.0f32];
        let mut out = [0.0f32; 2];
        matmul_f32(&a, &x, &mut out, 2, 3, 1);
        assert_eq!(out, [-2.0, -2.0]);
    }

    #[test]
    fn test_transpose() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0f32];
        let mut out = [0.0f32; 6];
        transpose_f32(&a, &mut out, 2, 3);
        assert_eq!(out, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_split_rectify_blocks() {
        let x = [1.5, -2.0, 0.0f32];
        let mut out = [9.0f32; 6];
        split_rectify_f32(&x, &mut out);
        assert_eq!(out, [1.5, 0.0, 0.0, 0.0, 2.0, 0.0]);
        // Both channels are non-negative and recover x as pos - neg.
        for i in 0..3 {
            assert!(out[i] >= 0.0 && out[3 + i] >= 0.0);
            assert_eq!(out[i] - out[3 + i], x[i]);
        }
    }

    #[test]
    fn test_split_rectify_backward_matches_fd() {
        let x = [0.7f32, -0.3, 1.2, -2.5];
        let d_out = [0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        let mut d_x = [0.0f32; 4];
        split_rectify_backward_f32(&x, &d_out, &mut d_x);

        let eps = 1e-3;
        for i in 0..4 {
            let f = |xi: f32| {
                let mut xs = x;
                xs[i] = xi;
                let mut o = [0.0f32; 8];
                split_rectify_f32(&xs, &mut o);
                o.iter().zip(d_out.iter()).map(|(a, b)| a * b).sum::<f32>()
            };
            let numerical = (f(x[i] + eps) - f(x[i] - eps)) / (2.0 * eps);
            assert!((numerical - d_x[i]).abs() < 1e-3,
                "d_x[{i}]: analytical={}, numerical={numerical}", d_x[i]);
        }
    }

    #[test]
    fn test_sum_squared_diff() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [1.0f32, 0.0, 5.0];
        assert_eq!(sum_squared_diff_f32(&a, &b), 8.0);
        assert_eq!(sum_squared_diff_f32(&a, &a), 0.0);
    }

    #[test]
    fn test_sq_norm_basic() {
        assert_eq!(sq_norm_f32(&[3.0f32, 4.0]), 25.0);
        assert_eq!(sq_norm_f32(&[0.0f32; 4]), 0.0);
    }

    #[test]
    fn test_he_init_deterministic() {
        let mut a = vec![0.0f32; 64];
        let mut b = vec![0.0f32; 64];
        fill_he_normal(&mut seeded_rng(7), &mut a, 16);
        fill_he_normal(&mut seeded_rng(7), &mut b, 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_he_init_scale() {
        // Sample std should be close to sqrt(2/fan_in).
        let fan_in = 512;
        let mut buf = vec![0.0f32; 50_000];
        fill_he_normal(&mut seeded_rng(1), &mut buf, fan_in);
        let n = buf.len() as f32;
        let mean = buf.iter().sum::<f32>() / n;
        let var = buf.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let expected = (2.0 / fan_in as f32).sqrt();
        assert!(mean.abs() < 0.01, "mean={mean}");
        assert!((var.sqrt() - expected).abs() < 0.05 * expected,
            "std={}, expected {expected}", var.sqrt());
    }
}
