//! Autoregressive sampling from a trained ensemble.
//!
//! Each step scores every candidate symbol by how much better its network
//! reconstructs the current feature than the worst network does:
//!
//!   score_i = max_j loss_j − loss_i
//!
//! and samples by inverse CDF over the normalised scores. The ensemble is
//! only read; nothing is trained here.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::conditioner::Conditioner;
use crate::ensemble::Ensemble;
use crate::error::{AutobyteError, Result};

/// `max(losses) − loss_i` for every candidate. NaN losses are ignored when
/// taking the maximum and produce NaN scores.
pub fn score_candidates(losses: &[f32]) -> Vec<f32> {
    let max = losses.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    losses.iter().map(|&l| max - l).collect()
}

/// Inverse-CDF draw over `scores` with `u` in [0, 1).
///
/// Walks the normalised scores in index order and returns the first index
/// whose cumulative mass exceeds `u`. When the scores sum to zero (or are not
/// finite) the last index is returned; when rounding leaves the cumulative sum
/// short of `u`, the last index with a positive score is returned.
pub fn sample_index(scores: &[f32], u: f64) -> usize {
    debug_assert!(!scores.is_empty());
    let last = scores.len() - 1;
    let total: f64 = scores.iter().map(|&s| s as f64).sum();
    if !(total > 0.0) || !total.is_finite() {
        return last;
    }
    let mut cumulative = 0.0f64;
    for (i, &s) in scores.iter().enumerate() {
        cumulative += s as f64 / total;
        if u < cumulative {
            return i;
        }
    }
    scores.iter().rposition(|&s| s > 0.0).unwrap_or(last)
}

/// Uniform pick used when the context has no feature.
#[inline]
fn uniform_index(alphabet: usize, u: f64) -> usize {
    ((u * alphabet as f64) as usize).min(alphabet - 1)
}

pub struct Generator {
    rng: ChaCha8Rng,
}

impl Generator {
    /// Draws come from `rng`; pass the stream that initialised the ensemble
    /// to make a whole run reproducible from one seed.
    pub fn new(rng: ChaCha8Rng) -> Self {
        Generator { rng }
    }

    /// Sample one symbol for the conditioner's current context. Does not
    /// advance the conditioner.
    pub fn next_symbol(&mut self, ensemble: &Ensemble, conditioner: &dyn Conditioner) -> Result<u8> {
        let u: f64 = self.rng.gen();
        let index = match conditioner.feature() {
            Some(feature) => {
                let losses = ensemble.evaluate_all(&feature)?;
                let scores = score_candidates(&losses);
                let total: f32 = scores.iter().sum();
                if !(total > 0.0) || !total.is_finite() {
                    warn!(total, "degenerate candidate scores, using fallback");
                }
                sample_index(&scores, u)
            }
            None => {
                debug!("no feature for context, drawing uniformly");
                uniform_index(ensemble.len(), u)
            }
        };
        Ok(index as u8)
    }

    /// Reset the conditioner, replay `seed` through it, then sample `steps`
    /// symbols. Returns the seed followed by the sampled symbols.
    pub fn generate(
        &mut self,
        ensemble: &Ensemble,
        conditioner: &mut dyn Conditioner,
        seed: &[u8],
        steps: usize,
    ) -> Result<Vec<u8>> {
        let alphabet = ensemble.len();
        if conditioner.alphabet() != alphabet {
            return Err(AutobyteError::ShapeMismatch {
                what: "conditioner alphabet",
                expected: alphabet,
                got: conditioner.alphabet(),
            });
        }
        if let Some(&symbol) = seed.iter().find(|&&s| s as usize >= alphabet) {
            return Err(AutobyteError::SymbolOutOfAlphabet { symbol, alphabet });
        }

        conditioner.reset();
        conditioner.replay(seed);

        let mut out = Vec::with_capacity(seed.len() + steps);
        out.extend_from_slice(seed);
        for _ in 0..steps {
            let symbol = self.next_symbol(ensemble, conditioner)?;
            out.push(symbol);
            conditioner.advance(symbol);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adam::AdamConfig;
    use crate::autoencoder::AutoencoderConfig;
    use crate::histogram::SymbolHistogram;
    use crate::markov::MarkovModel;
    use crate::tensor::seeded_rng;

    #[test]
    fn test_scores_are_max_minus_loss() {
        assert_eq!(score_candidates(&[1.0, 3.0, 2.0]), vec![2.0, 0.0, 1.0]);
        let s = score_candidates(&[1.0, f32::NAN, 2.0]);
        assert_eq!(s[0], 1.0);
        assert!(s[1].is_nan());
        assert_eq!(s[2], 0.0);
    }

    #[test]
    fn test_inverse_cdf_boundaries() {
        let scores = [1.0, 0.0, 3.0];
        assert_eq!(sample_index(&scores, 0.0), 0);
        assert_eq!(sample_index(&scores, 0.2499), 0);
        assert_eq!(sample_index(&scores, 0.25), 2);
        assert_eq!(sample_index(&scores, 0.9999), 2);
    }

    #[test]
    fn test_zero_score_candidate_never_chosen() {
        let scores = [2.0, 0.0, 2.0];
        for k in 0..100 {
            let u = k as f64 / 100.0;
            assert_ne!(sample_index(&scores, u), 1);
        }
    }

    #[test]
    fn test_degenerate_scores_fall_back_to_last() {
        assert_eq!(sample_index(&[0.0, 0.0, 0.0, 0.0], 0.3), 3);
        assert_eq!(sample_index(&[f32::NAN, 1.0], 0.3), 1);
        assert_eq!(sample_index(&[f32::INFINITY, 1.0, 0.0], 0.1), 2);
    }

    #[test]
    fn test_rounding_shortfall_picks_last_positive() {
        // u = 1 lies past every cumulative sum that rounds to at most 1.
        let scores = [0.1, 0.2, 0.7, 0.0];
        let idx = sample_index(&scores, 1.0);
        assert_eq!(idx, 2);
    }

    #[test]
    fn test_uniform_index_in_range() {
        assert_eq!(uniform_index(4, 0.0), 0);
        assert_eq!(uniform_index(4, 0.5), 2);
        assert_eq!(uniform_index(4, 0.999_999), 3);
    }

    #[test]
    fn test_generate_returns_seed_then_samples() {
        let mut rng = seeded_rng(7);
        let e = Ensemble::new(AutoencoderConfig::test_config(), AdamConfig::default(), &mut rng);
        let model = MarkovModel::from_bytes(2, 4, &[0, 1, 2, 3, 0, 1, 2, 3]).unwrap();
        let mut generator = Generator::new(rng);
        let out = generator.generate(&e, &mut model.conditioner(), &[1, 2], 10).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(&out[..2], &[1, 2]);
        assert!(out.iter().all(|&s| s < 4));
    }

    #[test]
    fn test_generate_deterministic_for_seed() {
        let run = || {
            let mut rng = seeded_rng(11);
            let e = Ensemble::new(AutoencoderConfig::test_config(), AdamConfig::default(), &mut rng);
            let mut generator = Generator::new(rng);
            generator.generate(&e, &mut SymbolHistogram::new(5, 4), &[0, 3], 20).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_generate_without_coverage_draws_uniformly() {
        // An empty model never has a feature.
        let e = Ensemble::new(AutoencoderConfig::test_config(), AdamConfig::default(), &mut seeded_rng(2));
        let model = MarkovModel::new(2, 4).unwrap();
        let mut generator = Generator::new(seeded_rng(3));
        let out = generator.generate(&e, &mut model.conditioner(), &[], 400).unwrap();
        for s in 0..4u8 {
            let n = out.iter().filter(|&&x| x == s).count();
            assert!(n > 50, "symbol {s} drawn {n} times out of 400");
        }
    }

    #[test]
    fn test_generate_rejects_seed_outside_alphabet() {
        let e = Ensemble::new(AutoencoderConfig::test_config(), AdamConfig::default(), &mut seeded_rng(2));
        let mut generator = Generator::new(seeded_rng(3));
        let err = generator.generate(&e, &mut SymbolHistogram::new(3, 4), &[1, 200], 1).unwrap_err();
        assert!(matches!(err, AutobyteError::SymbolOutOfAlphabet { symbol: 200, alphabet: 4 }));
    }
}
