//! Online training: one symbol, one network, one update.
//!
//! At each position the conditioner's feature trains the network selected by
//! the observed symbol, then the context advances with that symbol. Positions
//! without a feature are skipped but still advance the context.

use tracing::{debug, error, info};

use crate::conditioner::Conditioner;
use crate::ensemble::Ensemble;
use crate::error::{AutobyteError, Result};

/// Progress cadence: every iteration below 1024, then every multiple of 1024.
#[inline]
pub fn should_report(iteration: u64) -> bool {
    iteration < 1024 || iteration % 1024 == 0
}

/// Outcome of one `Trainer::train` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainReport {
    /// Updates applied during this call.
    pub iterations: u64,
    /// Positions skipped for lack of a feature.
    pub skipped: u64,
    pub final_loss: Option<f32>,
    /// Loss of every applied update, in order.
    pub losses: Vec<f32>,
}

pub struct Trainer {
    /// Applied updates across all `train` calls. Never reset.
    iteration: u64,
    /// Bytes consumed per stream; 0 = whole stream.
    max_bytes: usize,
}

impl Trainer {
    pub fn new(max_bytes: usize) -> Self {
        Trainer { iteration: 0, max_bytes }
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Train over one byte stream. The conditioner is reset to the start of
    /// stream first. A NaN or infinite loss aborts before any update is applied.
    pub fn train(
        &mut self,
        ensemble: &mut Ensemble,
        conditioner: &mut dyn Conditioner,
        bytes: &[u8],
    ) -> Result<TrainReport> {
        if conditioner.alphabet() != ensemble.config().alphabet {
            return Err(AutobyteError::ShapeMismatch {
                what: "conditioner alphabet",
                expected: ensemble.config().alphabet,
                got: conditioner.alphabet(),
            });
        }
        let bytes = match self.max_bytes {
            0 => bytes,
            n => &bytes[..n.min(bytes.len())],
        };
        let alphabet = ensemble.len();
        let mut report = TrainReport::default();
        conditioner.reset();

        for &symbol in bytes {
            if symbol as usize >= alphabet {
                return Err(AutobyteError::SymbolOutOfAlphabet { symbol, alphabet });
            }
            let Some(feature) = conditioner.feature() else {
                report.skipped += 1;
                conditioner.advance(symbol);
                continue;
            };

            let (loss, grads) = ensemble.forward_and_loss(symbol, &feature)?;
            if !loss.is_finite() {
                let iteration = self.iteration + 1;
                error!(iteration, loss, symbol, "training diverged");
                return Err(AutobyteError::NumericDivergence { iteration, loss });
            }
            let stats = ensemble.update(symbol, &grads)?;

            self.iteration += 1;
            report.iterations += 1;
            report.losses.push(loss);
            report.final_loss = Some(loss);
            if should_report(self.iteration) {
                info!(iteration = self.iteration, loss, "train");
            }
            debug!(
                symbol,
                grad_norm = stats.grad_norm,
                clip_scale = stats.clip_scale,
                net_step = stats.step,
                "update"
            );

            conditioner.advance(symbol);
        }

        info!(
            iterations = report.iterations,
            skipped = report.skipped,
            final_loss = ?report.final_loss,
            "stream done"
        );
        Ok(report)
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

    fn ensemble(seed: u64) -> Ensemble {
        Ensemble::new(AutoencoderConfig::test_config(), AdamConfig::default(), &mut seeded_rng(seed))
    }

    /// Conditioner that always yields the same feature.
    struct Fixed(Vec<f32>);

    impl Conditioner for Fixed {
        fn alphabet(&self) -> usize {
            self.0.len()
        }
        fn reset(&mut self) {}
        fn advance(&mut self, _symbol: u8) {}
        fn feature(&self) -> Option<Vec<f32>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn test_report_cadence() {
        assert!(should_report(1));
        assert!(should_report(1023));
        assert!(!should_report(1025));
        assert!(should_report(2048));
        assert!(!should_report(3000));
    }

    #[test]
    fn test_one_update_per_covered_position() {
        let corpus = [1u8, 0, 2, 3, 1, 0, 2, 3];
        let model = MarkovModel::from_bytes(2, 4, &corpus).unwrap();
        let mut e = ensemble(3);
        let mut trainer = Trainer::new(0);
        let report = trainer.train(&mut e, &mut model.conditioner(), &corpus).unwrap();

        // Training on the corpus the tables came from: every position is covered.
        assert_eq!(report.iterations, 8);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.losses.len(), 8);
        assert_eq!(report.final_loss, report.losses.last().copied());
        for s in 0..4u8 {
            assert_eq!(e.step_count(s), 2, "symbol {s} appears twice");
        }
        assert_eq!(trainer.iteration(), 8);
    }

    #[test]
    fn test_uncovered_positions_skip_but_advance() {
        let model = MarkovModel::from_bytes(1, 4, &[1, 2, 1]).unwrap();
        let mut e = ensemble(3);
        let mut trainer = Trainer::new(0);
        // Contexts (0), (1) and (2) are known; (3) never was.
        let report = trainer.train(&mut e, &mut model.conditioner(), &[1, 3, 2, 1]).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.iterations, 3);
        assert_eq!(e.step_count(2), 0, "position after 3 was skipped");
        assert_eq!(e.step_count(1), 2);
        assert_eq!(e.step_count(3), 1);
    }

    #[test]
    fn test_byte_limit() {
        let corpus = [0u8, 1, 2, 3, 0, 1, 2, 3];
        let mut e = ensemble(1);
        let mut trainer = Trainer::new(3);
        let report = trainer.train(&mut e, &mut SymbolHistogram::new(4, 4), &corpus).unwrap();
        // Empty histogram at position 0, then two updates.
        assert_eq!(report.skipped, 1);
        assert_eq!(report.iterations, 2);
    }

    #[test]
    fn test_iteration_persists_across_streams() {
        let mut e = ensemble(1);
        let mut trainer = Trainer::new(0);
        let mut cond = Fixed(vec![0.25; 4]);
        trainer.train(&mut e, &mut cond, &[0, 1]).unwrap();
        let second = trainer.train(&mut e, &mut cond, &[2, 3, 0]).unwrap();
        assert_eq!(second.iterations, 3);
        assert_eq!(trainer.iteration(), 5);
        assert_eq!(e.step_count(0), 2);
    }

    #[test]
    fn test_nan_loss_aborts_without_update() {
        let mut e = ensemble(1);
        let before = e.params(2).clone();
        let mut trainer = Trainer::new(0);
        let mut cond = Fixed(vec![f32::NAN; 4]);
        let err = trainer.train(&mut e, &mut cond, &[2, 2]).unwrap_err();
        match err {
            AutobyteError::NumericDivergence { iteration, loss } => {
                assert_eq!(iteration, 1);
                assert!(loss.is_nan());
            }
            other => panic!("expected divergence, got {other:?}"),
        }
        assert_eq!(e.params(2), &before);
        assert_eq!(e.step_count(2), 0);
        assert_eq!(trainer.iteration(), 0);
    }

    #[test]
    fn test_rejects_out_of_alphabet_symbol() {
        let mut e = ensemble(1);
        let mut trainer = Trainer::new(0);
        let err = trainer.train(&mut e, &mut Fixed(vec![0.25; 4]), &[0, 7]).unwrap_err();
        assert!(matches!(err, AutobyteError::SymbolOutOfAlphabet { symbol: 7, alphabet: 4 }));
    }

    #[test]
    fn test_rejects_mismatched_conditioner() {
        let mut e = ensemble(1);
        let mut trainer = Trainer::new(0);
        let err = trainer.train(&mut e, &mut Fixed(vec![0.5; 2]), &[0]).unwrap_err();
        assert!(matches!(err, AutobyteError::ShapeMismatch { expected: 4, got: 2, .. }));
    }
}
