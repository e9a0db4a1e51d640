//! Reproducibility and the divergence abort.

use autobyte_core::adam::AdamConfig;
use autobyte_core::autoencoder::AutoencoderConfig;
use autobyte_core::ensemble::Ensemble;
use autobyte_core::error::AutobyteError;
use autobyte_core::generator::Generator;
use autobyte_core::histogram::SymbolHistogram;
use autobyte_core::markov::MarkovModel;
use autobyte_core::tensor::seeded_rng;
use autobyte_core::trainer::{Trainer, TrainReport};

const ALPHABET: usize = 16;

/// Deterministic pseudo-text over a 16-symbol alphabet with some structure.
fn corpus(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if i % 3 == 0 { (i / 3 % ALPHABET) as u8 } else { (state % ALPHABET as u32) as u8 }
        })
        .collect()
}

fn config() -> AutoencoderConfig {
    AutoencoderConfig { alphabet: ALPHABET, hidden: 8 }
}

fn run(seed: u64, data: &[u8]) -> (TrainReport, Vec<u8>) {
    let model = MarkovModel::from_bytes(4, ALPHABET, data).unwrap();
    let mut rng = seeded_rng(seed);
    let mut ensemble = Ensemble::new(config(), AdamConfig::default(), &mut rng);
    let mut cond = model.conditioner();
    let report = Trainer::new(0).train(&mut ensemble, &mut cond, data).unwrap();
    let text = Generator::new(rng).generate(&ensemble, &mut cond, &[1, 2, 3], 64).unwrap();
    (report, text)
}

#[test]
fn test_loss_trajectory_bit_identical() {
    let data = corpus(2048);
    let (r1, t1) = run(7, &data);
    let (r2, t2) = run(7, &data);

    assert!(r1.losses.len() >= 1024, "only {} iterations", r1.losses.len());
    let bits = |r: &TrainReport| r.losses.iter().map(|l| l.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&r1), bits(&r2));
    assert_eq!(r1.skipped, r2.skipped);
    assert_eq!(t1, t2);
}

#[test]
fn test_different_seed_changes_trajectory() {
    let data = corpus(512);
    let (r1, _) = run(7, &data);
    let (r2, _) = run(8, &data);
    assert_ne!(r1.losses, r2.losses);
}

#[test]
fn test_all_losses_finite_under_default_optimizer() {
    let data = corpus(4096);
    let (report, _) = run(3, &data);
    assert!(report.losses.iter().all(|l| l.is_finite()));
    assert_eq!(report.iterations + report.skipped, 4096);
}

#[test]
fn test_histogram_run_is_reproducible() {
    let data = corpus(1500);
    let go = || {
        let mut rng = seeded_rng(5);
        let mut ensemble = Ensemble::new(config(), AdamConfig::default(), &mut rng);
        let mut cond = SymbolHistogram::new(33, ALPHABET);
        let report = Trainer::new(1024).train(&mut ensemble, &mut cond, &data).unwrap();
        let text = Generator::new(rng).generate(&ensemble, &mut cond, &[4], 20).unwrap();
        (report, text)
    };
    let (r1, t1) = go();
    let (r2, t2) = go();
    assert_eq!(r1.iterations, 1023, "first position has an empty histogram");
    assert_eq!(r1.losses, r2.losses);
    assert_eq!(t1, t2);
}

#[test]
fn test_runaway_learning_rate_aborts() {
    // Each update moves every active weight by ~lr, so the second update of
    // the same network sees outputs far beyond f32 range.
    let data = vec![1u8; 16];
    let model = MarkovModel::from_bytes(1, 4, &data).unwrap();
    let adam = AdamConfig { lr: 1e30, ..AdamConfig::default() };
    let mut ensemble = Ensemble::new(AutoencoderConfig::test_config(), adam, &mut seeded_rng(1));
    let mut trainer = Trainer::new(0);

    let err = trainer.train(&mut ensemble, &mut model.conditioner(), &data).unwrap_err();
    match err {
        AutobyteError::NumericDivergence { iteration, loss } => {
            assert_eq!(iteration, 2);
            assert!(!loss.is_finite());
        }
        other => panic!("expected divergence, got {other:?}"),
    }
    assert_eq!(trainer.iteration(), 1);
    assert_eq!(ensemble.step_count(1), 1);
}
