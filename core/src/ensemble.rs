//! The per-symbol autoencoder ensemble.
//!
//! One network and one optimizer state per symbol, indexed directly by the
//! symbol value. Training touches exactly one network; evaluation reads any
//! network without mutating it.

use rand_chacha::ChaCha8Rng;

use crate::adam::{self, AdamConfig, AutoencoderOptState, UpdateStats};
use crate::autoencoder::{self, AutoencoderConfig, AutoencoderParams};
use crate::error::{AutobyteError, Result};

/// One symbol's network plus its optimizer state.
#[derive(Clone, Debug)]
struct SymbolNet {
    params: AutoencoderParams,
    opt: AutoencoderOptState,
}

pub struct Ensemble {
    cfg: AutoencoderConfig,
    adam: AdamConfig,
    nets: Vec<SymbolNet>,
}

impl Ensemble {
    /// Initialise `cfg.alphabet` networks in symbol order from one RNG stream.
    pub fn new(cfg: AutoencoderConfig, adam: AdamConfig, rng: &mut ChaCha8Rng) -> Self {
        let nets = (0..cfg.alphabet)
            .map(|_| {
                let params = AutoencoderParams::init(&cfg, rng);
                let opt = AutoencoderOptState::new(&params);
                SymbolNet { params, opt }
            })
            .collect();
        Ensemble { cfg, adam, nets }
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.cfg
    }

    pub fn adam_config(&self) -> &AdamConfig {
        &self.adam
    }

    /// Number of networks (= alphabet size).
    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn params(&self, symbol: u8) -> &AutoencoderParams {
        &self.nets[symbol as usize].params
    }

    /// Updates applied so far to `symbol`'s network.
    pub fn step_count(&self, symbol: u8) -> u32 {
        self.nets[symbol as usize].opt.step()
    }

    pub fn opt_state(&self, symbol: u8) -> &AutoencoderOptState {
        &self.nets[symbol as usize].opt
    }

    fn check(&self, symbol: u8, feature: &[f32]) -> Result<()> {
        if symbol as usize >= self.nets.len() {
            return Err(AutobyteError::SymbolOutOfAlphabet {
                symbol,
                alphabet: self.nets.len(),
            });
        }
        if feature.len() != self.cfg.alphabet {
            return Err(AutobyteError::ShapeMismatch {
                what: "feature",
                expected: self.cfg.alphabet,
                got: feature.len(),
            });
        }
        Ok(())
    }

    /// Traced forward + backward on `symbol`'s network. Nothing is mutated;
    /// the caller decides whether to apply the gradients.
    pub fn forward_and_loss(&self, symbol: u8, feature: &[f32]) -> Result<(f32, AutoencoderParams)> {
        self.check(symbol, feature)?;
        Ok(autoencoder::compute_gradients(&self.nets[symbol as usize].params, &self.cfg, feature))
    }

    /// Clipped Adam update of `symbol`'s network only.
    pub fn update(&mut self, symbol: u8, grads: &AutoencoderParams) -> Result<UpdateStats> {
        let alphabet = self.nets.len();
        let net = self.nets.get_mut(symbol as usize)
            .ok_or(AutobyteError::SymbolOutOfAlphabet { symbol, alphabet })?;
        Ok(adam::update(&mut net.params, grads, &mut net.opt, &self.adam))
    }

    /// Reconstruction loss of `feature` under `symbol`'s network. Read-only.
    pub fn evaluate(&self, symbol: u8, feature: &[f32]) -> Result<f32> {
        self.check(symbol, feature)?;
        Ok(autoencoder::evaluate(&self.nets[symbol as usize].params, &self.cfg, feature))
    }

    /// Loss under every network, in symbol order.
    pub fn evaluate_all(&self, feature: &[f32]) -> Result<Vec<f32>> {
        if feature.len() != self.cfg.alphabet {
            return Err(AutobyteError::ShapeMismatch {
                what: "feature",
                expected: self.cfg.alphabet,
                got: feature.len(),
            });
        }
        Ok(self.nets.iter()
            .map(|net| autoencoder::evaluate(&net.params, &self.cfg, feature))
            .collect())
    }
}
