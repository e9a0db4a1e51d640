//! Run configuration: defaults, JSON file loading, validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::adam::AdamConfig;
use crate::autoencoder::AutoencoderConfig;
use crate::error::{AutobyteError, Result};
use crate::markov::MAX_ORDER;

/// Which conditioner produces the feature vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Backoff Markov context over the training corpus.
    Markov,
    /// Normalised counts of the last `histogram_window` symbols.
    Histogram,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub order: usize,
    pub alphabet: usize,
    pub hidden: usize,
    pub seed: u64,

    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub clip_norm: f32,

    /// Bytes of the training stream consumed; 0 = all of it.
    pub max_train_bytes: usize,
    pub generate_steps: usize,
    pub prompt: String,

    pub feature: FeatureKind,
    pub histogram_window: usize,

    pub corpus_dir: PathBuf,
    pub sources: Vec<String>,
    /// Index into `sources` of the corpus to train and generate with.
    pub train_source: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            order: 4,
            alphabet: 256,
            hidden: 256,
            seed: 1,
            learning_rate: 1e-3,
            beta1: 0.8,
            beta2: 0.89,
            eps: 1e-8,
            clip_norm: 1.0,
            max_train_bytes: 256 * 1024,
            generate_steps: 33,
            prompt: "What is the meaning of life?".to_string(),
            feature: FeatureKind::Markov,
            histogram_window: 33,
            corpus_dir: PathBuf::from("books"),
            sources: [
                "10.txt.utf-8",
                "pg74.txt",
                "76.txt.utf-8",
                "84.txt.utf-8",
                "100.txt.utf-8",
                "1837.txt.utf-8",
                "2701.txt.utf-8",
                "3176.txt.utf-8",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            train_source: 0,
        }
    }
}

impl RunConfig {
    /// Read a JSON file; missing keys take their defaults. Not validated.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(AutobyteError::InvalidConfig(msg)) };
        if self.order == 0 || self.order > MAX_ORDER {
            return invalid(format!("order must be in 1..={MAX_ORDER}, got {}", self.order));
        }
        if self.alphabet == 0 || self.alphabet > 256 {
            return invalid(format!("alphabet must be in 1..=256, got {}", self.alphabet));
        }
        if self.hidden == 0 {
            return invalid("hidden must be positive".to_string());
        }
        if !(self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return invalid(format!("{name} must be in [0, 1), got {beta}"));
            }
        }
        if !(self.clip_norm > 0.0) {
            return invalid(format!("clip_norm must be positive, got {}", self.clip_norm));
        }
        if self.histogram_window == 0 {
            return invalid("histogram_window must be positive".to_string());
        }
        if self.sources.is_empty() {
            return invalid("at least one source is required".to_string());
        }
        if self.train_source >= self.sources.len() {
            return invalid(format!(
                "train_source {} out of range for {} sources",
                self.train_source,
                self.sources.len()
            ));
        }
        if let Some(&b) = self.prompt.as_bytes().iter().find(|&&b| b as usize >= self.alphabet) {
            return invalid(format!("prompt byte {b} outside alphabet of size {}", self.alphabet));
        }
        Ok(())
    }

    pub fn autoencoder(&self) -> AutoencoderConfig {
        AutoencoderConfig { alphabet: self.alphabet, hidden: self.hidden }
    }

    pub fn adam(&self) -> AdamConfig {
        AdamConfig {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            clip_norm: self.clip_norm,
        }
    }
}
