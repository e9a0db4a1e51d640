//! Error types shared by the whole crate.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between loading a corpus and printing
/// generated text.
#[derive(Debug, Error)]
pub enum AutobyteError {
    /// A training step produced a NaN or infinite loss. The run is over.
    #[error("numeric divergence at iteration {iteration}: loss = {loss}")]
    NumericDivergence { iteration: u64, loss: f32 },

    #[error("symbol {symbol} outside alphabet of size {alphabet}")]
    SymbolOutOfAlphabet { symbol: u8, alphabet: usize },

    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch { what: &'static str, expected: usize, got: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("source {source_id:?} not found under {}", root.display())]
    SourceNotFound { source_id: String, root: PathBuf },

    #[error("corpus {0:?} is empty")]
    EmptyCorpus(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AutobyteError>;
