//! Order-N backoff Markov context model.
//!
//! `MarkovContext` is the sliding window: one fixed-length array per order,
//! most recent symbol first. `MarkovModel` holds one frequency table per order,
//! built in a single causal pass over a corpus and frozen afterwards.
//! `feature()` consults the longest order first and stops at the first hit.

use std::collections::HashMap;

use tracing::debug;

use crate::conditioner::Conditioner;
use crate::error::{AutobyteError, Result};

/// Upper bound on the configurable order.
pub const MAX_ORDER: usize = 8;

// ── Context window ──────────────────────────────────────────────────

/// Per-order sliding windows. Order `k` reads the first `k + 1` entries of
/// its own window. All windows start as the all-zero tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkovContext {
    order: usize,
    windows: Vec<[u8; MAX_ORDER]>,
}

impl MarkovContext {
    pub fn new(order: usize) -> Self {
        assert!(order >= 1 && order <= MAX_ORDER, "order must be in 1..={MAX_ORDER}");
        MarkovContext { order, windows: vec![[0u8; MAX_ORDER]; order] }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Context tuple for order `k`: `(latest, previous, ...)`, length `k + 1`.
    pub fn suffix(&self, k: usize) -> &[u8] {
        &self.windows[k][..k + 1]
    }

    /// Shift-and-insert at every order: `(s, prev[0], ..., prev[k-1])`.
    pub fn advance(&mut self, symbol: u8) {
        for (k, window) in self.windows.iter_mut().enumerate() {
            for i in (1..=k).rev() {
                window[i] = window[i - 1];
            }
            window[0] = symbol;
        }
    }

    pub fn reset(&mut self) {
        for window in self.windows.iter_mut() {
            *window = [0u8; MAX_ORDER];
        }
    }
}

// ── Frequency tables ────────────────────────────────────────────────

/// Frequency tables for orders `0..order`. Table `k` maps a context tuple of
/// length `k + 1` to the counts of the symbol that followed it.
#[derive(Clone, Debug)]
pub struct MarkovModel {
    order: usize,
    alphabet: usize,
    tables: Vec<HashMap<Box<[u8]>, Vec<u32>>>,
}

impl MarkovModel {
    /// Empty model. Every lookup misses until something is ingested.
    pub fn new(order: usize, alphabet: usize) -> Result<Self> {
        if order == 0 || order > MAX_ORDER {
            return Err(AutobyteError::InvalidConfig(
                format!("order must be in 1..={MAX_ORDER}, got {order}")));
        }
        if alphabet == 0 || alphabet > 256 {
            return Err(AutobyteError::InvalidConfig(
                format!("alphabet must be in 1..=256, got {alphabet}")));
        }
        Ok(MarkovModel { order, alphabet, tables: vec![HashMap::new(); order] })
    }

    /// Build the tables from one byte stream.
    pub fn from_bytes(order: usize, alphabet: usize, bytes: &[u8]) -> Result<Self> {
        let mut model = MarkovModel::new(order, alphabet)?;
        model.ingest(bytes)?;
        Ok(model)
    }

    /// Single left-to-right pass: count each symbol under the context that
    /// precedes it, then advance. No lookahead.
    fn ingest(&mut self, bytes: &[u8]) -> Result<()> {
        let mut context = MarkovContext::new(self.order);
        for &symbol in bytes {
            if symbol as usize >= self.alphabet {
                return Err(AutobyteError::SymbolOutOfAlphabet {
                    symbol,
                    alphabet: self.alphabet,
                });
            }
            for (k, table) in self.tables.iter_mut().enumerate() {
                let key = context.suffix(k);
                match table.get_mut(key) {
                    Some(counts) => counts[symbol as usize] += 1,
                    None => {
                        let mut counts = vec![0u32; self.alphabet];
                        counts[symbol as usize] = 1;
                        table.insert(key.into(), counts);
                    }
                }
            }
            context.advance(symbol);
        }
        debug!(
            symbols = bytes.len(),
            contexts = ?self.tables.iter().map(|t| t.len()).collect::<Vec<_>>(),
            "markov tables built"
        );
        Ok(())
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn alphabet(&self) -> usize {
        self.alphabet
    }

    /// Number of distinct context tuples in table `k`.
    pub fn num_contexts(&self, k: usize) -> usize {
        self.tables[k].len()
    }

    /// Raw count vector for an order-`k` tuple.
    pub fn counts(&self, k: usize, key: &[u8]) -> Option<&[u32]> {
        self.tables[k].get(key).map(|v| v.as_slice())
    }

    /// Longest-first backoff: the highest order whose table holds the
    /// context's tuple, with its counts.
    pub fn lookup(&self, context: &MarkovContext) -> Option<(usize, &[u32])> {
        debug_assert_eq!(context.order(), self.order);
        (0..self.order)
            .rev()
            .find_map(|k| self.counts(k, context.suffix(k)).map(|counts| (k, counts)))
    }

    /// Normalised count vector of the longest matching order.
    pub fn feature(&self, context: &MarkovContext) -> Option<Vec<f32>> {
        let (_, counts) = self.lookup(context)?;
        let sum = counts.iter().map(|&c| c as f32).sum::<f32>();
        if sum <= 0.0 {
            return None;
        }
        Some(counts.iter().map(|&c| c as f32 / sum).collect())
    }

    /// Fresh start-of-stream conditioner over this model.
    pub fn conditioner(&self) -> MarkovConditioner<'_> {
        MarkovConditioner { model: self, context: MarkovContext::new(self.order) }
    }
}

// ── Conditioner adapter ─────────────────────────────────────────────

/// A stream's context paired with the (shared, frozen) tables it reads.
pub struct MarkovConditioner<'m> {
    model: &'m MarkovModel,
    context: MarkovContext,
}

impl MarkovConditioner<'_> {
    pub fn context(&self) -> &MarkovContext {
        &self.context
    }
}

impl Conditioner for MarkovConditioner<'_> {
    fn alphabet(&self) -> usize {
        self.model.alphabet()
    }

    fn reset(&mut self) {
        self.context.reset();
    }

    fn advance(&mut self, symbol: u8) {
        self.context.advance(symbol);
    }

    fn feature(&self) -> Option<Vec<f32>> {
        self.model.feature(&self.context)
    }
}
