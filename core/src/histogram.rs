//! Sliding-window symbol histogram conditioner.
//!
//! Feature = normalised counts of the last `window` symbols. Order-free, so
//! it never misses once a single symbol has been seen.

use crate::conditioner::Conditioner;

#[derive(Clone, Debug)]
pub struct SymbolHistogram {
    alphabet: usize,
    counts: Vec<u32>,
    /// Ring of the last `window` symbols; `head` is the next write slot.
    ring: Vec<u8>,
    head: usize,
    filled: usize,
}

impl SymbolHistogram {
    pub fn new(window: usize, alphabet: usize) -> Self {
        assert!(window >= 1, "histogram window must be at least 1");
        SymbolHistogram {
            alphabet,
            counts: vec![0; alphabet],
            ring: vec![0; window],
            head: 0,
            filled: 0,
        }
    }

    pub fn window(&self) -> usize {
        self.ring.len()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }
}

impl Conditioner for SymbolHistogram {
    fn alphabet(&self) -> usize {
        self.alphabet
    }

    fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.head = 0;
        self.filled = 0;
    }

    fn advance(&mut self, symbol: u8) {
        debug_assert!((symbol as usize) < self.alphabet);
        if self.filled == self.ring.len() {
            let evicted = self.ring[self.head] as usize;
            self.counts[evicted] -= 1;
        } else {
            self.filled += 1;
        }
        self.ring[self.head] = symbol;
        self.counts[symbol as usize] += 1;
        self.head = (self.head + 1) % self.ring.len();
    }

    fn feature(&self) -> Option<Vec<f32>> {
        if self.filled == 0 {
            return None;
        }
        let total = self.filled as f32;
        Some(self.counts.iter().map(|&c| c as f32 / total).collect())
    }
}
