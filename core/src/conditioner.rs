//! Conditioner: the feature source the ensemble is trained and sampled on.
//!
//! A conditioner owns the per-stream context state. Training and generation
//! drive it identically: read `feature()`, then `advance()` with the symbol
//! that was observed or sampled.

/// Stateful feature source over a byte stream. Object-safe.
pub trait Conditioner {
    /// Width of the feature vector (and the number of candidate symbols).
    fn alphabet(&self) -> usize;

    /// Return to the start-of-stream state.
    fn reset(&mut self);

    /// Shift the context by one observed symbol.
    fn advance(&mut self, symbol: u8);

    /// Probability vector for the current context, or `None` when the
    /// context has no coverage.
    fn feature(&self) -> Option<Vec<f32>>;

    /// Replay a symbol sequence through `advance`.
    fn replay(&mut self, symbols: &[u8]) {
        for &s in symbols {
            self.advance(s);
        }
    }
}
