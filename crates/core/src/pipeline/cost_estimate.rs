use std::sync::atomic::{AtomicU64, Ordering};

/// Exponential moving average of a stage's execution time, in seconds.
///
/// Stored as `f64` bits in an atomic so the scheduler and the renderer can
/// read it without taking the stage's locks.
#[derive(Debug)]
pub struct CostEstimate {
    bits: AtomicU64,
    alpha: f64,
}

impl CostEstimate {
    pub fn new(initial: f64, alpha: f64) -> Self {
        Self {
            bits: AtomicU64::new(initial.to_bits()),
            alpha,
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Folds in one measurement: `avg = alpha * sample + (1 - alpha) * avg`.
    /// Returns the new average.
    pub fn record(&self, sample: f64) -> f64 {
        let alpha = self.alpha;
        let blend = |bits: u64| {
            let avg = f64::from_bits(bits);
            (alpha * sample + (1.0 - alpha) * avg).to_bits()
        };
        let previous = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| Some(blend(bits)))
            .unwrap_or_else(|bits| bits);
        f64::from_bits(blend(previous))
    }
}
