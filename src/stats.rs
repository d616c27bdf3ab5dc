//! Popcount Statistics
//!
//! Streaming mean and variance over encoding popcounts, using a
//! compensated online update so large batches stay numerically stable.

use crate::bloom::EncodedRecord;

/// Statistics error types
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("input contains non-finite numbers like \"nan\" or \"+/- inf\"")]
    NonFinite,
}

/// The Hamming weight of every encoded record, in order.
pub fn popcount_vector(records: &[EncodedRecord]) -> Vec<usize> {
    records.iter().map(|record| record.popcount).collect()
}

/// Online mean and variance accumulator.
///
/// Batches are merged with Chan's parallel update, which compensates
/// the cross term between the running total and the new batch.
#[derive(Debug, Clone, Default)]
pub struct OnlineMeanVariance {
    total: f64,
    count: usize,
    sum_of_squares: f64,
}

impl OnlineMeanVariance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of samples into the statistics.
    pub fn update(&mut self, samples: &[f64]) -> Result<(), StatsError> {
        if samples.iter().any(|x| !x.is_finite()) {
            return Err(StatsError::NonFinite);
        }
        if samples.is_empty() {
            return Ok(());
        }

        let batch_total: f64 = samples.iter().sum();
        let batch_count = samples.len() as f64;
        let batch_mean = batch_total / batch_count;
        let batch_squares: f64 = samples.iter().map(|x| (x - batch_mean).powi(2)).sum();

        if self.count == 0 {
            self.sum_of_squares += batch_squares;
        } else {
            let n = self.count as f64;
            let delta = batch_count / n * self.total - batch_total;
            self.sum_of_squares +=
                batch_squares + n / (batch_count * (batch_count + n)) * delta * delta;
        }
        self.total += batch_total;
        self.count += samples.len();
        Ok(())
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    /// Sample variance (Bessel corrected).
    pub fn variance(&self) -> f64 {
        if self.count <= 1 {
            0.0
        } else {
            self.sum_of_squares / (self.count - 1) as f64
        }
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }
}
