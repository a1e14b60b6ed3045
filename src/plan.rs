//! Segmentation Planning
//!
//! Computes the ordered window boundaries covering a signal of known total
//! length. Starts advance by the hop step; every window spans the full
//! window length except the last, whose stop is forced to the total length
//! so the trailing remainder (always shorter than one step) is absorbed
//! into it.

use crate::error::{ColaError, Result};

/// Ordered (start, stop) sample offsets for overlap-add processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationPlan {
    starts: Vec<usize>,
    stops: Vec<usize>,
    remainder: usize,
}

impl SegmentationPlan {
    /// Plan windows of `n_samples` advancing by `step` over `n_total` samples.
    pub fn new(n_total: usize, n_samples: usize, step: usize) -> Result<Self> {
        if n_samples == 0 {
            return Err(ColaError::Configuration(
                "n_samples must be > 0, got 0".to_string(),
            ));
        }
        if step == 0 || step > n_samples {
            return Err(ColaError::Configuration(format!(
                "step must be in [1, n_samples], got {step}"
            )));
        }
        if n_total < n_samples {
            return Err(ColaError::Configuration(format!(
                "number of samples per window ({n_samples}) must be at most the total number of samples ({n_total})"
            )));
        }

        let mut starts = Vec::new();
        let mut start = 0;
        while start + n_samples <= n_total {
            starts.push(start);
            start += step;
        }
        let mut stops: Vec<usize> = starts.iter().map(|s| s + n_samples).collect();
        let last = stops.len() - 1;
        let remainder = n_total - stops[last];
        stops[last] = n_total;

        Ok(Self {
            starts,
            stops,
            remainder,
        })
    }

    /// Number of planned windows. Always at least one.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn stops(&self) -> &[usize] {
        &self.stops
    }

    /// The planned (start, stop) pairs in temporal order.
    pub fn segments(&self) -> Vec<(usize, usize)> {
        self.starts
            .iter()
            .zip(self.stops.iter())
            .map(|(&a, &b)| (a, b))
            .collect()
    }

    /// Length of the longest planned window (the last one when a remainder
    /// is absorbed, the nominal window length otherwise).
    pub fn max_len(&self) -> usize {
        self.starts
            .iter()
            .zip(self.stops.iter())
            .map(|(&a, &b)| b - a)
            .max()
            .unwrap_or(0)
    }

    /// Samples past the last full window, folded into the final one.
    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Total number of samples covered by the plan.
    pub fn n_total(&self) -> usize {
        *self.stops.last().unwrap_or(&0)
    }
}
