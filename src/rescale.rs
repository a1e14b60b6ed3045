//! Baseline Rescaling
//!
//! Corrects data against a baseline period: the mean (and, for z-scoring,
//! the standard deviation) of the baseline is taken over its time axis and
//! applied to every time point of the data. The contract is implemented for
//! two input variants, selected at compile time: a raw numeric buffer whose
//! last axis is time, and a labeled epoch container (epochs x channels x
//! time) whose baseline is first averaged across epochs.

use ndarray::{Array3, ArrayD, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ColaError, Result};

/// Baseline correction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMode {
    /// Subtract the baseline mean
    Mean,
    /// Divide by the baseline mean
    Ratio,
    /// Divide by the baseline mean and take log10
    LogRatio,
    /// Subtract then divide by the baseline mean
    Percent,
    /// Subtract the baseline mean and divide by the baseline deviation
    ZScore,
    /// Divide by the baseline mean, take log10, divide by the baseline deviation
    ZLogRatio,
}

impl BaselineMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Ratio => "ratio",
            Self::LogRatio => "logratio",
            Self::Percent => "percent",
            Self::ZScore => "zscore",
            Self::ZLogRatio => "zlogratio",
        }
    }
}

#[inline]
fn correct(mode: BaselineMode, value: f64, mean: f64, std: f64) -> f64 {
    match mode {
        BaselineMode::Mean => value - mean,
        BaselineMode::Ratio => value / mean,
        BaselineMode::LogRatio => (value / mean).log10(),
        BaselineMode::Percent => (value - mean) / mean,
        BaselineMode::ZScore => (value - mean) / std,
        BaselineMode::ZLogRatio => (value / mean).log10() / std,
    }
}

/// Baseline correction over a closed set of input variants.
pub trait BaselineRescale {
    type Baseline: ?Sized;

    /// Rescale in place against `baseline`.
    fn rescale(&mut self, baseline: &Self::Baseline, mode: BaselineMode) -> Result<()>;
}

impl BaselineRescale for ArrayD<f64> {
    type Baseline = ArrayD<f64>;

    /// The baseline must match the data in every dimension but the last;
    /// its mean and deviation are taken over time and broadcast over the
    /// data's time axis.
    fn rescale(&mut self, baseline: &ArrayD<f64>, mode: BaselineMode) -> Result<()> {
        if self.ndim() < 1 {
            return Err(ColaError::ShapeMismatch(
                "data must have at least one dimension".to_string(),
            ));
        }
        let t = self.ndim() - 1;
        if baseline.ndim() != self.ndim() || baseline.shape()[..t] != self.shape()[..t] {
            return Err(ColaError::ShapeMismatch(format!(
                "baseline has shape {:?}, expected leading shape {:?}",
                baseline.shape(),
                &self.shape()[..t]
            )));
        }
        let means = baseline.mean_axis(Axis(t)).ok_or_else(|| {
            ColaError::ShapeMismatch("baseline must contain at least one sample".to_string())
        })?;
        let stds = baseline.std_axis(Axis(t), 0.0);

        Zip::from(self.lanes_mut(Axis(t)))
            .and(&means)
            .and(&stds)
            .for_each(|mut lane, &m, &s| {
                lane.mapv_inplace(|v| correct(mode, v, m, s));
            });
        Ok(())
    }
}

/// Stack of equally-sized labeled epochs, shaped epochs x channels x time.
#[derive(Debug, Clone)]
pub struct EpochStack {
    data: Array3<f64>,
    channel_names: Vec<String>,
}

impl EpochStack {
    pub fn new(data: Array3<f64>, channel_names: Vec<String>) -> Result<Self> {
        if data.shape()[1] != channel_names.len() {
            return Err(ColaError::ShapeMismatch(format!(
                "data has {} channels, got {} channel names",
                data.shape()[1],
                channel_names.len()
            )));
        }
        Ok(Self {
            data,
            channel_names,
        })
    }

    pub fn n_epochs(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn n_channels(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn n_times(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channel_names.iter().position(|n| n == name)
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array3<f64> {
        self.data
    }

    /// Rescale the picked channels against a baseline recorded with the
    /// same channel layout. The baseline is averaged across its epochs
    /// before its per-channel mean and deviation are taken over time.
    pub fn rescale_channels(
        &mut self,
        baseline: &EpochStack,
        mode: BaselineMode,
        picks: &[usize],
    ) -> Result<()> {
        if baseline.n_channels() != self.n_channels() {
            return Err(ColaError::ShapeMismatch(format!(
                "baseline has {} channels, expected {}",
                baseline.n_channels(),
                self.n_channels()
            )));
        }
        if let Some(&bad) = picks.iter().find(|&&p| p >= self.n_channels()) {
            return Err(ColaError::Configuration(format!(
                "pick {} out of range for {} channels",
                bad,
                self.n_channels()
            )));
        }
        let averaged = baseline.data.mean_axis(Axis(0)).ok_or_else(|| {
            ColaError::ShapeMismatch("baseline must contain at least one epoch".to_string())
        })?;
        let means = averaged.mean_axis(Axis(1)).ok_or_else(|| {
            ColaError::ShapeMismatch("baseline must contain at least one sample".to_string())
        })?;
        let stds = averaged.std_axis(Axis(1), 0.0);

        log::info!("Applying baseline correction (mode: {})", mode.name());

        let mut picked = vec![false; self.n_channels()];
        for &p in picks {
            picked[p] = true;
        }
        self.data
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .for_each(|(ci, mut channel)| {
                if !picked[ci] {
                    return;
                }
                let m = means[ci];
                let s = stds[ci];
                channel.mapv_inplace(|v| correct(mode, v, m, s));
            });
        Ok(())
    }
}

impl BaselineRescale for EpochStack {
    type Baseline = EpochStack;

    fn rescale(&mut self, baseline: &EpochStack, mode: BaselineMode) -> Result<()> {
        let picks: Vec<usize> = (0..self.n_channels()).collect();
        self.rescale_channels(baseline, mode, &picks)
    }
}
