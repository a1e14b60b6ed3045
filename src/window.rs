//! Analysis Window Construction
//!
//! Builds tapering windows for overlap-add processing and normalizes them so
//! that overlapping copies spaced by the hop step sum to unity across time.
//! Construction fails when the requested window/step pair does not satisfy
//! the constant overlap-add (COLA) property within tolerance.

use std::f64::consts::PI;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ColaError, Result};

/// Window family selection
///
/// Even window lengths are sampled periodically (the symmetric window of
/// length `n + 1` with the last sample dropped), odd lengths symmetrically.
/// `Custom` supplies explicit sample values and must match the window length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Hann,
    Hamming,
    Blackman,
    Triangular,
    Boxcar,
    Custom(Vec<f64>),
}

impl Default for WindowKind {
    fn default() -> Self {
        Self::Hann
    }
}

impl WindowKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hann" => Some(Self::Hann),
            "hamming" => Some(Self::Hamming),
            "blackman" => Some(Self::Blackman),
            "triangular" => Some(Self::Triangular),
            "boxcar" => Some(Self::Boxcar),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hann => "hann",
            Self::Hamming => "hamming",
            Self::Blackman => "blackman",
            Self::Triangular => "triangular",
            Self::Boxcar => "boxcar",
            Self::Custom(_) => "custom",
        }
    }
}

/// A window normalized by its COLA constant
///
/// `samples` is the raw window divided by `constant`, so that copies of
/// `samples` spaced by the hop step sum to 1.0 at every sample offset.
#[derive(Debug, Clone)]
pub struct NormalizedWindow {
    pub samples: Array1<f64>,
    pub constant: f64,
}

impl NormalizedWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Build and normalize the analysis window for a given hop step.
///
/// Fails with `Validation` when the window/step pair does not satisfy the
/// constant overlap-add property within `tolerance` (relative to the COLA
/// constant), and with `Configuration` when a custom window has the wrong
/// length.
pub fn build_window(
    kind: &WindowKind,
    n_samples: usize,
    step: usize,
    tolerance: f64,
) -> Result<NormalizedWindow> {
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
    let raw = sample_window(kind, n_samples)?;
    let constant = cola_constant(&raw, n_samples, step, kind.name(), tolerance)?;
    let samples = Array1::from_iter(raw.into_iter().map(|w| w / constant));
    Ok(NormalizedWindow { samples, constant })
}

/// Evaluate the window family at `n_samples` points.
fn sample_window(kind: &WindowKind, n_samples: usize) -> Result<Vec<f64>> {
    if let WindowKind::Custom(values) = kind {
        if values.len() != n_samples {
            return Err(ColaError::Configuration(format!(
                "custom window has {} samples, expected {}",
                values.len(),
                n_samples
            )));
        }
        return Ok(values.clone());
    }

    // Even lengths use the periodic variant, odd lengths the symmetric one.
    let periodic = (n_samples - 1) % 2 == 1;
    let m = if periodic { n_samples + 1 } else { n_samples };
    let mut values = sample_symmetric(kind, m);
    values.truncate(n_samples);
    Ok(values)
}

fn sample_symmetric(kind: &WindowKind, m: usize) -> Vec<f64> {
    if m == 1 {
        return vec![1.0];
    }
    match kind {
        WindowKind::Hann => cosine_sum(&[0.5, 0.5], m),
        WindowKind::Hamming => cosine_sum(&[0.54, 0.46], m),
        WindowKind::Blackman => cosine_sum(&[0.42, 0.5, 0.08], m),
        WindowKind::Triangular => triangular(m),
        WindowKind::Boxcar => vec![1.0; m],
        WindowKind::Custom(_) => unreachable!("custom windows are not sampled"),
    }
}

/// Generalized cosine window: w[n] = sum_k (-1)^k a_k cos(2 pi k n / (m - 1)).
fn cosine_sum(coeffs: &[f64], m: usize) -> Vec<f64> {
    let denom = (m - 1) as f64;
    (0..m)
        .map(|n| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (2.0 * PI * k as f64 * n as f64 / denom).cos()
                })
                .sum()
        })
        .collect()
}

fn triangular(m: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(m);
    if m % 2 == 1 {
        let half = (m + 1) / 2;
        for n in 1..=half {
            values.push(2.0 * n as f64 / (m as f64 + 1.0));
        }
        for n in (1..half).rev() {
            values.push(2.0 * n as f64 / (m as f64 + 1.0));
        }
    } else {
        let half = m / 2;
        for n in 1..=half {
            values.push((2.0 * n as f64 - 1.0) / m as f64);
        }
        for n in (1..=half).rev() {
            values.push((2.0 * n as f64 - 1.0) / m as f64);
        }
    }
    values
}

/// Check the constant overlap-add property and return the COLA constant.
///
/// Window values are summed into step-wide bins aligned to the window start;
/// the final partial bin wraps onto the first bin's tail. The constant is the
/// median bin sum, and the maximum absolute deviation of any bin sum from it
/// must stay within `tolerance * constant`.
fn cola_constant(
    window: &[f64],
    n_samples: usize,
    step: usize,
    name: &str,
    tolerance: f64,
) -> Result<f64> {
    let mut bin_sums = vec![0.0; step];
    for segment in 0..n_samples / step {
        for j in 0..step {
            bin_sums[j] += window[segment * step + j];
        }
    }
    let partial = n_samples % step;
    if partial != 0 {
        for j in 0..partial {
            bin_sums[j] += window[n_samples - partial + j];
        }
    }

    let constant = median(&bin_sums);
    let deviation = bin_sums
        .iter()
        .map(|b| (b - constant).abs())
        .fold(0.0, f64::max);
    if deviation > tolerance * constant {
        return Err(ColaError::Validation(format!(
            "segment length {} with step {} for {} window does not give a constant output ({:.4}% deviation)",
            n_samples,
            step,
            name,
            100.0 * deviation / constant
        )));
    }
    Ok(constant)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
