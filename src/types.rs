use serde::{Deserialize, Serialize};

use crate::error::{ColaError, Result};
use crate::window::WindowKind;

/// Configuration for a streaming overlap-add engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColaConfig {
    /// Window length in samples; must be > 0
    pub n_samples: usize,

    /// Overlap between successive windows in samples; must be < n_samples
    pub n_overlap: usize,

    /// Total signal length in samples; must be >= n_samples
    pub n_total: usize,

    /// Sampling rate in Hz, used only for duration reporting
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Window family or explicit sample sequence
    #[serde(default)]
    pub window: WindowKind,

    /// Relative tolerance for the constant overlap-add check
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_tolerance() -> f64 {
    1e-10
}

impl ColaConfig {
    /// Create a configuration with the default Hann window and tolerance.
    pub fn new(n_samples: usize, n_overlap: usize, n_total: usize) -> Self {
        Self {
            n_samples,
            n_overlap,
            n_total,
            sample_rate: default_sample_rate(),
            window: WindowKind::default(),
            tolerance: default_tolerance(),
        }
    }

    pub fn with_window(mut self, window: WindowKind) -> Self {
        self.window = window;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Hop step between successive window starts.
    ///
    /// Meaningful only for configurations that pass [`validate`](Self::validate).
    pub fn step(&self) -> usize {
        self.n_samples - self.n_overlap
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_samples == 0 {
            return Err(ColaError::Configuration(
                "n_samples must be > 0, got 0".to_string(),
            ));
        }
        if self.n_overlap >= self.n_samples {
            return Err(ColaError::Configuration(format!(
                "n_overlap must be < n_samples ({}), got {}",
                self.n_samples, self.n_overlap
            )));
        }
        if self.n_total < self.n_samples {
            return Err(ColaError::Configuration(format!(
                "number of samples per window ({}) must be at most the total number of samples ({})",
                self.n_samples, self.n_total
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(ColaError::Configuration(format!(
                "tolerance must be > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Summary of one streamed reconstruction run, as written by the `cola` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: String,
    pub input_path: String,
    pub n_channels: usize,
    pub n_total: usize,
    pub n_windows: usize,
    pub window: String,
    pub n_samples: usize,
    pub n_overlap: usize,
    pub chunk_size: usize,
    pub max_reconstruction_error: f64,
    pub elapsed_ms: f64,
    pub created_at: String,
}

impl RunReport {
    pub fn new(
        input_path: String,
        n_channels: usize,
        config: &ColaConfig,
        n_windows: usize,
        chunk_size: usize,
        max_reconstruction_error: f64,
        elapsed_ms: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input_path,
            n_channels,
            n_total: config.n_total,
            n_windows,
            window: config.window.name().to_string(),
            n_samples: config.n_samples,
            n_overlap: config.n_overlap,
            chunk_size,
            max_reconstruction_error,
            elapsed_ms,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
