//! Binned template type stored under each key.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A 1D histogram: bin edges, contents and optional per-bin sum of squared weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bin edges (length = n_bins + 1, strictly increasing).
    pub bin_edges: Vec<f64>,
    /// Bin contents (length = n_bins, excluding under/overflow).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin (for statistical errors), if stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumw2: Option<Vec<f64>>,
    /// Total number of entries.
    #[serde(default)]
    pub entries: f64,
}

impl Histogram {
    /// Create a histogram without sumw2. Errors are computed as Poisson (`sqrt(content)`).
    pub fn new(bin_edges: Vec<f64>, bin_content: Vec<f64>) -> Result<Self> {
        let h = Self { bin_edges, bin_content, sumw2: None, entries: 0.0 };
        h.validate("<new>")?;
        Ok(h)
    }

    /// Uniform binning over `[x_min, x_max)`.
    pub fn uniform(x_min: f64, x_max: f64, bin_content: Vec<f64>) -> Result<Self> {
        let n = bin_content.len().max(1);
        let width = (x_max - x_min) / n as f64;
        let edges = (0..=n).map(|i| x_min + width * i as f64).collect();
        Self::new(edges, bin_content)
    }

    /// Attach per-bin sum of squared weights.
    pub fn with_sumw2(mut self, sumw2: Vec<f64>) -> Result<Self> {
        self.sumw2 = Some(sumw2);
        self.validate("<new>")?;
        Ok(self)
    }

    /// Number of bins (excluding under/overflow).
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Centre of bin `i` (0-based).
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.bin_edges[i] + self.bin_edges[i + 1])
    }

    /// Sum of bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Statistical error of bin `i`: `sqrt(sumw2)` if stored, else `sqrt(content)`.
    pub fn bin_error(&self, i: usize) -> f64 {
        match self.sumw2.as_ref() {
            Some(sw2) => sw2[i].max(0.0).sqrt(),
            None => self.bin_content[i].max(0.0).sqrt(),
        }
    }

    /// All per-bin statistical errors.
    pub fn bin_errors(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|i| self.bin_error(i)).collect()
    }

    /// Multiply contents by `factor` (sumw2 by `factor^2`).
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.bin_content {
            *v *= factor;
        }
        if let Some(sw2) = self.sumw2.as_mut() {
            for v in sw2 {
                *v *= factor * factor;
            }
        }
    }

    /// Check binning and content consistency. `key` only labels the error.
    pub fn validate(&self, key: &str) -> Result<()> {
        let invalid = |reason: String| StoreError::InvalidHistogram { key: key.to_string(), reason };
        let n = self.bin_content.len();
        if n == 0 {
            return Err(invalid("no bins".into()));
        }
        if self.bin_edges.len() != n + 1 {
            return Err(invalid(format!(
                "bin edge count mismatch: got={} expected={}",
                self.bin_edges.len(),
                n + 1
            )));
        }
        if self.bin_edges.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(invalid("bin edges must be strictly increasing".into()));
        }
        if self.bin_content.iter().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite bin content".into()));
        }
        if let Some(sw2) = self.sumw2.as_ref() {
            if sw2.len() != n {
                return Err(invalid(format!(
                    "sumw2 length mismatch: got={} expected={}",
                    sw2.len(),
                    n
                )));
            }
            if sw2.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(invalid("sumw2 must be finite and non-negative".into()));
            }
        }
        Ok(())
    }
}
