//! Per-bin statistical uncertainty of a template.

use cs_store::Histogram;
use serde::Serialize;

/// Statistical uncertainty of one bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatBin {
    /// Bin centre.
    pub bin_center: f64,
    /// Bin content.
    pub content: f64,
    /// `sqrt(sumw2)`, or `sqrt(content)` without weights.
    pub error: f64,
    /// `error / content`, 0 for empty bins.
    pub uncertainty: f64,
}

/// One entry per bin of `h`.
pub fn stat_uncertainty(h: &Histogram) -> Vec<StatBin> {
    (0..h.n_bins())
        .map(|i| {
            let content = h.bin_content[i];
            let error = h.bin_error(i);
            let uncertainty = if content != 0.0 { error / content } else { 0.0 };
            StatBin { bin_center: h.bin_center(i), content, error, uncertainty }
        })
        .collect()
}
