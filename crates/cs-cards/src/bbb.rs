//! Bin-by-bin statistical uncertainties synthesized from template errors.
//!
//! Each eligible bin of a bound process gets its own shape systematic whose
//! up/down templates move that single bin by its statistical error. Errors
//! follow the usual staterror convention: `sqrt(sumw2)` when stored, else
//! Poisson `sqrt(content)`.

use std::collections::HashSet;
use std::sync::Arc;

use cs_core::{Error, Result};
use cs_store::Histogram;
use serde::Serialize;

use crate::registry::{
    Process, Registry, Scope, Selection, ShapeVariation, SystKind, Systematic, TemplateRef,
};
use crate::shapes::{KeyPattern, KeyTokens, Token};

/// Default systematic name pattern; `$#` is the 1-based bin index.
pub const DEFAULT_BBB_PATTERN: &str = "CMS_$ANALYSIS_$CHANNEL_$BIN_$ERA_$PROCESS_bin_$#";

/// Bin-by-bin synthesizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BinByBin {
    /// Minimum relative error `error / content` for a bin to get a systematic.
    pub add_threshold: f64,
    /// Rescale each variation to the nominal integral.
    pub fix_norm: bool,
    /// Name pattern of the synthesized systematics.
    pub pattern: String,
}

impl Default for BinByBin {
    fn default() -> Self {
        Self { add_threshold: 0.0, fix_norm: false, pattern: DEFAULT_BBB_PATTERN.to_string() }
    }
}

/// Outcome of [`BinByBin::add_bin_by_bin`].
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BinByBinReport {
    /// Processes marked as processed.
    pub processes: usize,
    /// Names of the created systematics, in creation order.
    pub created: Vec<String>,
    /// Bins below threshold or with zero error.
    pub skipped_bins: usize,
}

struct Planned {
    process: usize,
    entries: Vec<(Systematic, ShapeVariation)>,
}

impl BinByBin {
    /// Synthesizer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum relative error (inclusive) for a bin to get a systematic.
    pub fn add_threshold(mut self, threshold: f64) -> Self {
        self.add_threshold = threshold;
        self
    }

    /// Rescale variations to the nominal integral.
    pub fn fix_norm(mut self, fix_norm: bool) -> Self {
        self.fix_norm = fix_norm;
        self
    }

    /// Name pattern; must contain `$#`.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    fn compiled_pattern(&self) -> Result<KeyPattern> {
        if !(0.0..1.0).contains(&self.add_threshold) {
            return Err(Error::Configuration(format!(
                "bin-by-bin add_threshold must lie in [0, 1) (got {})",
                self.add_threshold
            )));
        }
        let pattern = KeyPattern::parse(&self.pattern)?;
        if !pattern.uses(Token::BinIndex) {
            return Err(Error::Configuration(format!(
                "bin-by-bin pattern '{}' must contain $#",
                self.pattern
            )));
        }
        if pattern.uses(Token::Systematic) {
            return Err(Error::Configuration(format!(
                "bin-by-bin pattern '{}' must not contain $SYSTEMATIC",
                self.pattern
            )));
        }
        Ok(pattern)
    }

    /// Whether bin `i` of `h` gets a systematic. Returns its error if so.
    fn eligible(&self, h: &Histogram, i: usize) -> Option<f64> {
        let error = h.bin_error(i);
        if error == 0.0 {
            return None;
        }
        let content = h.bin_content[i];
        if content <= 0.0 || error / content >= self.add_threshold {
            Some(error)
        } else {
            None
        }
    }

    fn shifted(&self, nominal: &Histogram, i: usize, delta: f64) -> Histogram {
        let mut h = Histogram {
            bin_edges: nominal.bin_edges.clone(),
            bin_content: nominal.bin_content.clone(),
            sumw2: None,
            entries: nominal.entries,
        };
        h.bin_content[i] = (h.bin_content[i] + delta).max(0.0);
        if self.fix_norm {
            let target = nominal.integral();
            let varied = h.integral();
            if varied != 0.0 {
                h.scale(target / varied);
            }
        }
        h
    }

    fn plan_process(
        &self,
        pattern: &KeyPattern,
        proc: &Process,
        taken: &mut HashSet<String>,
        report: &mut BinByBinReport,
    ) -> Result<Vec<(Systematic, ShapeVariation)>> {
        let Some(nominal) = proc.shape.template() else {
            return Ok(Vec::new());
        };
        let h = nominal.histogram.as_ref();
        let mut out = Vec::new();
        for i in 0..h.n_bins() {
            let Some(error) = self.eligible(h, i) else {
                report.skipped_bins += 1;
                continue;
            };
            let name = pattern.resolve(&KeyTokens::for_process(proc).with_bin_index(i + 1))?;
            crate::registry::check_name("bin-by-bin systematic", &name)?;
            if !taken.insert(name.clone()) {
                return Err(Error::Configuration(format!(
                    "bin-by-bin name '{}' (bin={}, process={}, mass={}) collides with an existing systematic",
                    name, proc.bin, proc.process, proc.mass
                )));
            }
            let variant = |suffix: &str, delta: f64| TemplateRef {
                key: format!("{}_{}{}", nominal.key, name, suffix),
                histogram: Arc::new(self.shifted(h, i, delta)),
            };
            let variation = ShapeVariation { up: variant("Up", error), down: variant("Down", -error) };
            let scope = Scope::all()
                .bins([proc.bin.as_str()])
                .processes([proc.process.as_str()])
                .masses([proc.mass.as_str()]);
            let mut syst = Systematic::new(name, SystKind::shape(1.0), scope);
            syst.bin_by_bin = true;
            out.push((syst, variation));
        }
        Ok(out)
    }

    /// Add bin-by-bin systematics to every bound process in `selection`.
    ///
    /// Unbound and missing processes are skipped. Processes that already
    /// received bin-by-bin systematics make the whole call fail with
    /// [`Error::BinByBinReapplied`] before anything is modified; so do name
    /// collisions and invalid settings.
    pub fn add_bin_by_bin(
        &self,
        registry: &mut Registry,
        selection: &Selection,
    ) -> Result<BinByBinReport> {
        let pattern = self.compiled_pattern()?;

        if let Some(p) =
            registry.processes().iter().find(|p| selection.matches_process(p) && p.bin_by_bin_done)
        {
            return Err(Error::BinByBinReapplied {
                bin: p.bin.clone(),
                process: p.process.clone(),
                mass: p.mass.clone(),
            });
        }

        let mut taken: HashSet<String> =
            registry.systematics().iter().map(|s| s.name.clone()).collect();
        let mut report = BinByBinReport::default();
        let mut plans = Vec::new();
        for (idx, proc) in registry.processes().iter().enumerate() {
            if !selection.matches_process(proc) || proc.shape.template().is_none() {
                continue;
            }
            let entries = self.plan_process(&pattern, proc, &mut taken, &mut report)?;
            plans.push(Planned { process: idx, entries });
        }

        for plan in &plans {
            for (syst, _) in &plan.entries {
                report.created.push(syst.name.clone());
                registry.push_systematic(syst.clone());
            }
        }
        let (_, processes) = registry.split_processes_mut();
        for plan in plans {
            let proc = &mut processes[plan.process];
            for (syst, variation) in plan.entries {
                proc.variations.insert(syst.name, variation);
            }
            proc.bin_by_bin_done = true;
            report.processes += 1;
        }

        log::info!(
            "bin-by-bin: {} systematics on {} processes (threshold={}, fix_norm={}, {} bins skipped)",
            report.created.len(),
            report.processes,
            self.add_threshold,
            self.fix_norm,
            report.skipped_bins
        );
        Ok(report)
    }
}
