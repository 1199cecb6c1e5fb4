//! Shape extraction: bind selected records to templates of an input store.

use std::sync::Arc;

use cs_core::{Error, Result};
use cs_store::{Histogram, TemplateStore};

use crate::registry::{
    Binding, Process, Record, Registry, Selection, ShapeVariation, Systematic, TemplateRef,
};

use super::pattern::{KeyPattern, KeyTokens, Token};

/// Outcome of one [`extract_shapes`] call.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Observations bound to a template.
    pub observations_bound: usize,
    /// Processes bound to a nominal template.
    pub processes_bound: usize,
    /// Up/down pairs bound.
    pub variations_bound: usize,
    /// `Error::MissingTemplate` per record whose nominal key did not resolve.
    pub missing: Vec<Error>,
    /// `Error::ShapeSystematicDropped` per dropped up/down pair.
    pub dropped: Vec<Error>,
}

impl ExtractReport {
    /// Add the counts and errors of `other`.
    pub fn merge(&mut self, other: ExtractReport) {
        self.observations_bound += other.observations_bound;
        self.processes_bound += other.processes_bound;
        self.variations_bound += other.variations_bound;
        self.missing.extend(other.missing);
        self.dropped.extend(other.dropped);
    }
}

fn template(key: String, histogram: &Arc<Histogram>) -> TemplateRef {
    TemplateRef { key, histogram: Arc::clone(histogram) }
}

fn missing_template<R: Record>(r: &R, key: &str) -> Error {
    Error::MissingTemplate {
        key: key.to_string(),
        bin: r.bin().to_string(),
        process: r.process().to_string(),
        mass: r.mass().to_string(),
    }
}

/// Resolve nominal and shape-systematic templates for every selected record.
///
/// `nominal_pattern` yields the nominal key of each observation (with
/// `$PROCESS = data_obs`) and process. `systematic_pattern` must contain
/// `$SYSTEMATIC`; it is resolved twice per in-scope shape systematic, with
/// the systematic name plus its up and down suffixes.
///
/// Missing nominal keys mark the record as [`Binding::Missing`]; missing
/// variations are dropped. Neither aborts the batch. Re-running with the same
/// inputs reproduces the same bindings.
pub fn extract_shapes(
    registry: &mut Registry,
    selection: &Selection,
    store: &TemplateStore,
    nominal_pattern: &str,
    systematic_pattern: &str,
) -> Result<ExtractReport> {
    let nominal = KeyPattern::parse(nominal_pattern)?;
    let systematic = KeyPattern::parse(systematic_pattern)?;
    if nominal.uses(Token::Systematic) {
        return Err(Error::Configuration(format!(
            "nominal pattern '{}' must not contain $SYSTEMATIC",
            nominal_pattern
        )));
    }
    if !systematic.uses(Token::Systematic) {
        return Err(Error::Configuration(format!(
            "systematic pattern '{}' must contain $SYSTEMATIC",
            systematic_pattern
        )));
    }

    let mut report = ExtractReport::default();

    for obs in registry.observations_mut().iter_mut().filter(|o| selection.matches_observation(o)) {
        let key = nominal.resolve(&KeyTokens::for_observation(obs))?;
        match store.lookup(&key) {
            Some(h) => {
                obs.rate = h.integral();
                obs.shape = Binding::Bound(template(key, h));
                report.observations_bound += 1;
            }
            None => {
                let err = missing_template(&*obs, &key);
                log::warn!("{}", err);
                report.missing.push(err);
                obs.shape = Binding::Missing(key);
            }
        }
    }

    let (systematics, processes) = registry.split_processes_mut();
    for proc in processes.iter_mut().filter(|p| selection.matches_process(p)) {
        let key = nominal.resolve(&KeyTokens::for_process(proc))?;
        let Some(h) = store.lookup(&key) else {
            let err = missing_template(&*proc, &key);
            log::warn!("{}", err);
            report.missing.push(err);
            proc.shape = Binding::Missing(key);
            proc.variations.clear();
            continue;
        };
        proc.rate = h.integral();
        proc.shape = Binding::Bound(template(key, h));
        report.processes_bound += 1;

        for syst in active_shape_systematics(systematics, &*proc) {
            match resolve_variation(&systematic, store, &*proc, syst)? {
                Ok(variation) => {
                    proc.variations.insert(syst.name.clone(), variation);
                    report.variations_bound += 1;
                }
                Err(err) => {
                    log::warn!("{}", err);
                    proc.variations.remove(&syst.name);
                    report.dropped.push(err);
                }
            }
        }
    }

    log::info!(
        "extracted shapes via '{}': {} observations, {} processes, {} variations ({} missing, {} dropped)",
        nominal_pattern,
        report.observations_bound,
        report.processes_bound,
        report.variations_bound,
        report.missing.len(),
        report.dropped.len()
    );
    Ok(report)
}

/// Declared shape systematics active for `proc` (last matching declaration per name).
fn active_shape_systematics<'a>(
    systematics: &'a [Systematic],
    proc: &Process,
) -> Vec<&'a Systematic> {
    let mut out: Vec<&Systematic> = Vec::new();
    for s in systematics.iter().filter(|s| !s.bin_by_bin && s.scope.matches(proc)) {
        match out.iter_mut().find(|o| o.name == s.name) {
            Some(slot) => *slot = s,
            None => out.push(s),
        }
    }
    out.retain(|s| s.shape_suffixes().is_some());
    out
}

/// Outer `Result` is a configuration failure; inner `Err` a dropped variation.
fn resolve_variation(
    pattern: &KeyPattern,
    store: &TemplateStore,
    proc: &Process,
    syst: &Systematic,
) -> Result<std::result::Result<ShapeVariation, Error>> {
    let Some((up_suffix, down_suffix)) = syst.shape_suffixes() else {
        return Err(Error::Configuration(format!("'{}' is not a shape systematic", syst.name)));
    };
    let dropped = |key: &str| Error::ShapeSystematicDropped {
        systematic: syst.name.clone(),
        key: key.to_string(),
        bin: proc.bin.clone(),
        process: proc.process.clone(),
        mass: proc.mass.clone(),
    };

    let up_name = format!("{}{}", syst.name, up_suffix);
    let down_name = format!("{}{}", syst.name, down_suffix);
    let up_key = pattern.resolve(&KeyTokens::for_process(proc).with_systematic(&up_name))?;
    let down_key = pattern.resolve(&KeyTokens::for_process(proc).with_systematic(&down_name))?;

    let n_bins = proc.shape.template().map(|t| t.histogram.n_bins()).unwrap_or(0);
    let lookup = |key: String| match store.lookup(&key) {
        Some(h) if h.n_bins() == n_bins => Ok(template(key, h)),
        _ => Err(dropped(&key)),
    };
    let up = match lookup(up_key) {
        Ok(t) => t,
        Err(e) => return Ok(Err(e)),
    };
    let down = match lookup(down_key) {
        Ok(t) => t,
        Err(e) => return Ok(Err(e)),
    };
    Ok(Ok(ShapeVariation { up, down }))
}
