//! End-to-end card production: config → registry → shapes → bin-by-bin →
//! canonical names → one output store plus one datacard per bin for every
//! mass point.

use std::path::{Path, PathBuf};

use cs_core::Result;
use cs_store::{OutputStore, TemplateStore};
use serde::Serialize;

use crate::bbb::BinByBinReport;
use crate::config::CardConfig;
use crate::datacard::{DatacardSummary, write_datacard};
use crate::manifest::{FailedMass, Manifest};
use crate::naming::standardize_bin_names;
use crate::registry::{Registry, Selection, WILDCARD};
use crate::shapes::{ExtractReport, extract_shapes};

/// Extraction counters, with record-scoped errors flattened to messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractStats {
    /// Observations bound.
    pub observations_bound: usize,
    /// Processes bound.
    pub processes_bound: usize,
    /// Up/down pairs bound.
    pub variations_bound: usize,
    /// Missing nominal templates.
    pub missing: Vec<String>,
    /// Dropped shape systematics.
    pub dropped: Vec<String>,
}

impl From<&ExtractReport> for ExtractStats {
    fn from(r: &ExtractReport) -> Self {
        Self {
            observations_bound: r.observations_bound,
            processes_bound: r.processes_bound,
            variations_bound: r.variations_bound,
            missing: r.missing.iter().map(|e| e.to_string()).collect(),
            dropped: r.dropped.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// What [`run`] produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Written datacards.
    pub datacards: Vec<DatacardSummary>,
    /// Finished output stores.
    pub stores: Vec<PathBuf>,
    /// Manifest path.
    pub manifest: Option<PathBuf>,
    /// Mass points that failed.
    pub failed: Vec<FailedMass>,
    /// Shape extraction counters.
    pub extraction: ExtractStats,
    /// Bin-by-bin outcome, when enabled.
    pub bin_by_bin: Option<BinByBinReport>,
    /// Categories renamed.
    pub renamed_bins: usize,
}

/// Build and populate the registry described by `config`. No file I/O.
pub fn build_registry(config: &CardConfig) -> Result<Registry> {
    config.validate()?;
    let analysis = [config.analysis.as_str()];
    let channel = [config.channel.as_str()];
    let era = [config.era.as_str()];
    let backgrounds: Vec<&str> = config.backgrounds.iter().map(String::as_str).collect();
    let signals: Vec<&str> = config.signals.iter().map(String::as_str).collect();
    let masses: Vec<&str> = config.mass_points.iter().map(String::as_str).collect();

    let mut registry = Registry::new();
    registry.add_observations(&analysis, &channel, &era, &[WILDCARD], &config.categories)?;
    registry.add_processes(&backgrounds, &analysis, &channel, &era, &[WILDCARD], &config.categories, false)?;
    if !signals.is_empty() {
        registry.add_processes(&signals, &analysis, &channel, &era, &masses, &config.categories, true)?;
    }
    for s in &config.systematics {
        registry.add_systematic(&s.name, s.to_kind()?, s.scope.to_scope())?;
    }
    log::info!(
        "registry: {} categories, {} processes, {} systematic declarations",
        registry.categories().len(),
        registry.processes().len(),
        registry.systematics().len()
    );
    Ok(registry)
}

/// Output store path of one mass point.
pub fn store_path(out_dir: &Path, tag: &str, mass: &str) -> PathBuf {
    out_dir.join(format!("{}_{}.input.json", tag, mass))
}

/// Datacard path of one (bin, mass point).
pub fn datacard_path(out_dir: &Path, bin: &str, mass: &str) -> PathBuf {
    out_dir.join(format!("{}_{}.txt", bin, mass))
}

fn write_mass_point(
    registry: &Registry,
    config: &CardConfig,
    out_dir: &Path,
    mass: &str,
) -> Result<(Vec<DatacardSummary>, PathBuf)> {
    let mut store = OutputStore::create(store_path(out_dir, &config.tag, mass))?;
    let mut cards = Vec::new();
    for bin in registry.bin_set() {
        let selection = Selection::all().bin([bin.as_str()]).mass(mass);
        let summary =
            write_datacard(registry.view(&selection), datacard_path(out_dir, &bin, mass), &mut store)?;
        cards.push(summary);
    }
    let path = store.finish()?;
    Ok((cards, path))
}

/// Prepare the registry for writing: every step before the first file is created.
pub fn prepare(config: &CardConfig, input: &TemplateStore) -> Result<(Registry, RunSummary)> {
    let mut registry = build_registry(config)?;
    let mut summary = RunSummary::default();

    let bkg = &config.shapes.background;
    let mut report =
        extract_shapes(&mut registry, &Selection::all().backgrounds(), input, &bkg.nominal, &bkg.systematic)?;
    let sig = &config.shapes.signal;
    report.merge(extract_shapes(
        &mut registry,
        &Selection::all().signals(),
        input,
        &sig.nominal,
        &sig.systematic,
    )?);
    summary.extraction = ExtractStats::from(&report);

    if let Some(bbb) = &config.bin_by_bin {
        let rep = bbb.synthesizer().add_bin_by_bin(&mut registry, &Selection::all().backgrounds())?;
        summary.bin_by_bin = Some(rep);
    }
    if config.standard_bin_names {
        summary.renamed_bins = standardize_bin_names(&mut registry)?;
    }
    Ok((registry, summary))
}

/// Produce all datacards and output stores of `config` into `out_dir`.
///
/// Configuration problems fail before `out_dir` is created. A failing mass
/// point is recorded in [`RunSummary::failed`]; the others still run.
pub fn run(config: &CardConfig, input: &TemplateStore, out_dir: &Path) -> Result<RunSummary> {
    let (registry, mut summary) = prepare(config, input)?;

    std::fs::create_dir_all(out_dir)?;
    for mass in &config.mass_points {
        match write_mass_point(&registry, config, out_dir, mass) {
            Ok((cards, store)) => {
                log::info!("mass {}: {} datacards, store {}", mass, cards.len(), store.display());
                summary.datacards.extend(cards);
                summary.stores.push(store);
            }
            Err(e) => {
                log::error!("mass {} failed: {}", mass, e);
                summary.failed.push(FailedMass { mass: mass.clone(), error: e.to_string() });
            }
        }
    }

    let cards: Vec<PathBuf> = summary.datacards.iter().map(|c| c.path.clone()).collect();
    let manifest = Manifest::build(out_dir, &cards, &summary.stores, summary.failed.clone())?;
    summary.manifest = Some(manifest.write(out_dir)?);
    Ok(summary)
}
