//! Input store assembly from per-sample template files.
//!
//! Each sample file is a template store whose keys are category histogram
//! names. The assembled store holds `{category}/{sample}` (data as
//! `{category}/data_obs`), ready for shape extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cs_core::Result;
use cs_store::{Histogram, TemplateStore};
use serde::{Deserialize, Serialize};

use crate::registry::DATA_OBS;

/// Layout of per-sample input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembleSpec {
    /// Directory holding the sample files. Relative paths resolve against the spec file.
    pub input_dir: PathBuf,
    /// Histogram names, one per category; also the store directory.
    pub categories: Vec<String>,
    /// Signal sample names.
    #[serde(default)]
    pub signals: Vec<String>,
    /// Background sample names.
    #[serde(default)]
    pub backgrounds: Vec<String>,
    /// Data sample name, read with the background prefix.
    #[serde(default)]
    pub data: Option<String>,
    /// File prefix of signal samples.
    #[serde(default = "default_signal_prefix")]
    pub signal_prefix: String,
    /// File prefix of background and data samples.
    #[serde(default = "default_background_prefix")]
    pub background_prefix: String,
}

fn default_signal_prefix() -> String {
    "Histogram_".to_string()
}

fn default_background_prefix() -> String {
    "Output_".to_string()
}

/// Source of per-sample template stores.
pub trait SampleLoader {
    /// Load the store at `path`; `Ok(None)` when it does not exist.
    fn load(&mut self, path: &Path) -> Result<Option<TemplateStore>>;
}

/// Loads sample stores from the filesystem.
#[derive(Debug, Default)]
pub struct FileLoader;

impl SampleLoader for FileLoader {
    fn load(&mut self, path: &Path) -> Result<Option<TemplateStore>> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(TemplateStore::open(path)?))
    }
}

/// Outcome of [`assemble_input_store`].
#[derive(Debug, Default)]
pub struct AssembleReport {
    /// The assembled store.
    pub store: TemplateStore,
    /// Templates inserted.
    pub inserted: usize,
    /// Human-readable reasons for every skipped file or histogram.
    pub skipped: Vec<String>,
}

impl AssembleSpec {
    /// `(sample, file, stored process name)` for every sample, signals first.
    fn samples(&self) -> Vec<(&str, PathBuf, &str)> {
        let file = |prefix: &str, name: &str| self.input_dir.join(format!("{}{}.json", prefix, name));
        let mut out = Vec::new();
        for s in &self.signals {
            out.push((s.as_str(), file(&self.signal_prefix, s), s.as_str()));
        }
        for b in &self.backgrounds {
            out.push((b.as_str(), file(&self.background_prefix, b), b.as_str()));
        }
        if let Some(d) = &self.data {
            out.push((d.as_str(), file(&self.background_prefix, d), DATA_OBS));
        }
        out
    }

    /// Read a YAML (or `.json`) spec; relative `input_dir` follows the spec file.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let mut spec: AssembleSpec =
            if ext == "json" { serde_json::from_slice(&bytes)? } else { serde_yaml_ng::from_slice(&bytes)? };
        if spec.input_dir.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            spec.input_dir = base.join(&spec.input_dir);
        }
        Ok(spec)
    }
}

/// Build the input store described by `spec`.
///
/// Missing sample files and missing category histograms are warned about and
/// skipped; they surface later as missing templates during extraction.
pub fn assemble_input_store(
    spec: &AssembleSpec,
    loader: &mut dyn SampleLoader,
) -> Result<AssembleReport> {
    let mut report = AssembleReport::default();
    for (sample, path, process) in spec.samples() {
        let Some(source) = loader.load(&path)? else {
            let msg = format!("sample '{}': file {} not found", sample, path.display());
            log::warn!("{}", msg);
            report.skipped.push(msg);
            continue;
        };
        for category in &spec.categories {
            let Some(h) = source.lookup(category) else {
                let msg = format!("sample '{}': histogram '{}' not found in {}", sample, category, path.display());
                log::warn!("{}", msg);
                report.skipped.push(msg);
                continue;
            };
            let hist: Arc<Histogram> = Arc::clone(h);
            report.store.insert(format!("{}/{}", category, process), hist)?;
            report.inserted += 1;
        }
        log::debug!("assembled sample '{}' from {}", sample, path.display());
    }
    log::info!("assembled {} templates ({} skipped)", report.inserted, report.skipped.len());
    Ok(report)
}
