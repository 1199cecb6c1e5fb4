//! Card-production configuration (`CardConfig`), read from YAML or JSON.

use std::path::{Path, PathBuf};

use cs_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::bbb::{BinByBin, DEFAULT_BBB_PATTERN};
use crate::registry::{Category, Scope, SystKind, check_name};

/// Declarative description of one card-production run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    /// Analysis name (`$ANALYSIS`).
    pub analysis: String,
    /// Channel name (`$CHANNEL`).
    pub channel: String,
    /// Era (`$ERA`).
    pub era: String,
    /// Output store prefix: `{tag}_{mass}.input.json`.
    pub tag: String,
    /// Input template store. Relative paths resolve against the config file.
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Categories as `{id, name}`.
    pub categories: Vec<Category>,
    /// Mass-independent processes.
    pub backgrounds: Vec<String>,
    /// Mass-dependent process name prefixes.
    #[serde(default)]
    pub signals: Vec<String>,
    /// Mass points; one output store each.
    pub mass_points: Vec<String>,
    /// Systematic declarations, in order.
    #[serde(default)]
    pub systematics: Vec<SystematicConfig>,
    /// Key patterns for template lookup.
    #[serde(default)]
    pub shapes: ShapesConfig,
    /// Bin-by-bin settings; absent disables the step.
    #[serde(default)]
    pub bin_by_bin: Option<BinByBinConfig>,
    /// Rename bins to `{analysis}_{channel}_{id}_{era}`.
    #[serde(default = "default_true")]
    pub standard_bin_names: bool,
}

fn default_true() -> bool {
    true
}

/// One systematic declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystematicConfig {
    /// Systematic name.
    pub name: String,
    /// `lnN` or `shape`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Required for `lnN`; `shape` defaults to scale 1.
    #[serde(default)]
    pub value: Option<ValueConfig>,
    /// Records the declaration applies to.
    #[serde(default)]
    pub scope: ScopeConfig,
    /// Template suffixes of shape systematics (default `Up`/`Down`).
    #[serde(default)]
    pub up_suffix: Option<String>,
    /// Down suffix.
    #[serde(default)]
    pub down_suffix: Option<String>,
}

/// `1.015`, `{ up: 1.02, down: 0.98 }` or `{ scale: 1.0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueConfig {
    /// Symmetric `lnN` value.
    Number(f64),
    /// Asymmetric `lnN`, written `down/up`.
    Asymmetric {
        /// Down kappa.
        down: f64,
        /// Up kappa.
        up: f64,
    },
    /// Shape scale.
    Scale {
        /// Datacard cell value.
        scale: f64,
    },
}

/// Systematic scope; omitted axes match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Category names.
    #[serde(default)]
    pub bin: Option<Vec<String>>,
    /// Category ids.
    #[serde(default)]
    pub bin_id: Option<Vec<u32>>,
    /// Process names.
    #[serde(default)]
    pub process: Option<Vec<String>>,
    /// Eras.
    #[serde(default)]
    pub era: Option<Vec<String>>,
    /// Mass points; `*` selects mass-independent processes.
    #[serde(default)]
    pub mass: Option<Vec<String>>,
    /// Channels.
    #[serde(default)]
    pub channel: Option<Vec<String>>,
}

/// Nominal and systematic key patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPair {
    /// Must not use `$SYSTEMATIC`.
    pub nominal: String,
    /// Must use `$SYSTEMATIC`.
    pub systematic: String,
}

/// Patterns for backgrounds (and data) and for signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapesConfig {
    /// Backgrounds and observations.
    #[serde(default = "default_background_patterns")]
    pub background: PatternPair,
    /// Signals.
    #[serde(default = "default_signal_patterns")]
    pub signal: PatternPair,
}

impl Default for ShapesConfig {
    fn default() -> Self {
        Self { background: default_background_patterns(), signal: default_signal_patterns() }
    }
}

fn default_background_patterns() -> PatternPair {
    PatternPair { nominal: "$BIN/$PROCESS".into(), systematic: "$BIN/$PROCESS_$SYSTEMATIC".into() }
}

fn default_signal_patterns() -> PatternPair {
    PatternPair {
        nominal: "$BIN/$PROCESS$MASS".into(),
        systematic: "$BIN/$PROCESS$MASS_$SYSTEMATIC".into(),
    }
}

/// Bin-by-bin settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinByBinConfig {
    /// See [`BinByBin::add_threshold`].
    #[serde(default)]
    pub add_threshold: f64,
    /// See [`BinByBin::fix_norm`].
    #[serde(default)]
    pub fix_norm: bool,
    /// Name pattern, default [`DEFAULT_BBB_PATTERN`].
    #[serde(default)]
    pub pattern: Option<String>,
}

impl BinByBinConfig {
    /// Synthesizer with these settings.
    pub fn synthesizer(&self) -> BinByBin {
        BinByBin::new()
            .add_threshold(self.add_threshold)
            .fix_norm(self.fix_norm)
            .pattern(self.pattern.as_deref().unwrap_or(DEFAULT_BBB_PATTERN))
    }
}

impl ScopeConfig {
    /// Registry scope; omitted axes match everything.
    pub fn to_scope(&self) -> Scope {
        let mut scope = Scope::all();
        if let Some(v) = &self.bin {
            scope = scope.bins(v);
        }
        if let Some(v) = &self.bin_id {
            scope = scope.bin_ids(v.iter().copied());
        }
        if let Some(v) = &self.process {
            scope = scope.processes(v);
        }
        if let Some(v) = &self.era {
            scope = scope.eras(v);
        }
        if let Some(v) = &self.mass {
            scope = scope.masses(v);
        }
        if let Some(v) = &self.channel {
            scope = scope.channels(v);
        }
        scope
    }
}

impl SystematicConfig {
    /// Typed systematic kind. Values are range-checked by the registry.
    pub fn to_kind(&self) -> Result<SystKind> {
        let bad_value = || {
            Error::Configuration(format!(
                "systematic '{}' of type {} has malformed value {:?}",
                self.name, self.kind, self.value
            ))
        };
        match self.kind.as_str() {
            "lnN" => {
                if self.up_suffix.is_some() || self.down_suffix.is_some() {
                    return Err(Error::Configuration(format!(
                        "lnN systematic '{}' cannot have template suffixes",
                        self.name
                    )));
                }
                match self.value {
                    Some(ValueConfig::Number(v)) => Ok(SystKind::lnn(v)),
                    Some(ValueConfig::Asymmetric { down, up }) => Ok(SystKind::lnn_asym(down, up)),
                    _ => Err(bad_value()),
                }
            }
            "shape" => {
                let scale = match self.value {
                    None => 1.0,
                    Some(ValueConfig::Number(s)) | Some(ValueConfig::Scale { scale: s }) => s,
                    Some(ValueConfig::Asymmetric { .. }) => return Err(bad_value()),
                };
                Ok(SystKind::Shape {
                    scale,
                    up_suffix: self.up_suffix.clone().unwrap_or_else(|| "Up".into()),
                    down_suffix: self.down_suffix.clone().unwrap_or_else(|| "Down".into()),
                })
            }
            other => Err(Error::Configuration(format!(
                "systematic '{}' has unknown type '{}' (expected lnN or shape)",
                self.name, other
            ))),
        }
    }
}

impl CardConfig {
    /// Checks that need no registry. Registry-level checks run in
    /// [`crate::pipeline::build_registry`].
    pub fn validate(&self) -> Result<()> {
        check_name("tag", &self.tag)?;
        if self.categories.is_empty() {
            return Err(Error::Configuration("config lists no categories".into()));
        }
        if self.backgrounds.is_empty() {
            return Err(Error::Configuration("config lists no backgrounds".into()));
        }
        if self.mass_points.is_empty() {
            return Err(Error::Configuration("config lists no mass points".into()));
        }
        for m in &self.mass_points {
            check_name("mass", m)?;
        }
        for s in &self.systematics {
            s.to_kind()?;
        }
        if let Some(bbb) = &self.bin_by_bin {
            if !(0.0..1.0).contains(&bbb.add_threshold) {
                return Err(Error::Configuration(format!(
                    "bin_by_bin.add_threshold must lie in [0, 1) (got {})",
                    bbb.add_threshold
                )));
            }
        }
        Ok(())
    }

    /// Parse YAML or JSON text (`json` selects JSON).
    pub fn from_slice(bytes: &[u8], json: bool) -> Result<Self> {
        let cfg: CardConfig =
            if json { serde_json::from_slice(bytes)? } else { serde_yaml_ng::from_slice(bytes)? };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Read a config file: `.json` as JSON, anything else as YAML.
///
/// A relative `input` path is resolved against the config file's directory.
pub fn read_card_config(path: &Path) -> Result<CardConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg = CardConfig::from_slice(&bytes, ext == "json")?;
    if let Some(input) = cfg.input.take() {
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        cfg.input = Some(if input.is_relative() { base.join(input) } else { input });
    }
    Ok(cfg)
}
