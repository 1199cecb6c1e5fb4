//! Observation and process records plus their template bindings.

use std::collections::BTreeMap;
use std::sync::Arc;

use cs_store::Histogram;
use serde::{Deserialize, Serialize};

use super::{DATA_OBS, WILDCARD};

/// An analysis bin (selection region).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    /// Numeric bin id, unique within a registry.
    pub id: u32,
    /// Bin name, unique within a registry.
    pub name: String,
}

impl Category {
    /// Create a category.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A resolved template: the store key it came from and the shared histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRef {
    /// Key the template was resolved from.
    pub key: String,
    /// Template content.
    pub histogram: Arc<Histogram>,
}

/// Template binding state of a record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Binding {
    /// No shape extraction has run for this record.
    #[default]
    Unbound,
    /// Nominal template resolved.
    Bound(TemplateRef),
    /// Nominal key did not resolve; the record must not be serialized.
    Missing(String),
}

impl Binding {
    /// The bound template, if any.
    pub fn template(&self) -> Option<&TemplateRef> {
        match self {
            Binding::Bound(t) => Some(t),
            _ => None,
        }
    }

    /// Whether extraction failed for this record.
    pub fn is_missing(&self) -> bool {
        matches!(self, Binding::Missing(_))
    }
}

/// Up/down templates of one shape systematic on one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeVariation {
    /// +1σ template.
    pub up: TemplateRef,
    /// −1σ template.
    pub down: TemplateRef,
}

/// Axis accessors shared by observations and processes.
///
/// Selections and systematic scopes evaluate against these fields only.
pub trait Record {
    /// Analysis tag.
    fn analysis(&self) -> &str;
    /// Channel tag.
    fn channel(&self) -> &str;
    /// Data-taking era.
    fn era(&self) -> &str;
    /// Bin (category) name.
    fn bin(&self) -> &str;
    /// Bin (category) id.
    fn bin_id(&self) -> u32;
    /// Process name (`data_obs` for observations).
    fn process(&self) -> &str;
    /// Mass point (`*` when mass-independent).
    fn mass(&self) -> &str;
}

/// Observed (or Asimov) data in one category.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Analysis name.
    pub analysis: String,
    /// Channel name.
    pub channel: String,
    /// Data-taking era.
    pub era: String,
    /// Always `*`.
    pub mass: String,
    /// Category name.
    pub bin: String,
    /// Category id.
    pub bin_id: u32,
    /// Observed yield; the template integral once bound.
    pub rate: f64,
    /// Data template.
    pub shape: Binding,
}

/// An expected contribution (signal or background) in one category.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    /// Analysis name.
    pub analysis: String,
    /// Channel name.
    pub channel: String,
    /// Data-taking era.
    pub era: String,
    /// Mass point, `*` when mass-independent.
    pub mass: String,
    /// Category name.
    pub bin: String,
    /// Category id.
    pub bin_id: u32,
    /// Process name; mass-dependent names are a prefix.
    pub process: String,
    /// Signal or background.
    pub signal: bool,
    /// Expected yield; the template integral once bound.
    pub rate: f64,
    /// Nominal template.
    pub shape: Binding,
    /// Shape systematic name → up/down templates.
    pub variations: BTreeMap<String, ShapeVariation>,
    pub(crate) bin_by_bin_done: bool,
}

impl Process {
    /// Whether this process is independent of the mass point.
    pub fn is_mass_independent(&self) -> bool {
        self.mass == WILDCARD
    }

    /// Process name as written to datacards and output stores.
    ///
    /// Mass-dependent processes carry the mass point as a suffix, so that one
    /// output store can hold several signal hypotheses of the same process.
    pub fn output_name(&self) -> String {
        if self.is_mass_independent() {
            self.process.clone()
        } else {
            format!("{}{}", self.process, self.mass)
        }
    }

    /// Whether bin-by-bin uncertainties were already added to this process.
    pub fn has_bin_by_bin(&self) -> bool {
        self.bin_by_bin_done
    }
}

macro_rules! impl_record {
    ($ty:ty, |$this:ident| $process:expr) => {
        impl Record for $ty {
            fn analysis(&self) -> &str {
                &self.analysis
            }
            fn channel(&self) -> &str {
                &self.channel
            }
            fn era(&self) -> &str {
                &self.era
            }
            fn bin(&self) -> &str {
                &self.bin
            }
            fn bin_id(&self) -> u32 {
                self.bin_id
            }
            fn process(&self) -> &str {
                let $this = self;
                $process
            }
            fn mass(&self) -> &str {
                &self.mass
            }
        }
    };
}

impl_record!(Observation, |_obs| DATA_OBS);
impl_record!(Process, |p| &p.process);
