//! In-memory statistical model: categories, observations, processes, systematics.
//!
//! The [`Registry`] is an explicitly constructed context object. Population
//! happens through the `add_*` methods; later stages (shape binding,
//! bin-by-bin synthesis, name normalization) mutate it through a
//! [`Selection`], and the datacard writer reads it through a [`View`].

mod record;
mod scope;
mod systematic;
mod view;


use std::collections::{BTreeSet, HashMap, HashSet};

use cs_core::{Error, Result};

pub use record::{Binding, Category, Observation, Process, Record, ShapeVariation, TemplateRef};
pub use scope::{Matcher, Scope};
pub use systematic::{SystKind, Systematic};
pub use view::{MassSelector, Selection, View};

/// Mass value of mass-independent records.
pub const WILDCARD: &str = "*";

/// Process name under which observations are stored.
pub const DATA_OBS: &str = "data_obs";

/// Model registry.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    categories: Vec<Category>,
    observations: Vec<Observation>,
    processes: Vec<Process>,
    systematics: Vec<Systematic>,
}

/// Names end up in store keys and whitespace-separated datacard columns.
pub(crate) fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Configuration(format!("{} name must not be empty", what)));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '$') {
        return Err(Error::Configuration(format!(
            "{} name '{}' must not contain whitespace, '/' or '$'",
            what, name
        )));
    }
    Ok(())
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared categories, in declaration order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// All observations.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// All processes, in declaration order.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Systematic declarations, including overridden ones.
    pub fn systematics(&self) -> &[Systematic] {
        &self.systematics
    }

    /// Category with bin id `id`.
    pub fn category(&self, id: u32) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Check `categories` against each other and against the registry.
    ///
    /// Returns the categories that are not registered yet.
    fn check_categories(&self, categories: &[Category]) -> Result<Vec<Category>> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let mut fresh = Vec::new();
        for c in categories {
            check_name("category", &c.name)?;
            if !ids.insert(c.id) {
                return Err(Error::Configuration(format!(
                    "duplicate category id {} ('{}')",
                    c.id, c.name
                )));
            }
            if !names.insert(c.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate category name '{}' (id {})",
                    c.name, c.id
                )));
            }
            match (self.category(c.id), self.categories.iter().find(|k| k.name == c.name)) {
                (Some(k), _) if k.name != c.name => {
                    return Err(Error::Configuration(format!(
                        "category id {} already registered as '{}', cannot re-register as '{}'",
                        c.id, k.name, c.name
                    )));
                }
                (_, Some(k)) if k.id != c.id => {
                    return Err(Error::Configuration(format!(
                        "category name '{}' already registered with id {}, cannot re-register with id {}",
                        c.name, k.id, c.id
                    )));
                }
                (None, None) => fresh.push(c.clone()),
                _ => {}
            }
        }
        Ok(fresh)
    }

    /// Add one observation per category.
    ///
    /// The dimension lists must combine to a single (analysis, channel, era,
    /// mass) tuple, since a category carries exactly one observation.
    pub fn add_observations(
        &mut self,
        analyses: &[&str],
        channels: &[&str],
        eras: &[&str],
        masses: &[&str],
        categories: &[Category],
    ) -> Result<usize> {
        let (analysis, channel, era, mass) = match (analyses, channels, eras, masses) {
            ([a], [c], [e], [m]) => (*a, *c, *e, *m),
            _ => {
                return Err(Error::Configuration(format!(
                    "observations need exactly one analysis/channel/era/mass per category (got {}x{}x{}x{})",
                    analyses.len(),
                    channels.len(),
                    eras.len(),
                    masses.len()
                )));
            }
        };
        for (what, v) in [("analysis", analysis), ("channel", channel), ("era", era)] {
            check_name(what, v)?;
        }
        if mass != WILDCARD {
            check_name("mass", mass)?;
        }
        let fresh = self.check_categories(categories)?;
        for c in categories {
            if self.observations.iter().any(|o| o.bin_id == c.id) {
                return Err(Error::Configuration(format!(
                    "category {} ('{}') already has an observation",
                    c.id, c.name
                )));
            }
        }

        self.categories.extend(fresh);
        for c in categories {
            self.observations.push(Observation {
                analysis: analysis.to_string(),
                channel: channel.to_string(),
                era: era.to_string(),
                mass: mass.to_string(),
                bin: c.name.clone(),
                bin_id: c.id,
                rate: 0.0,
                shape: Binding::Unbound,
            });
        }
        log::debug!("added {} observations", categories.len());
        Ok(categories.len())
    }

    /// Add the cross product `processes × analyses × channels × eras × masses × categories`.
    ///
    /// Backgrounds (`signal == false`) are mass-independent: the mass list
    /// collapses to `"*"`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_processes(
        &mut self,
        processes: &[&str],
        analyses: &[&str],
        channels: &[&str],
        eras: &[&str],
        masses: &[&str],
        categories: &[Category],
        signal: bool,
    ) -> Result<usize> {
        let masses: &[&str] = if signal { masses } else { &[WILDCARD] };
        if processes.is_empty() || masses.is_empty() {
            return Err(Error::Configuration(
                "add_processes needs at least one process and one mass".into(),
            ));
        }
        for p in processes {
            check_name("process", p)?;
            if *p == DATA_OBS {
                return Err(Error::Configuration(format!("'{}' is reserved for observations", DATA_OBS)));
            }
        }
        for m in masses {
            if signal && *m == WILDCARD {
                return Err(Error::Configuration(format!(
                    "signal processes need explicit mass points, got '{}'",
                    WILDCARD
                )));
            }
            if *m != WILDCARD {
                check_name("mass", m)?;
            }
        }
        for (what, list) in [("analysis", analyses), ("channel", channels), ("era", eras)] {
            for v in list {
                check_name(what, v)?;
            }
        }
        let fresh = self.check_categories(categories)?;

        let mut existing: HashSet<(String, String, String)> = self
            .processes
            .iter()
            .map(|p| (p.bin.clone(), p.process.clone(), p.mass.clone()))
            .collect();
        let mut added = Vec::new();
        for c in categories {
            for analysis in analyses {
                for channel in channels {
                    for era in eras {
                        for mass in masses {
                            for process in processes {
                                let id = (c.name.clone(), process.to_string(), mass.to_string());
                                if !existing.insert(id) {
                                    return Err(Error::Configuration(format!(
                                        "duplicate process '{}' (bin={}, mass={})",
                                        process, c.name, mass
                                    )));
                                }
                                added.push(Process {
                                    analysis: analysis.to_string(),
                                    channel: channel.to_string(),
                                    era: era.to_string(),
                                    mass: mass.to_string(),
                                    bin: c.name.clone(),
                                    bin_id: c.id,
                                    process: process.to_string(),
                                    signal,
                                    rate: 0.0,
                                    shape: Binding::Unbound,
                                    variations: Default::default(),
                                    bin_by_bin_done: false,
                                });
                            }
                        }
                    }
                }
            }
        }

        let n = added.len();
        self.categories.extend(fresh);
        self.processes.extend(added);
        log::debug!("added {} {} processes", n, if signal { "signal" } else { "background" });
        Ok(n)
    }

    /// Append a systematic declaration.
    ///
    /// A later declaration of the same name overrides earlier ones for the
    /// records both match. Re-declaring a name with another kind is rejected.
    pub fn add_systematic(&mut self, name: &str, kind: SystKind, scope: Scope) -> Result<()> {
        check_name("systematic", name)?;
        kind.validate(name)?;
        if let Some(prev) = self.systematics.iter().find(|s| s.name == name) {
            if !prev.kind.same_variant(&kind) {
                return Err(Error::Configuration(format!(
                    "systematic '{}' already declared as {}, cannot redeclare as {}",
                    name,
                    prev.kind.type_name(),
                    kind.type_name()
                )));
            }
            if prev.bin_by_bin {
                return Err(Error::Configuration(format!(
                    "systematic '{}' is a bin-by-bin uncertainty and cannot be redeclared",
                    name
                )));
            }
        }
        self.systematics.push(Systematic::new(name, kind, scope));
        Ok(())
    }

    pub(crate) fn push_systematic(&mut self, systematic: Systematic) {
        self.systematics.push(systematic);
    }

    /// Set the rate of selected processes (counting experiments). Returns the count.
    pub fn set_rate(&mut self, selection: &Selection, rate: f64) -> usize {
        let mut n = 0;
        for p in self.processes.iter_mut().filter(|p| selection.matches_process(p)) {
            p.rate = rate;
            n += 1;
        }
        n
    }

    /// Start a selection over this registry's records.
    pub fn select(&self) -> Selection {
        Selection::all()
    }

    /// Borrowed view of the records `selection` matches.
    pub fn view<'a>(&'a self, selection: &'a Selection) -> View<'a> {
        View::new(self, selection)
    }

    /// The declaration of `name` active for `process`: the last one in scope.
    pub fn active_systematic(&self, process: &Process, name: &str) -> Option<&Systematic> {
        self.systematics.iter().rev().find(|s| s.name == name && s.scope.matches(process))
    }

    /// Active declaration of every systematic name applying to `process`, in
    /// first-declaration order.
    pub fn systematics_for<'a>(&'a self, process: &Process) -> Vec<&'a Systematic> {
        self.systematic_names()
            .into_iter()
            .filter_map(|name| self.active_systematic(process, name))
            .collect()
    }

    /// Distinct systematic names in first-declaration order.
    pub fn systematic_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.systematics.iter().map(|s| s.name.as_str()).filter(|n| seen.insert(*n)).collect()
    }

    /// Category names.
    pub fn bin_set(&self) -> BTreeSet<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Mass points of mass-dependent processes.
    pub fn mass_set(&self) -> BTreeSet<String> {
        self.processes.iter().filter(|p| !p.is_mass_independent()).map(|p| p.mass.clone()).collect()
    }

    /// Distinct process names, signals included.
    pub fn process_set(&self) -> BTreeSet<String> {
        self.processes.iter().map(|p| p.process.clone()).collect()
    }

    pub(crate) fn observations_mut(&mut self) -> &mut [Observation] {
        &mut self.observations
    }

    /// Disjoint borrows for passes that read declarations while updating processes.
    pub(crate) fn split_processes_mut(&mut self) -> (&[Systematic], &mut [Process]) {
        (&self.systematics, &mut self.processes)
    }

    /// Apply a bin rename map to categories, records and systematic scopes.
    pub(crate) fn rename_bins(&mut self, renames: &HashMap<String, String>) {
        let lookup = |b: &str| renames.get(b).cloned();
        for c in &mut self.categories {
            if let Some(n) = lookup(&c.name) {
                c.name = n;
            }
        }
        for o in &mut self.observations {
            if let Some(n) = lookup(&o.bin) {
                o.bin = n;
            }
        }
        for p in &mut self.processes {
            if let Some(n) = lookup(&p.bin) {
                p.bin = n;
            }
        }
        for s in &mut self.systematics {
            s.scope.rename_bins(lookup);
        }
    }
}
