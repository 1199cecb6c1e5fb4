//! Selections and the borrowed, filtered views built from them.

use std::collections::BTreeSet;

use super::record::{Observation, Process, Record};
use super::systematic::Systematic;
use super::{Registry, WILDCARD};

/// Mass axis restriction of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MassSelector {
    /// Processes at this mass point plus mass-independent processes.
    Point(String),
    /// Mass-independent processes only.
    Independent,
}

impl MassSelector {
    /// `"*"` selects mass-independent records, anything else a mass point.
    pub fn parse(mass: &str) -> Self {
        if mass == WILDCARD {
            MassSelector::Independent
        } else {
            MassSelector::Point(mass.to_string())
        }
    }

    fn accepts(&self, mass: &str) -> bool {
        match self {
            MassSelector::Point(m) => mass == m || mass == WILDCARD,
            MassSelector::Independent => mass == WILDCARD,
        }
    }

    /// Label used in file names and logs.
    pub fn label(&self) -> &str {
        match self {
            MassSelector::Point(m) => m,
            MassSelector::Independent => WILDCARD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ProcessKind {
    #[default]
    All,
    Signals,
    Backgrounds,
}

/// Filter criteria over registry records.
///
/// Bin, bin-id and mass criteria apply to observations and processes;
/// process-name criteria apply to processes only. A signals-only selection
/// holds no observations, a backgrounds-only one keeps them.
/// A selection owns no records, so it can drive both read-only views and
/// mutating passes over a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    bins: Option<BTreeSet<String>>,
    bin_ids: Option<BTreeSet<u32>>,
    processes: Option<BTreeSet<String>>,
    mass: Option<MassSelector>,
    kind: ProcessKind,
}

impl Selection {
    /// Selection of every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep records in these bins.
    pub fn bin<S: AsRef<str>>(mut self, bins: impl IntoIterator<Item = S>) -> Self {
        self.bins = Some(bins.into_iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Keep records with these bin ids.
    pub fn bin_id(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.bin_ids = Some(ids.into_iter().collect());
        self
    }

    /// Keep processes with these names.
    pub fn process<S: AsRef<str>>(mut self, processes: impl IntoIterator<Item = S>) -> Self {
        self.processes = Some(processes.into_iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Restrict to one mass selector (see [`MassSelector::parse`]).
    pub fn mass(mut self, mass: &str) -> Self {
        self.mass = Some(MassSelector::parse(mass));
        self
    }

    /// Signal processes only. Drops observations.
    pub fn signals(mut self) -> Self {
        self.kind = ProcessKind::Signals;
        self
    }

    /// Background processes and the observations.
    pub fn backgrounds(mut self) -> Self {
        self.kind = ProcessKind::Backgrounds;
        self
    }

    /// The single selected bin, if the selection names exactly one.
    pub fn single_bin(&self) -> Option<&str> {
        match self.bins.as_ref() {
            Some(b) if b.len() == 1 => b.iter().next().map(String::as_str),
            _ => None,
        }
    }

    /// The mass restriction, if any.
    pub fn mass_selector(&self) -> Option<&MassSelector> {
        self.mass.as_ref()
    }

    fn matches_common<R: Record>(&self, r: &R) -> bool {
        self.bins.as_ref().map_or(true, |b| b.contains(r.bin()))
            && self.bin_ids.as_ref().map_or(true, |ids| ids.contains(&r.bin_id()))
            && self.mass.as_ref().map_or(true, |m| m.accepts(r.mass()))
    }

    /// Whether observation `o` is selected.
    pub fn matches_observation(&self, o: &Observation) -> bool {
        self.kind != ProcessKind::Signals && self.matches_common(o)
    }

    /// Whether process `p` is selected.
    pub fn matches_process(&self, p: &Process) -> bool {
        let kind_ok = match self.kind {
            ProcessKind::All => true,
            ProcessKind::Signals => p.signal,
            ProcessKind::Backgrounds => !p.signal,
        };
        kind_ok
            && self.matches_common(p)
            && self.processes.as_ref().map_or(true, |names| names.contains(&p.process))
    }
}

/// Borrowed, filtered enumeration over a registry. Never copies records.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    registry: &'a Registry,
    selection: &'a Selection,
}

impl<'a> View<'a> {
    pub(crate) fn new(registry: &'a Registry, selection: &'a Selection) -> Self {
        Self { registry, selection }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// The criteria of this view.
    pub fn selection(&self) -> &'a Selection {
        self.selection
    }

    /// Selected observations.
    pub fn observations(&self) -> impl Iterator<Item = &'a Observation> + 'a {
        let sel = self.selection;
        self.registry.observations().iter().filter(move |o| sel.matches_observation(o))
    }

    /// Processes in declaration order.
    pub fn processes(&self) -> impl Iterator<Item = &'a Process> + 'a {
        let sel = self.selection;
        self.registry.processes().iter().filter(move |p| sel.matches_process(p))
    }

    /// Systematic declarations whose scope matches at least one selected process.
    pub fn systematics(&self) -> impl Iterator<Item = &'a Systematic> + 'a {
        let view = *self;
        self.registry
            .systematics()
            .iter()
            .filter(move |s| view.processes().any(|p| s.scope.matches(p)))
    }
}
