//! Scope predicates deciding which records a systematic applies to.

use std::collections::BTreeSet;

use super::record::Record;

/// Matcher over one record axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher<T: Ord> {
    /// Matches every value.
    Any,
    /// Matches values in the set.
    Exact(BTreeSet<T>),
}

impl<T: Ord> Default for Matcher<T> {
    fn default() -> Self {
        Matcher::Any
    }
}

impl<T: Ord> Matcher<T> {
    /// Matcher accepting exactly `values`.
    pub fn exact(values: impl IntoIterator<Item = T>) -> Self {
        Matcher::Exact(values.into_iter().collect())
    }

    /// Whether `value` is accepted.
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(set) => set.contains(value),
        }
    }

    /// Whether this matcher accepts every value.
    pub fn is_any(&self) -> bool {
        matches!(self, Matcher::Any)
    }
}

impl Matcher<String> {
    /// String matcher from borrowed values.
    pub fn names<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Self {
        Matcher::Exact(values.into_iter().map(|s| s.as_ref().to_string()).collect())
    }

    /// `matches` without allocating.
    pub fn matches_str(&self, value: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(set) => set.contains(value),
        }
    }
}

/// Predicate over a record's `(bin, bin_id, process, era, mass, channel)`.
///
/// Every axis defaults to [`Matcher::Any`]; a record is in scope when all
/// axes match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Category names.
    pub bin: Matcher<String>,
    /// Category ids.
    pub bin_id: Matcher<u32>,
    /// Process names.
    pub process: Matcher<String>,
    /// Eras.
    pub era: Matcher<String>,
    /// Mass points (`*` for mass-independent records).
    pub mass: Matcher<String>,
    /// Channels.
    pub channel: Matcher<String>,
}

impl Scope {
    /// Scope matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to these category names.
    pub fn bins<S: AsRef<str>>(mut self, bins: impl IntoIterator<Item = S>) -> Self {
        self.bin = Matcher::names(bins);
        self
    }

    /// Restrict to these category ids.
    pub fn bin_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.bin_id = Matcher::exact(ids);
        self
    }

    /// Restrict to these process names.
    pub fn processes<S: AsRef<str>>(mut self, processes: impl IntoIterator<Item = S>) -> Self {
        self.process = Matcher::names(processes);
        self
    }

    /// Restrict to these eras.
    pub fn eras<S: AsRef<str>>(mut self, eras: impl IntoIterator<Item = S>) -> Self {
        self.era = Matcher::names(eras);
        self
    }

    /// Restrict to these mass points.
    pub fn masses<S: AsRef<str>>(mut self, masses: impl IntoIterator<Item = S>) -> Self {
        self.mass = Matcher::names(masses);
        self
    }

    /// Restrict to these channels.
    pub fn channels<S: AsRef<str>>(mut self, channels: impl IntoIterator<Item = S>) -> Self {
        self.channel = Matcher::names(channels);
        self
    }

    /// Whether `record` is in scope.
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        self.bin.matches_str(record.bin())
            && self.bin_id.matches(&record.bin_id())
            && self.process.matches_str(record.process())
            && self.era.matches_str(record.era())
            && self.mass.matches_str(record.mass())
            && self.channel.matches_str(record.channel())
    }

    /// Rewrite bin names in an exact bin matcher.
    pub(crate) fn rename_bins(&mut self, rename: impl Fn(&str) -> Option<String>) {
        if let Matcher::Exact(set) = &mut self.bin {
            *set = set.iter().map(|b| rename(b).unwrap_or_else(|| b.clone())).collect();
        }
    }
}
