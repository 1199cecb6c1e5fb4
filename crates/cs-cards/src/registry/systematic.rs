//! Systematic uncertainty declarations.

use cs_core::{Error, Result};

use super::scope::Scope;

/// Kind-specific payload of a systematic.
#[derive(Debug, Clone, PartialEq)]
pub enum SystKind {
    /// Log-normal normalization uncertainty (`κ_up`, optional `κ_down`).
    LnN {
        /// Up (or symmetric) kappa.
        up: f64,
        /// Down kappa of an asymmetric uncertainty.
        down: Option<f64>,
    },
    /// Template-based shape uncertainty.
    ///
    /// Input keys substitute `$SYSTEMATIC` with `name + up_suffix` and
    /// `name + down_suffix`.
    Shape {
        /// Datacard cell value.
        scale: f64,
        /// Suffix of up templates.
        up_suffix: String,
        /// Suffix of down templates.
        down_suffix: String,
    },
}

impl SystKind {
    /// Symmetric lnN.
    pub fn lnn(value: f64) -> Self {
        SystKind::LnN { up: value, down: None }
    }

    /// Asymmetric lnN, written as `down/up`.
    pub fn lnn_asym(down: f64, up: f64) -> Self {
        SystKind::LnN { up, down: Some(down) }
    }

    /// Shape systematic with the conventional `Up`/`Down` suffixes.
    pub fn shape(scale: f64) -> Self {
        SystKind::Shape { scale, up_suffix: "Up".into(), down_suffix: "Down".into() }
    }

    /// Datacard type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            SystKind::LnN { .. } => "lnN",
            SystKind::Shape { .. } => "shape",
        }
    }

    /// Whether two kinds are the same variant (values may differ).
    pub fn same_variant(&self, other: &SystKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Datacard cell for a process this systematic applies to.
    pub fn cell(&self) -> String {
        match self {
            SystKind::LnN { up, down: None } => format!("{}", up),
            SystKind::LnN { up, down: Some(down) } => format!("{}/{}", down, up),
            SystKind::Shape { scale, .. } => format!("{}", scale),
        }
    }

    pub(crate) fn validate(&self, name: &str) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        match self {
            SystKind::LnN { up, down } => {
                if !positive(*up) || down.is_some_and(|d| !positive(d)) {
                    return Err(Error::Configuration(format!(
                        "lnN systematic '{}' needs finite positive values (got up={}, down={:?})",
                        name, up, down
                    )));
                }
            }
            SystKind::Shape { scale, up_suffix, down_suffix } => {
                if !positive(*scale) {
                    return Err(Error::Configuration(format!(
                        "shape systematic '{}' needs a finite positive scale (got {})",
                        name, scale
                    )));
                }
                if up_suffix.is_empty() || down_suffix.is_empty() || up_suffix == down_suffix {
                    return Err(Error::Configuration(format!(
                        "shape systematic '{}' needs distinct non-empty up/down template suffixes (got '{}'/'{}')",
                        name, up_suffix, down_suffix
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One systematic declaration: a name, a kind and the records it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct Systematic {
    /// Row name in the datacard.
    pub name: String,
    /// Kind and value.
    pub kind: SystKind,
    /// Records this declaration applies to.
    pub scope: Scope,
    /// Synthesized by the bin-by-bin step rather than declared.
    pub bin_by_bin: bool,
}

impl Systematic {
    /// Declared (not synthesized) systematic.
    pub fn new(name: impl Into<String>, kind: SystKind, scope: Scope) -> Self {
        Self { name: name.into(), kind, scope, bin_by_bin: false }
    }

    /// Shape suffixes, if this is a shape systematic.
    pub fn shape_suffixes(&self) -> Option<(&str, &str)> {
        match &self.kind {
            SystKind::Shape { up_suffix, down_suffix, .. } => Some((up_suffix, down_suffix)),
            SystKind::LnN { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells() {
        assert_eq!(SystKind::lnn(1.015).cell(), "1.015");
        assert_eq!(SystKind::lnn_asym(0.98, 1.02).cell(), "0.98/1.02");
        assert_eq!(SystKind::shape(1.0).cell(), "1");
    }

    #[test]
    fn validation() {
        assert!(SystKind::lnn(1.1).validate("a").is_ok());
        assert!(SystKind::lnn(0.0).validate("a").is_err());
        assert!(SystKind::lnn_asym(-0.9, 1.1).validate("a").is_err());
        assert!(SystKind::shape(f64::NAN).validate("a").is_err());
        let bad = SystKind::Shape { scale: 1.0, up_suffix: "Up".into(), down_suffix: String::new() };
        assert!(matches!(bad.validate("jes"), Err(Error::Configuration(_))));
        let same = SystKind::Shape { scale: 1.0, up_suffix: "X".into(), down_suffix: "X".into() };
        assert!(same.validate("jes").is_err());
    }
}
