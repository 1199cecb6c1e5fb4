//! Datacard parser and store cross-checks.

use cs_core::{Error, Result};
use cs_store::TemplateStore;

use crate::registry::{DATA_OBS, WILDCARD};

/// One `shapes` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapesLine {
    /// Process or `*`.
    pub process: String,
    /// Bin or `*`.
    pub bin: String,
    /// Store file, relative to the datacard.
    pub file: String,
    /// Nominal key pattern.
    pub nominal: String,
    /// Systematic key pattern, absent in some cards.
    pub systematic: Option<String>,
}

impl ShapesLine {
    fn matches(&self, process: &str, bin: &str) -> bool {
        (self.process == WILDCARD || self.process == process)
            && (self.bin == WILDCARD || self.bin == bin)
    }

    fn specificity(&self) -> u8 {
        u8::from(self.process != WILDCARD) * 2 + u8::from(self.bin != WILDCARD)
    }
}

/// One column of the process table.
#[derive(Debug, Clone, PartialEq)]
pub struct CardColumn {
    /// Bin of the column.
    pub bin: String,
    /// Process name.
    pub process: String,
    /// Process index; `<= 0` for signals.
    pub index: i32,
    /// Expected rate.
    pub rate: f64,
}

/// One systematic row; `None` cells are `-`.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSystematic {
    /// Systematic name.
    pub name: String,
    /// `lnN`, `shape`, ...
    pub kind: String,
    /// One cell per column.
    pub cells: Vec<Option<String>>,
}

/// A parsed datacard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datacard {
    /// `None` for `*`.
    pub imax: Option<usize>,
    /// Number of processes minus one.
    pub jmax: Option<usize>,
    /// Number of systematics.
    pub kmax: Option<usize>,
    /// `shapes` lines, in file order.
    pub shapes: Vec<ShapesLine>,
    /// Observed bins.
    pub bins: Vec<String>,
    /// Observed yields, one per bin.
    pub observations: Vec<f64>,
    /// Process table.
    pub columns: Vec<CardColumn>,
    /// Systematic rows.
    pub systematics: Vec<CardSystematic>,
    /// Lines after the process table that are not systematic rows
    /// (`rateParam`, `autoMCStats`, `group`, ...), kept verbatim.
    pub extra: Vec<String>,
}

/// A store key a datacard refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedKey {
    /// Resolved store key.
    pub key: String,
    /// Bin of the referring column.
    pub bin: String,
    /// Process of the referring column.
    pub process: String,
    /// Systematic template name (`jesUp`), `None` for nominal templates.
    pub systematic: Option<String>,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Keys looked up.
    pub keys_checked: usize,
    /// One message per mismatch.
    pub problems: Vec<String>,
}

impl ValidationReport {
    /// No problems found.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

const SYSTEMATIC_KINDS: &[&str] = &["lnN", "lnU", "shape", "shapeN", "shape?"];

fn bad(line: usize, msg: impl std::fmt::Display) -> Error {
    Error::Datacard(format!("line {}: {}", line, msg))
}

fn parse_f64(line: usize, s: &str) -> Result<f64> {
    s.parse::<f64>().map_err(|_| bad(line, format!("invalid number: {s:?}")))
}

fn parse_count(line: usize, s: Option<&str>) -> Result<Option<usize>> {
    match s {
        Some("*") => Ok(None),
        Some(v) => v.parse::<usize>().map(Some).map_err(|_| bad(line, format!("invalid count: {v:?}"))),
        None => Err(bad(line, "missing count")),
    }
}

fn substitute(pattern: &str, bin: &str, process: &str, systematic: Option<&str>) -> String {
    let mut key = pattern.replace("$CHANNEL", bin).replace("$PROCESS", process).replace("$MASS", "");
    if let Some(s) = systematic {
        key = key.replace("$SYSTEMATIC", s);
    }
    key
}

impl Datacard {
    /// Parse datacard text. `#` starts a comment; `---` lines are separators.
    pub fn parse(text: &str) -> Result<Self> {
        let mut card = Datacard::default();
        let mut bin_rows: Vec<Vec<String>> = Vec::new();
        let mut process_rows: Vec<Vec<String>> = Vec::new();
        let mut rates: Option<Vec<f64>> = None;

        for (no, raw) in text.lines().enumerate() {
            let no = no + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.starts_with("---") {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let rest = || tokens[1..].iter().map(|s| s.to_string()).collect::<Vec<_>>();
            match tokens[0] {
                "imax" => card.imax = parse_count(no, tokens.get(1).copied())?,
                "jmax" => card.jmax = parse_count(no, tokens.get(1).copied())?,
                "kmax" => card.kmax = parse_count(no, tokens.get(1).copied())?,
                "shapes" => {
                    if tokens.len() < 5 {
                        return Err(bad(no, "shapes line needs process, bin, file and a pattern"));
                    }
                    card.shapes.push(ShapesLine {
                        process: tokens[1].to_string(),
                        bin: tokens[2].to_string(),
                        file: tokens[3].to_string(),
                        nominal: tokens[4].to_string(),
                        systematic: tokens.get(5).map(|s| s.to_string()),
                    });
                }
                "bin" => bin_rows.push(rest()),
                "observation" => {
                    card.observations =
                        tokens[1..].iter().map(|s| parse_f64(no, s)).collect::<Result<_>>()?;
                }
                "process" => process_rows.push(rest()),
                "rate" => {
                    rates = Some(tokens[1..].iter().map(|s| parse_f64(no, s)).collect::<Result<_>>()?);
                }
                _ if rates.is_some() && tokens.len() >= 2 && SYSTEMATIC_KINDS.contains(&tokens[1]) => {
                    let cells: Vec<Option<String>> = tokens[2..]
                        .iter()
                        .map(|c| if *c == "-" { None } else { Some(c.to_string()) })
                        .collect();
                    card.systematics.push(CardSystematic {
                        name: tokens[0].to_string(),
                        kind: tokens[1].to_string(),
                        cells,
                    });
                }
                _ if rates.is_some() => card.extra.push(line.to_string()),
                other => return Err(bad(no, format!("unexpected keyword {other:?}"))),
            }
        }

        let (obs_bins, col_bins) = match bin_rows.len() {
            2 => (bin_rows.remove(0), bin_rows.remove(0)),
            n => return Err(Error::Datacard(format!("expected 2 'bin' rows, found {}", n))),
        };
        if obs_bins.len() != card.observations.len() {
            return Err(Error::Datacard(format!(
                "{} bins but {} observations",
                obs_bins.len(),
                card.observations.len()
            )));
        }
        card.bins = obs_bins;

        if process_rows.len() != 2 {
            return Err(Error::Datacard(format!(
                "expected 2 'process' rows, found {}",
                process_rows.len()
            )));
        }
        let as_indices = |row: &[String]| row.iter().map(|s| s.parse::<i32>().ok()).collect::<Option<Vec<_>>>();
        let (names, indices) = match (as_indices(&process_rows[1]), as_indices(&process_rows[0])) {
            (Some(idx), _) => (process_rows[0].clone(), idx),
            (None, Some(idx)) => (process_rows[1].clone(), idx),
            (None, None) => return Err(Error::Datacard("no numeric 'process' row".into())),
        };
        let rates = rates.ok_or_else(|| Error::Datacard("missing 'rate' row".into()))?;
        let n = col_bins.len();
        if names.len() != n || indices.len() != n || rates.len() != n {
            return Err(Error::Datacard(format!(
                "process table columns disagree: bin={} process={} index={} rate={}",
                n,
                names.len(),
                indices.len(),
                rates.len()
            )));
        }
        card.columns = col_bins
            .into_iter()
            .zip(names)
            .zip(indices)
            .zip(rates)
            .map(|(((bin, process), index), rate)| CardColumn { bin, process, index, rate })
            .collect();

        for s in &card.systematics {
            if s.cells.len() != n {
                return Err(Error::Datacard(format!(
                    "systematic '{}' has {} cells for {} columns",
                    s.name,
                    s.cells.len(),
                    n
                )));
            }
        }
        if let Some(k) = card.kmax {
            if k != card.systematics.len() {
                log::warn!("kmax {} but {} systematic rows", k, card.systematics.len());
            }
        }
        Ok(card)
    }

    /// The `shapes` line governing `(process, bin)`: exact matches beat `*`.
    pub fn shapes_for(&self, process: &str, bin: &str) -> Option<&ShapesLine> {
        self.shapes
            .iter()
            .filter(|s| s.matches(process, bin))
            .max_by_key(|s| s.specificity())
    }

    /// Every store key the card refers to: observations, nominal templates
    /// and the up/down templates of `shape` rows.
    pub fn referenced_keys(&self) -> Vec<ReferencedKey> {
        let mut out = Vec::new();
        let mut push = |pattern: &str, bin: &str, process: &str, syst: Option<String>| {
            out.push(ReferencedKey {
                key: substitute(pattern, bin, process, syst.as_deref()),
                bin: bin.to_string(),
                process: process.to_string(),
                systematic: syst,
            });
        };
        for bin in &self.bins {
            if let Some(line) = self.shapes_for(DATA_OBS, bin) {
                push(&line.nominal, bin, DATA_OBS, None);
            }
        }
        for (i, col) in self.columns.iter().enumerate() {
            let Some(line) = self.shapes_for(&col.process, &col.bin) else {
                continue;
            };
            push(&line.nominal, &col.bin, &col.process, None);
            let Some(pattern) = line.systematic.as_deref() else {
                continue;
            };
            for s in self.systematics.iter().filter(|s| s.kind.starts_with("shape")) {
                if s.cells[i].is_none() {
                    continue;
                }
                for dir in ["Up", "Down"] {
                    push(pattern, &col.bin, &col.process, Some(format!("{}{}", s.name, dir)));
                }
            }
        }
        out
    }

    /// Distinct shape files referenced by `shapes` lines.
    pub fn shape_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for s in &self.shapes {
            if !files.contains(&s.file.as_str()) {
                files.push(&s.file);
            }
        }
        files
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

/// Check `card` against the store its `shapes` lines point to.
///
/// Every referenced key must resolve; observations and rates must match the
/// integrals of their nominal templates. Counting cards only get the
/// structural checks done by [`Datacard::parse`].
pub fn validate(card: &Datacard, store: &TemplateStore) -> ValidationReport {
    let mut report = ValidationReport::default();
    for r in card.referenced_keys() {
        report.keys_checked += 1;
        let Some(h) = store.lookup(&r.key) else {
            report.problems.push(format!(
                "key '{}' (bin={}, process={}) not found in store",
                r.key, r.bin, r.process
            ));
            continue;
        };
        if r.systematic.is_some() {
            continue;
        }
        let expected = if r.process == DATA_OBS {
            card.bins.iter().position(|b| *b == r.bin).map(|i| card.observations[i])
        } else {
            card.columns.iter().find(|c| c.bin == r.bin && c.process == r.process).map(|c| c.rate)
        };
        if let Some(expected) = expected {
            if expected >= 0.0 && !close(expected, h.integral()) {
                report.problems.push(format!(
                    "bin={} process={}: datacard value {} but template '{}' integrates to {}",
                    r.bin,
                    r.process,
                    expected,
                    r.key,
                    h.integral()
                ));
            }
        }
    }
    report
}
