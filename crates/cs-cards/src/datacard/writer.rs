//! Datacard text writer.
//!
//! A datacard describes one bin at one mass selector: header counts,
//! `shapes` lines pointing into the paired output store, the observation,
//! the process table and one row per systematic. Templates referenced by the
//! card are copied into the output store under
//! `$CHANNEL/$PROCESS` and `$CHANNEL/$PROCESS_$SYSTEMATIC{Up,Down}`.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cs_core::{Error, Result};
use cs_store::{Histogram, OutputStore, PendingEntry, StoreError};
use serde::Serialize;

use crate::registry::{Binding, Observation, Process, SystKind, View, DATA_OBS};

/// Shapes pattern for nominal templates in the output store.
pub const OUTPUT_NOMINAL: &str = "$CHANNEL/$PROCESS";
/// Shapes pattern for systematic templates in the output store.
pub const OUTPUT_SYSTEMATIC: &str = "$CHANNEL/$PROCESS_$SYSTEMATIC";

const SEPARATOR: &str =
    "----------------------------------------------------------------------------------------------------";

/// What [`write_datacard`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatacardSummary {
    /// Datacard file.
    pub path: PathBuf,
    /// Bin of the card.
    pub bin: String,
    /// Mass selector label (`*` for mass-independent cards).
    pub mass: String,
    /// Observed rate.
    pub observation: f64,
    /// Process columns, in datacard order.
    pub processes: Vec<String>,
    /// Systematic rows written.
    pub systematics: usize,
    /// Keys newly inserted into the output store.
    pub keys_written: usize,
    /// `bin/process` of records excluded because their template was missing.
    pub excluded: Vec<String>,
    /// Counting experiment (no `shapes` lines).
    pub counting: bool,
}

struct Column<'a> {
    process: &'a Process,
    index: i32,
}

/// Everything needed to emit one card, resolved from a view.
struct Card<'a> {
    bin: String,
    mass: String,
    observation: &'a Observation,
    columns: Vec<Column<'a>>,
    rows: Vec<(String, &'static str, Vec<String>)>,
    excluded: Vec<String>,
    counting: bool,
}

fn layout<'a>(view: View<'a>) -> Result<Card<'a>> {
    let selection = view.selection();
    let (Some(bin), Some(mass)) = (selection.single_bin(), selection.mass_selector()) else {
        return Err(Error::Configuration(
            "a datacard view must select exactly one bin and one mass".into(),
        ));
    };

    let mut excluded = Vec::new();
    let observation = view.observations().find(|o| !o.shape.is_missing());
    let Some(observation) = observation else {
        let key = view
            .observations()
            .find_map(|o| match &o.shape {
                Binding::Missing(k) => Some(k.clone()),
                _ => None,
            })
            .unwrap_or_else(|| format!("{}/{}", bin, DATA_OBS));
        return Err(Error::MissingTemplate {
            key,
            bin: bin.to_string(),
            process: DATA_OBS.to_string(),
            mass: mass.label().to_string(),
        });
    };

    let mut signals = Vec::new();
    let mut backgrounds = Vec::new();
    for p in view.processes() {
        if p.shape.is_missing() {
            log::warn!(
                "excluding {}/{} (mass {}) from datacard: template missing",
                p.bin,
                p.process,
                p.mass
            );
            excluded.push(format!("{}/{}", p.bin, p.output_name()));
            continue;
        }
        if p.signal {
            signals.push(p);
        } else {
            backgrounds.push(p);
        }
    }
    if signals.is_empty() && backgrounds.is_empty() {
        return Err(Error::Configuration(format!(
            "datacard for bin '{}' mass '{}' has no valid process",
            bin,
            mass.label()
        )));
    }

    let mut columns: Vec<Column<'a>> = Vec::with_capacity(signals.len() + backgrounds.len());
    for (i, p) in signals.into_iter().enumerate() {
        columns.push(Column { process: p, index: -(i as i32) });
    }
    for (i, p) in backgrounds.into_iter().enumerate() {
        columns.push(Column { process: p, index: i as i32 + 1 });
    }
    let mut names = HashSet::new();
    for c in &columns {
        if !names.insert(c.process.process.as_str()) {
            return Err(Error::Configuration(format!(
                "process '{}' appears twice in datacard for bin '{}' mass '{}'",
                c.process.process,
                bin,
                mass.label()
            )));
        }
    }

    let templated = columns.iter().filter(|c| c.process.shape.template().is_some()).count()
        + usize::from(observation.shape.template().is_some());
    let counting = match templated {
        0 => true,
        n if n == columns.len() + 1 => false,
        _ => {
            return Err(Error::Configuration(format!(
                "datacard for bin '{}' mass '{}' mixes templated and counting records",
                bin,
                mass.label()
            )));
        }
    };

    let registry = view.registry();
    let mut rows = Vec::new();
    for name in registry.systematic_names() {
        let mut kind: Option<&'static str> = None;
        let cells: Vec<String> = columns
            .iter()
            .map(|c| match registry.active_systematic(c.process, name) {
                Some(s) => match &s.kind {
                    SystKind::LnN { .. } => {
                        kind = Some("lnN");
                        s.kind.cell()
                    }
                    SystKind::Shape { .. } if c.process.variations.contains_key(name) => {
                        kind = Some("shape");
                        s.kind.cell()
                    }
                    SystKind::Shape { .. } => "-".to_string(),
                },
                None => "-".to_string(),
            })
            .collect();
        if let Some(kind) = kind {
            rows.push((name.to_string(), kind, cells));
        }
    }

    Ok(Card {
        bin: bin.to_string(),
        mass: mass.label().to_string(),
        observation,
        columns,
        rows,
        excluded,
        counting,
    })
}

fn table(out: &mut String, rows: &[(String, Vec<String>)]) {
    let label_w = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let n_cols = rows.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
    let widths: Vec<usize> = (0..n_cols)
        .map(|i| rows.iter().filter_map(|(_, c)| c.get(i)).map(String::len).max().unwrap_or(0))
        .collect();
    for (label, cells) in rows {
        let mut line = format!("{:<w$}", label, w = label_w);
        for (cell, w) in cells.iter().zip(&widths) {
            let _ = write!(line, "  {:<w$}", cell, w = *w);
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

fn render(card: &Card<'_>, shapes_file: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "imax    1 number of bins");
    let _ = writeln!(out, "jmax    {} number of processes minus 1", card.columns.len() - 1);
    let _ = writeln!(out, "kmax    {} number of nuisance parameters", card.rows.len());
    out.push_str(SEPARATOR);
    out.push('\n');

    if !card.counting {
        let mut shapes = vec![(
            "shapes".to_string(),
            vec![
                "*".to_string(),
                card.bin.clone(),
                shapes_file.to_string(),
                OUTPUT_NOMINAL.to_string(),
                OUTPUT_SYSTEMATIC.to_string(),
            ],
        )];
        for c in card.columns.iter().filter(|c| !c.process.is_mass_independent()) {
            let name = c.process.output_name();
            shapes.push((
                "shapes".to_string(),
                vec![
                    c.process.process.clone(),
                    card.bin.clone(),
                    shapes_file.to_string(),
                    format!("{}/{}", card.bin, name),
                    format!("{}/{}_$SYSTEMATIC", card.bin, name),
                ],
            ));
        }
        table(&mut out, &shapes);
        out.push_str(SEPARATOR);
        out.push('\n');
    }

    table(
        &mut out,
        &[
            ("bin".to_string(), vec![card.bin.clone()]),
            ("observation".to_string(), vec![format!("{}", card.observation.rate)]),
        ],
    );
    out.push_str(SEPARATOR);
    out.push('\n');

    let mut process_table: Vec<(String, Vec<String>)> = vec![
        ("bin".to_string(), card.columns.iter().map(|_| card.bin.clone()).collect()),
        ("process".to_string(), card.columns.iter().map(|c| c.process.process.clone()).collect()),
        ("process".to_string(), card.columns.iter().map(|c| c.index.to_string()).collect()),
        ("rate".to_string(), card.columns.iter().map(|c| format!("{}", c.process.rate)).collect()),
    ];
    let systematic_start = process_table.len();
    for (name, kind, cells) in &card.rows {
        process_table.push((format!("{} {}", name, kind), cells.clone()));
    }
    // one table so systematic cells line up with the process columns
    let mut body = String::new();
    table(&mut body, &process_table);
    let mut lines = body.lines();
    for line in lines.by_ref().take(systematic_start) {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Store entries of a card plus the `(bin, process)` each key belongs to.
fn pending(card: &Card<'_>) -> (Vec<PendingEntry>, HashMap<String, (String, String)>) {
    let mut entries = Vec::new();
    let mut owners = HashMap::new();
    if card.counting {
        return (entries, owners);
    }
    let mut push = |key: String, process: &str, mass: &str, histogram: &Arc<Histogram>| {
        owners.insert(key.clone(), (card.bin.clone(), process.to_string()));
        entries.push(PendingEntry {
            key,
            owner: format!("{}/{}/{}", card.bin, process, mass),
            histogram: Arc::clone(histogram),
        });
    };
    if let Some(t) = card.observation.shape.template() {
        push(format!("{}/{}", card.bin, DATA_OBS), DATA_OBS, &card.observation.mass, &t.histogram);
    }
    for c in &card.columns {
        let p = c.process;
        let base = format!("{}/{}", card.bin, p.output_name());
        if let Some(t) = p.shape.template() {
            push(base.clone(), &p.process, &p.mass, &t.histogram);
        }
        for (syst, v) in &p.variations {
            push(format!("{}_{}Up", base, syst), &p.process, &p.mass, &v.up.histogram);
            push(format!("{}_{}Down", base, syst), &p.process, &p.mass, &v.down.histogram);
        }
    }
    (entries, owners)
}

/// Render the datacard text of `view` without touching any store or file.
///
/// `shapes_file` is the store file name written into `shapes` lines.
pub fn render_datacard(view: View<'_>, shapes_file: &str) -> Result<String> {
    let card = layout(view)?;
    Ok(render(&card, shapes_file))
}

/// Write the datacard of `view` to `path` and its templates into `store`.
///
/// The view must select one bin and one mass. Every template key is checked
/// against the store before any is inserted; the text file is written only
/// once the store has accepted all of them. Writing the same card twice into
/// the same store is allowed.
pub fn write_datacard(
    view: View<'_>,
    path: impl AsRef<Path>,
    store: &mut OutputStore,
) -> Result<DatacardSummary> {
    let path = path.as_ref();
    let card = layout(view)?;
    let text = render(&card, &store.file_name());

    let (entries, owners) = pending(&card);
    let keys_written = store.append(entries).map_err(|e| match e {
        StoreError::DuplicateKey { key, owner } => {
            let (bin, process) =
                owners.get(&key).cloned().unwrap_or_else(|| (card.bin.clone(), String::new()));
            log::error!("output key '{}' already written by '{}'", key, owner);
            Error::DuplicateKey { key, bin, process, mass: card.mass.clone() }
        }
        other => Error::from(other),
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, text)?;
    log::debug!(
        "wrote datacard {} ({} processes, {} systematics, {} new keys)",
        path.display(),
        card.columns.len(),
        card.rows.len(),
        keys_written
    );

    Ok(DatacardSummary {
        path: path.to_path_buf(),
        bin: card.bin.clone(),
        mass: card.mass.clone(),
        observation: card.observation.rate,
        processes: card.columns.iter().map(|c| c.process.process.clone()).collect(),
        systematics: card.rows.len(),
        keys_written,
        excluded: card.excluded.clone(),
        counting: card.counting,
    })
}
