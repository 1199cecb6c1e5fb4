//! `cardsmith stat-unc` - relative statistical uncertainty per bin.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use cs_cards::report::{StatBin, stat_uncertainty};
use cs_store::TemplateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Csv,
    Json,
}

#[derive(Serialize)]
struct CsvRow {
    bin_center: f64,
    uncertainty: f64,
}

fn write_csv<W: Write>(out: W, bins: &[StatBin]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for b in bins {
        wtr.serialize(CsvRow { bin_center: b.bin_center, uncertainty: b.uncertainty })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn cmd_stat_unc(store: &Path, key: &str, output: Option<&Path>, format: Format) -> Result<()> {
    let templates = TemplateStore::open(store)
        .with_context(|| format!("failed to open store {}", store.display()))?;
    let hist = templates.get(key).with_context(|| format!("template '{key}' not in {}", store.display()))?;
    let bins = stat_uncertainty(&hist);
    tracing::info!(key, bins = bins.len(), "statistical uncertainties computed");

    match (format, output) {
        (Format::Csv, Some(path)) => write_csv(std::fs::File::create(path)?, &bins),
        (Format::Csv, None) => write_csv(std::io::stdout().lock(), &bins),
        (Format::Json, out) => {
            let value = serde_json::json!({ "key": key, "bins": bins });
            crate::write_json(out.map(Path::to_path_buf).as_ref(), value)
        }
    }
}
