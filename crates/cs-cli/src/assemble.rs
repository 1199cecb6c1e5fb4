//! `cardsmith assemble` - input store from per-sample template files.

use anyhow::{Context, Result};
use std::path::Path;

use cs_cards::assemble::{AssembleSpec, FileLoader, assemble_input_store};

use crate::write_json;

pub fn cmd_assemble(config: &Path, output: &Path) -> Result<()> {
    let spec = AssembleSpec::read(config)
        .with_context(|| format!("failed to read assembly spec {}", config.display()))?;
    tracing::info!(
        input_dir = %spec.input_dir.display(),
        categories = spec.categories.len(),
        "assembling input store"
    );

    let report = assemble_input_store(&spec, &mut FileLoader)?;
    if report.store.is_empty() {
        anyhow::bail!("no templates found under {}", spec.input_dir.display());
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    report
        .store
        .save(output)
        .with_context(|| format!("failed to write store {}", output.display()))?;
    tracing::info!(keys = report.inserted, skipped = report.skipped.len(), "input store written");

    write_json(
        None,
        serde_json::json!({
            "output": output.display().to_string(),
            "inserted": report.inserted,
            "skipped": report.skipped,
        }),
    )
}
