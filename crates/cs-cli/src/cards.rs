//! `cardsmith cards` and `cardsmith validate`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use cs_cards::datacard::{Datacard, validate};
use cs_cards::{pipeline, read_card_config};
use cs_store::TemplateStore;

use crate::write_json;

pub fn cmd_cards(
    config: &Path,
    out_dir: &Path,
    input: Option<&Path>,
    summary_out: Option<&PathBuf>,
) -> Result<()> {
    tracing::info!(path = %config.display(), "loading card config");
    let cfg = read_card_config(config)
        .with_context(|| format!("failed to read card config {}", config.display()))?;

    let input = match (input, cfg.input.as_deref()) {
        (Some(p), _) | (None, Some(p)) => p.to_path_buf(),
        (None, None) => anyhow::bail!("no input store: pass --input or set `input` in the config"),
    };
    tracing::info!(path = %input.display(), "loading input store");
    let store = TemplateStore::open(&input)
        .with_context(|| format!("failed to open input store {}", input.display()))?;
    tracing::info!(keys = store.len(), "input store loaded");

    let summary = pipeline::run(&cfg, &store, out_dir)?;
    tracing::info!(
        datacards = summary.datacards.len(),
        stores = summary.stores.len(),
        missing = summary.extraction.missing.len(),
        dropped = summary.extraction.dropped.len(),
        failed = summary.failed.len(),
        "cards written"
    );
    write_json(summary_out, serde_json::to_value(&summary)?)?;

    if !summary.failed.is_empty() {
        let masses: Vec<&str> = summary.failed.iter().map(|f| f.mass.as_str()).collect();
        anyhow::bail!("{} mass point(s) failed: {}", masses.len(), masses.join(", "));
    }
    Ok(())
}

/// Store referenced by the card's `shapes` lines, relative to the card.
fn store_from_card(datacard: &Path, card: &Datacard) -> Result<Option<PathBuf>> {
    match card.shape_files().as_slice() {
        [] => Ok(None),
        [file] => {
            let base = datacard.parent().unwrap_or_else(|| Path::new(""));
            Ok(Some(base.join(file)))
        }
        files => anyhow::bail!(
            "datacard references {} shape files ({}); pass --store",
            files.len(),
            files.join(", ")
        ),
    }
}

pub fn cmd_validate(datacard: &Path, store: Option<&Path>) -> Result<()> {
    let text = std::fs::read_to_string(datacard)
        .with_context(|| format!("failed to read datacard {}", datacard.display()))?;
    let card = Datacard::parse(&text)
        .with_context(|| format!("failed to parse datacard {}", datacard.display()))?;

    let store_path = match store {
        Some(p) => Some(p.to_path_buf()),
        None => store_from_card(datacard, &card)?,
    };
    let report = match &store_path {
        Some(path) => {
            let store = TemplateStore::open(path)
                .with_context(|| format!("failed to open store {}", path.display()))?;
            validate(&card, &store)
        }
        None => {
            tracing::info!("counting datacard, no store to check");
            Default::default()
        }
    };
    tracing::info!(keys = report.keys_checked, problems = report.problems.len(), "datacard checked");

    write_json(
        None,
        serde_json::json!({
            "datacard": datacard.display().to_string(),
            "store": store_path.as_ref().map(|p| p.display().to_string()),
            "bins": card.bins,
            "processes": card.columns.iter().map(|c| c.process.clone()).collect::<Vec<_>>(),
            "systematics": card.systematics.len(),
            "keys_checked": report.keys_checked,
            "problems": report.problems,
        }),
    )?;
    if !report.is_ok() {
        anyhow::bail!("datacard {} failed validation", datacard.display());
    }
    Ok(())
}
