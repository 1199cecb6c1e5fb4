//! cardsmith CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod assemble;
mod cards;
mod stat_unc;

#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(about = "cardsmith - datacards and template stores for binned fits")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one datacard per (bin, mass point) plus one template store per mass point
    Cards {
        /// Card config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for datacards, stores and manifest.json
        #[arg(long)]
        out_dir: PathBuf,

        /// Input template store (overrides `input` from the config)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file for the run summary (pretty JSON). Defaults to stdout.
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Build an input template store from per-sample template files
    Assemble {
        /// Assembly spec (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output template store
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Per-bin relative statistical uncertainty of one template
    StatUnc {
        /// Template store
        #[arg(long)]
        store: PathBuf,

        /// Template key (e.g. `h_MX_a/TT`)
        #[arg(long)]
        key: String,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "csv")]
        format: stat_unc::Format,
    },

    /// Check a datacard against its template store
    Validate {
        /// Datacard text file
        #[arg(long)]
        datacard: PathBuf,

        /// Template store (defaults to the file named by the `shapes` lines)
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON results
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Cards { config, out_dir, input, summary } => {
            cards::cmd_cards(&config, &out_dir, input.as_deref(), summary.as_ref())
        }
        Commands::Assemble { config, output } => assemble::cmd_assemble(&config, &output),
        Commands::StatUnc { store, key, output, format } => {
            stat_unc::cmd_stat_unc(&store, &key, output.as_deref(), format)
        }
        Commands::Validate { datacard, store } => cards::cmd_validate(&datacard, store.as_deref()),
        Commands::Version => {
            println!("cardsmith {}", cs_core::VERSION);
            Ok(())
        }
    }
}

pub(crate) fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
