//! # cs-cards
//!
//! Statistical-model assembly for binned likelihood fits: a registry of
//! observations, processes and systematics; template binding against an
//! input store; bin-by-bin statistical uncertainties; canonical bin names;
//! and datacard/output-store emission per (bin, mass point).
//!
//! ## Modules
//!
//! - [`registry`] - categories, records, systematics, selections and views
//! - [`shapes`] - key patterns and [`shapes::extract_shapes`]
//! - [`bbb`] - [`bbb::BinByBin`] synthesizer
//! - [`naming`] - [`naming::standardize_bin_names`]
//! - [`datacard`] - writer, parser and store validation
//! - [`config`], [`pipeline`], [`manifest`] - configured end-to-end runs
//! - [`assemble`], [`report`] - input store assembly and stat-error reports

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assemble;
pub mod bbb;
pub mod config;
pub mod datacard;
pub mod manifest;
pub mod naming;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod shapes;

pub use bbb::{BinByBin, BinByBinReport};
pub use config::{CardConfig, read_card_config};
pub use datacard::{Datacard, DatacardSummary, write_datacard};
pub use naming::standardize_bin_names;
pub use pipeline::{RunSummary, build_registry, run};
pub use registry::{Category, Registry, Scope, Selection, SystKind, View};
pub use shapes::{ExtractReport, extract_shapes};
