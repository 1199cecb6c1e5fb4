//! Combine-style datacards: writing, parsing and validating them against
//! their template store.

mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use reader::{
    CardColumn, CardSystematic, Datacard, ReferencedKey, ShapesLine, ValidationReport, validate,
};
pub use writer::{
    DatacardSummary, OUTPUT_NOMINAL, OUTPUT_SYSTEMATIC, render_datacard, write_datacard,
};
