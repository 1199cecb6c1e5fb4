//! Shape binding: placeholder patterns and template extraction.

mod binder;
mod pattern;


pub use binder::{ExtractReport, extract_shapes};
pub use pattern::{KeyPattern, KeyTokens, Token};
