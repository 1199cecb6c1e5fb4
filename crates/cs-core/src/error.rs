//! Error types for cardsmith

use thiserror::Error;

/// cardsmith error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Malformed or duplicate declarative input. Raised before any file I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required nominal template is absent from the input store.
    #[error("missing template '{key}' (bin={bin}, process={process}, mass={mass})")]
    MissingTemplate {
        /// Resolved store key.
        key: String,
        /// Bin (category) name.
        bin: String,
        /// Process name.
        process: String,
        /// Mass point.
        mass: String,
    },

    /// An up/down pair of a shape systematic could not be resolved.
    #[error(
        "shape systematic '{systematic}' dropped: missing '{key}' (bin={bin}, process={process}, mass={mass})"
    )]
    ShapeSystematicDropped {
        /// Systematic name.
        systematic: String,
        /// First unresolved key.
        key: String,
        /// Bin (category) name.
        bin: String,
        /// Process name.
        process: String,
        /// Mass point.
        mass: String,
    },

    /// Output key collision between distinct (bin, process) pairs.
    #[error("duplicate output key '{key}' (bin={bin}, process={process}, mass={mass})")]
    DuplicateKey {
        /// Colliding store key.
        key: String,
        /// Bin of the rejected entry.
        bin: String,
        /// Process of the rejected entry.
        process: String,
        /// Mass point of the card being written.
        mass: String,
    },

    /// Bin-by-bin synthesis requested twice for the same process.
    #[error("bin-by-bin uncertainties already added (bin={bin}, process={process}, mass={mass})")]
    BinByBinReapplied {
        /// Bin (category) name.
        bin: String,
        /// Process name.
        process: String,
        /// Mass point.
        mass: String,
    },

    /// Template store failure (unopenable file, corrupt content).
    #[error("template store error: {0}")]
    Store(String),

    /// Datacard text could not be parsed or does not match its store.
    #[error("datacard error: {0}")]
    Datacard(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
