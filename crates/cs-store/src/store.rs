//! Keyed template stores: read-only input stores and append-only output stores.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::histogram::Histogram;

/// Format tag written into every store file.
pub const STORE_FORMAT: &str = "cardsmith-templates/1";

#[derive(Serialize)]
struct StoreFileOut<'a> {
    format: &'a str,
    histograms: BTreeMap<&'a str, &'a Histogram>,
}

#[derive(Deserialize)]
struct StoreFileIn {
    format: String,
    histograms: BTreeMap<String, Histogram>,
}

/// In-memory keyed histogram container.
///
/// Keys are `/`-separated paths (e.g. `bin/process`). Histograms are shared
/// through `Arc`, so references handed out by [`TemplateStore::get`] stay
/// valid independently of the store.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    histograms: BTreeMap<String, Arc<Histogram>>,
}

impl TemplateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store file and validate every histogram in it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Parse a store from serialized bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: StoreFileIn = serde_json::from_slice(bytes)?;
        if file.format != STORE_FORMAT {
            return Err(StoreError::BadFormat(file.format));
        }
        let mut histograms = BTreeMap::new();
        for (key, h) in file.histograms {
            h.validate(&key)?;
            histograms.insert(key, Arc::new(h));
        }
        Ok(Self { histograms })
    }

    /// Serialize to pretty JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let out = StoreFileOut {
            format: STORE_FORMAT,
            histograms: self.histograms.iter().map(|(k, h)| (k.as_str(), h.as_ref())).collect(),
        };
        Ok(serde_json::to_vec_pretty(&out)?)
    }

    /// Write the store atomically (temp file in the same directory + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_vec()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Get a histogram, failing with [`StoreError::KeyNotFound`].
    pub fn get(&self, key: &str) -> Result<Arc<Histogram>> {
        self.lookup(key).cloned().ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    /// Get a histogram if present.
    pub fn lookup(&self, key: &str) -> Option<&Arc<Histogram>> {
        self.histograms.get(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.histograms.contains_key(key)
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.histograms.keys().map(String::as_str)
    }

    /// Number of stored histograms.
    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    /// Insert a new key. Existing keys are never overwritten.
    pub fn insert(&mut self, key: impl Into<String>, histogram: Arc<Histogram>) -> Result<()> {
        let key = key.into();
        histogram.validate(&key)?;
        if self.histograms.contains_key(&key) {
            return Err(StoreError::DuplicateKey { key, owner: "existing entry".into() });
        }
        self.histograms.insert(key, histogram);
        Ok(())
    }
}

/// One entry to append to an [`OutputStore`].
#[derive(Debug, Clone)]
pub struct PendingEntry {
    /// Store key.
    pub key: String,
    /// Owner tag (e.g. `bin/process`) used to tell re-writes from collisions.
    pub owner: String,
    /// Template.
    pub histogram: Arc<Histogram>,
}

/// Append-only store backed by one output file.
///
/// The file is created when the store is opened and rewritten atomically on
/// [`OutputStore::finish`]. A store dropped without `finish` (error path)
/// still persists every entry accepted so far.
#[derive(Debug)]
pub struct OutputStore {
    path: PathBuf,
    store: TemplateStore,
    owners: HashMap<String, String>,
    finished: bool,
}

impl OutputStore {
    /// Create (or truncate) the output file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = TemplateStore::new();
        store.save(&path)?;
        log::debug!("opened output store {}", path.display());
        Ok(Self { path, store, owners: HashMap::new(), finished: false })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name as referenced from datacards living next to the store.
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Read access to the accumulated content.
    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Append entries as a unit: every key is checked before any is inserted.
    ///
    /// A key already written by the same owner with identical content is
    /// skipped; any other existing key is a [`StoreError::DuplicateKey`].
    /// Returns the number of newly inserted keys.
    pub fn append(&mut self, entries: Vec<PendingEntry>) -> Result<usize> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for e in &entries {
            e.histogram.validate(&e.key)?;
            if let Some(prev) = seen.insert(e.key.as_str(), e.owner.as_str()) {
                return Err(StoreError::DuplicateKey { key: e.key.clone(), owner: prev.to_string() });
            }
            if let Some(owner) = self.owners.get(&e.key) {
                let same = owner == &e.owner
                    && self.store.lookup(&e.key).is_some_and(|h| **h == *e.histogram);
                if !same {
                    return Err(StoreError::DuplicateKey { key: e.key.clone(), owner: owner.clone() });
                }
            }
        }

        let mut inserted = 0;
        for e in entries {
            if self.owners.contains_key(&e.key) {
                continue;
            }
            self.owners.insert(e.key.clone(), e.owner);
            self.store.insert(e.key, e.histogram)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Persist and close the store.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.finished = true;
        self.store.save(&self.path)?;
        log::debug!("closed output store {} ({} keys)", self.path.display(), self.store.len());
        Ok(self.path.clone())
    }
}

impl Drop for OutputStore {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.save(&self.path) {
            log::error!("failed to persist output store {}: {}", self.path.display(), e);
        }
    }
}
