//! Run manifest: every artifact of a card-production run with its digest.

use std::path::{Path, PathBuf};

use cs_core::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// What an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Datacard text.
    Datacard,
    /// Output template store.
    Store,
}

/// One produced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path relative to the output directory.
    pub path: String,
    /// Kind of file.
    pub kind: ArtifactKind,
    /// Size in bytes.
    pub bytes: u64,
    /// Hex SHA-256 of the content.
    pub sha256: String,
}

/// A mass point that produced no complete output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMass {
    /// Mass point.
    pub mass: String,
    /// Error message.
    pub error: String,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Producing tool.
    pub tool: String,
    /// Tool version.
    pub version: String,
    /// Datacards first, then stores.
    pub artifacts: Vec<Artifact>,
    /// Mass points that failed.
    pub failed: Vec<FailedMass>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(64);
    for b in out {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn artifact(out_dir: &Path, path: &Path, kind: ArtifactKind) -> Result<Artifact> {
    let bytes = std::fs::read(path)?;
    let rel = path.strip_prefix(out_dir).unwrap_or(path);
    Ok(Artifact {
        path: rel.to_string_lossy().replace('\\', "/"),
        kind,
        bytes: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
    })
}

impl Manifest {
    /// Hash `datacards` and `stores` (in that order) living under `out_dir`.
    pub fn build(
        out_dir: &Path,
        datacards: &[PathBuf],
        stores: &[PathBuf],
        failed: Vec<FailedMass>,
    ) -> Result<Self> {
        let mut artifacts = Vec::with_capacity(datacards.len() + stores.len());
        for p in datacards {
            artifacts.push(artifact(out_dir, p, ArtifactKind::Datacard)?);
        }
        for p in stores {
            artifacts.push(artifact(out_dir, p, ArtifactKind::Store)?);
        }
        Ok(Self {
            tool: "cardsmith".to_string(),
            version: cs_core::VERSION.to_string(),
            artifacts,
            failed,
        })
    }

    /// Write `manifest.json` into `out_dir`.
    pub fn write(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)? + "\n")?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn manifest_paths_are_relative() {
        let dir = std::env::temp_dir().join(format!("cs_manifest_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let card = dir.join("a_300.txt");
        std::fs::write(&card, "imax 1\n").unwrap();
        let m = Manifest::build(&dir, &[card], &[], vec![]).unwrap();
        assert_eq!(m.artifacts[0].path, "a_300.txt");
        assert_eq!(m.artifacts[0].bytes, 7);
        assert_eq!(m.artifacts[0].kind, ArtifactKind::Datacard);
        let written = m.write(&dir).unwrap();
        let back: Manifest = serde_json::from_slice(&std::fs::read(written).unwrap()).unwrap();
        assert_eq!(back, m);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
