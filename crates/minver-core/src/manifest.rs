//! Manifest references, validation, digests and restoration snapshots.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::VerifyError;

/// File name cargo resolves when no manifest path is given.
pub const DEFAULT_MANIFEST: &str = "Cargo.toml";

/// Lockfile cargo writes next to the workspace root manifest.
pub const LOCKFILE: &str = "Cargo.lock";

/// Reference to the manifest under verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRef {
    /// Path of the manifest on disk.
    pub path: PathBuf,

    /// Whether the path was supplied explicitly (forwarded to collaborators)
    /// or resolved by default (collaborators apply their own default).
    pub explicit: bool,
}

impl ManifestRef {
    /// An explicitly supplied manifest path.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            explicit: true,
        }
    }

    /// `Cargo.toml` in the given working directory.
    pub fn default_in(dir: &Path) -> Self {
        Self {
            path: dir.join(DEFAULT_MANIFEST),
            explicit: false,
        }
    }

    /// Resolve an optional user-supplied path against a working directory.
    pub fn resolve(path: Option<PathBuf>, cwd: &Path) -> Self {
        match path {
            Some(p) => Self::explicit(p),
            None => Self::default_in(cwd),
        }
    }

    /// `--manifest-path=<path>` when explicit, nothing otherwise.
    pub fn cli_args(&self) -> Vec<String> {
        if self.explicit {
            vec![format!("--manifest-path={}", self.path.display())]
        } else {
            Vec::new()
        }
    }

    /// Check the manifest exists and is a syntactically valid Cargo manifest.
    pub fn validate(&self) -> Result<(), VerifyError> {
        let invalid = |reason: String| VerifyError::Manifest {
            path: self.path.clone(),
            reason,
        };

        if !self.path.exists() {
            return Err(invalid("does not exist".to_string()));
        }
        if !self.path.is_file() {
            return Err(invalid("is not a regular file".to_string()));
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| invalid(format!("could not be read: {e}")))?;
        let doc: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| invalid(format!("is not valid TOML: {}", e.message())))?;

        if !doc.contains_key("package") && !doc.contains_key("workspace") {
            return Err(invalid(
                "has neither a [package] nor a [workspace] table".to_string(),
            ));
        }

        debug!(manifest = %self.path.display(), "Manifest validated");
        Ok(())
    }

    /// SHA-256 of the manifest's current bytes.
    pub fn digest(&self) -> std::io::Result<ManifestDigest> {
        let content = std::fs::read(&self.path)?;
        Ok(ManifestDigest::from_bytes(&content))
    }

    /// Directory containing the manifest.
    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// The lockfile governing this manifest: the nearest `Cargo.lock` in the
    /// manifest directory or one of its ancestors, otherwise the sibling path
    /// cargo will create.
    pub fn lockfile_path(&self) -> PathBuf {
        let dir = self.dir();
        dir.ancestors()
            .map(|d| d.join(LOCKFILE))
            .find(|p| p.is_file())
            .unwrap_or_else(|| dir.join(LOCKFILE))
    }
}

impl std::fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Hex-encoded SHA-256 of manifest bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestDigest(pub String);

impl ManifestDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ManifestDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ManifestDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saved content of one file; `None` when the file did not exist.
#[derive(Debug)]
struct SavedFile {
    path: PathBuf,
    content: Option<Vec<u8>>,
}

impl SavedFile {
    fn capture(path: PathBuf) -> std::io::Result<Self> {
        let content = match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        Ok(Self { path, content })
    }

    fn restore(&self) -> Result<(), VerifyError> {
        let result = match &self.content {
            Some(bytes) => std::fs::write(&self.path, bytes),
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        result.map_err(|source| VerifyError::Restore {
            path: self.path.clone(),
            source,
        })
    }
}

/// Captured manifest and lockfile state, restored on [`ManifestSnapshot::restore`]
/// or, failing that, when dropped.
///
/// The drop path covers cancellation: if the verification future is dropped
/// mid-run the original files are still written back.
#[derive(Debug)]
pub struct ManifestSnapshot {
    manifest: SavedFile,
    lockfile: SavedFile,
    digest: ManifestDigest,
    armed: bool,
}

impl ManifestSnapshot {
    /// Capture the manifest and its lockfile.
    pub fn capture(manifest: &ManifestRef) -> Result<Self, VerifyError> {
        let manifest_file =
            SavedFile::capture(manifest.path.clone()).map_err(|e| VerifyError::Manifest {
                path: manifest.path.clone(),
                reason: format!("could not be read for snapshot: {e}"),
            })?;
        let content = manifest_file.content.as_deref().ok_or_else(|| VerifyError::Manifest {
            path: manifest.path.clone(),
            reason: "disappeared before snapshot".to_string(),
        })?;
        let digest = ManifestDigest::from_bytes(content);

        let lock_path = manifest.lockfile_path();
        let lockfile = SavedFile::capture(lock_path.clone()).map_err(|e| VerifyError::Manifest {
            path: lock_path,
            reason: format!("could not be read for snapshot: {e}"),
        })?;

        debug!(
            manifest = %manifest.path.display(),
            lockfile = %lockfile.path.display(),
            lockfile_present = lockfile.content.is_some(),
            digest = %digest.short(),
            "Captured manifest snapshot"
        );

        Ok(Self {
            manifest: manifest_file,
            lockfile,
            digest,
            armed: true,
        })
    }

    /// Digest of the manifest at capture time.
    pub fn digest(&self) -> &ManifestDigest {
        &self.digest
    }

    pub fn lockfile_path(&self) -> &Path {
        &self.lockfile.path
    }

    /// Write the captured state back. Both files are attempted; the first
    /// error is returned.
    pub fn restore(mut self) -> Result<(), VerifyError> {
        self.armed = false;
        let manifest = self.manifest.restore();
        let lockfile = self.lockfile.restore();
        manifest.and(lockfile)
    }

    /// Drop the snapshot without restoring anything.
    pub fn discard(mut self) {
        self.armed = false;
    }
}

impl Drop for ManifestSnapshot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            manifest = %self.manifest.path.display(),
            "Verification interrupted, restoring original manifest"
        );
        for file in [&self.manifest, &self.lockfile] {
            if let Err(e) = file.restore() {
                warn!(error = %e, "Restoration on drop failed");
            }
        }
    }
}
