// SPDX-License-Identifier: Apache-2.0

//! Content-addressed extraction cache for the embedded executor bundle
//! (spec §4.2 step 2, §9 "Global mutable state appears only as the
//! embedded-bundle extraction cache, keyed by version + content hash").
//!
//! The bundle's actual bytes are supplied by the caller (the CLI binary,
//! or an override path) — packaging the real executor is out of scope.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub struct BundleCache {
    root: PathBuf,
}

impl BundleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BundleCache { root: root.into() }
    }

    /// Extracts `bytes` under a digest-named subdirectory of the cache
    /// root, skipping the write if it already exists. Returns the path to
    /// the extracted entry file. Idempotent by construction: the same
    /// bytes always land at the same path.
    pub fn ensure_extracted(&self, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let digest = content_digest(bytes);
        let entry_dir = self.root.join(&digest);
        let entry_path = entry_dir.join("executor");

        if entry_path.exists() {
            tracing::debug!(digest = %digest, "bundle cache hit");
            return Ok(entry_path);
        }

        std::fs::create_dir_all(&entry_dir)?;
        let tmp_path = entry_dir.join("executor.tmp");
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &entry_path)?;
        tracing::debug!(digest = %digest, "bundle extracted into cache");
        Ok(entry_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extraction_is_idempotent_for_identical_content() {
        let dir = tempdir().unwrap();
        let cache = BundleCache::new(dir.path());
        let first = cache.ensure_extracted(b"executor-bytes").unwrap();
        let second = cache.ensure_extracted(b"executor-bytes").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_content_lands_at_different_paths() {
        let dir = tempdir().unwrap();
        let cache = BundleCache::new(dir.path());
        let a = cache.ensure_extracted(b"version-a").unwrap();
        let b = cache.ensure_extracted(b"version-b").unwrap();
        assert_ne!(a, b);
    }
}
