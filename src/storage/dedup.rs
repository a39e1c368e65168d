use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{CrawlError, Result};
use crate::parser::Fingerprint;

/// Persisted set of fingerprints of items already handled.
///
/// The file is a JSON array of strings. Every flush re-reads the file and
/// writes back the union with the in-memory set, so entries appended by
/// another process since the last load are never lost.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    known: HashSet<String>,
}

impl DedupStore {
    /// Open the store at `path`, loading whatever it currently holds.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let known = Self::load(&path);
        info!("Loaded {} processed fingerprints from {}", known.len(), path.display());
        Self { path, known }
    }

    /// Read the persisted fingerprints. A missing or corrupt file reads as empty.
    pub fn load(path: &Path) -> HashSet<String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No dedup store at {}: {}", path.display(), e);
                return HashSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(entries) => entries.into_iter().collect(),
            Err(e) => {
                warn!("Dedup store {} is corrupt, treating as empty: {}", path.display(), e);
                HashSet::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.known.contains(fingerprint.as_str())
    }

    /// Mark `fingerprint` as known. Returns `true` if it was new.
    pub fn claim(&mut self, fingerprint: &Fingerprint) -> bool {
        self.known.insert(fingerprint.as_str().to_string())
    }

    /// Merge the on-disk set into memory and overwrite the file with the union.
    ///
    /// The write goes through a sibling temp file and a rename, so the file is
    /// either the old or the new content. Returns the number of entries written.
    pub fn flush(&mut self) -> Result<usize> {
        let on_disk = Self::load(&self.path);
        self.known.extend(on_disk);

        let sorted: BTreeSet<&String> = self.known.iter().collect();
        let content = serde_json::to_string_pretty(&sorted)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| {
                    CrawlError::StorageError(format!("Failed to create dedup directory: {}", e))
                })?;
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)
            .map_err(|e| CrawlError::StorageError(format!("Failed to write dedup store: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| {
                CrawlError::StorageError(format!("Failed to replace dedup store: {}", e))
            })?;

        debug!("Flushed {} fingerprints to {}", sorted.len(), self.path.display());
        Ok(sorted.len())
    }
}
