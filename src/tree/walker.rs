//! Directory listing for staging

use crate::error::StorageError;
use crate::ignore::IgnoreList;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

/// Filesystem entry types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A file entry with its path and size
    File {
        path: PathBuf,
        name: String,
        size: u64,
    },
    /// A directory entry with its path
    Directory { path: PathBuf, name: String },
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::File { name, .. } | Entry::Directory { name, .. } => name,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Entry::File { path, .. } | Entry::Directory { path, .. } => path,
        }
    }
}

/// Immediate children of one directory, split by the ignore list
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Entries to stage, sorted by name
    pub entries: Vec<Entry>,
    /// Names that matched an ignore rule
    pub ignored: Vec<String>,
}

/// Filesystem walker configuration
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links (default: false)
    pub follow_symlinks: bool,
}

/// Filesystem walker
pub struct Walker<'a> {
    ignore: &'a IgnoreList,
    config: WalkerConfig,
}

impl<'a> Walker<'a> {
    pub fn new(ignore: &'a IgnoreList) -> Self {
        Self {
            ignore,
            config: WalkerConfig::default(),
        }
    }

    /// Create a walker with custom configuration
    pub fn with_config(ignore: &'a IgnoreList, config: WalkerConfig) -> Self {
        Self { ignore, config }
    }

    /// List one directory level.
    ///
    /// Names are NFC-normalized and entries sorted by name, so repeated runs
    /// see siblings in the same order. When two entries normalize to the same
    /// name only the first in file-name order is listed.
    pub fn list(&self, dir: &Path) -> Result<Listing, StorageError> {
        let mut listing = Listing::default();
        let mut seen = HashSet::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to list directory {}: {}", dir.display(), e),
                ))
            })?;

            if entry.file_name().to_str().is_none() {
                warn!(path = %entry.path().display(), "File name is not valid UTF-8, using a lossy name");
            }
            let name: String = entry.file_name().to_string_lossy().nfc().collect();
            if self.ignore.is_ignored(&name) {
                listing.ignored.push(name);
                continue;
            }

            let path = entry.path().to_path_buf();
            if !seen.insert(name.clone()) {
                warn!(path = %path.display(), %name, "Entry name collides with a sibling, skipping");
                continue;
            }
            let metadata = entry.metadata().map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to read metadata for {:?}: {}", path, e),
                ))
            })?;

            if metadata.is_file() {
                listing.entries.push(Entry::File {
                    path,
                    name,
                    size: metadata.len(),
                });
            } else if metadata.is_dir() {
                listing.entries.push(Entry::Directory { path, name });
            }
            // Skip symlinks if not following them
        }

        listing.entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(listing)
    }
}
