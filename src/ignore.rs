//! Ignore list for staging.
//!
//! The ignore list lives at `<workspace>/.metapushignore`, one rule per line.
//! A rule matches a directory entry whose name is exactly equal to it, at any
//! depth. Blank lines and `#` comments are skipped.
//!
//! The cache directory is always ignored: it holds the master key.

use crate::error::StorageError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Ignore list file name, relative to the workspace root
pub const IGNORE_FILE: &str = ".metapushignore";

/// Always ignored, whatever the list says.
const BUILTIN_DEFAULTS: &[&str] = &[".metapush", ".git"];

/// Path to the ignore list file for a workspace.
pub fn ignore_list_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(IGNORE_FILE)
}

/// Exact-name ignore rules
#[derive(Debug, Clone)]
pub struct IgnoreList {
    patterns: BTreeSet<String>,
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self::from_patterns(Vec::new())
    }
}

impl IgnoreList {
    /// Built-in defaults plus the given patterns
    pub fn from_patterns(patterns: Vec<String>) -> Self {
        let mut set: BTreeSet<String> = BUILTIN_DEFAULTS.iter().map(|s| (*s).to_string()).collect();
        set.extend(patterns.into_iter().filter(|p| !p.is_empty()));
        Self { patterns: set }
    }

    /// Load the workspace ignore list. A missing file means defaults only.
    pub fn load(workspace_root: &Path) -> Result<Self, StorageError> {
        let list_path = ignore_list_path(workspace_root);
        if !list_path.is_file() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&list_path)?;
        Ok(Self::from_patterns(parse_lines(&contents)))
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.patterns.contains(name)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }
}

fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
