//! Workspace and home files read by a push.

use crate::error::{PipelineError, StorageError};
use crate::ignore::IGNORE_FILE;
use crate::keys::{ExtendedPrivateKey, KeyPath};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CACHE_DIR: &str = ".metapush";
pub const CACHE_FILE: &str = "cache.json";
pub const PACKAGE_FILE: &str = "metapush.json";
pub const FUNDING_KEY_FILE: &str = "funding_key.json";

/// Locations of every file a push depends on
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub workspace_root: PathBuf,
    pub home: PathBuf,
}

impl WorkspacePaths {
    pub fn new(workspace_root: PathBuf, home: PathBuf) -> Self {
        Self {
            workspace_root,
            home,
        }
    }

    /// Use the current user's home directory.
    pub fn for_current_user(workspace_root: PathBuf) -> Result<Self, PipelineError> {
        let home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or_else(|| PipelineError::Config("cannot determine home directory".to_string()))?;
        Ok(Self::new(workspace_root, home))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.workspace_root.join(CACHE_DIR)
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir().join(CACHE_FILE)
    }

    pub fn package_file(&self) -> PathBuf {
        self.workspace_root.join(PACKAGE_FILE)
    }

    pub fn ignore_file(&self) -> PathBuf {
        self.workspace_root.join(IGNORE_FILE)
    }

    pub fn home_dir(&self) -> PathBuf {
        self.home.join(CACHE_DIR)
    }

    pub fn funding_key_file(&self) -> PathBuf {
        self.home_dir().join(FUNDING_KEY_FILE)
    }

    /// Every required path, in the order they are reported when missing
    pub fn required(&self) -> Vec<PathBuf> {
        vec![
            self.home_dir(),
            self.funding_key_file(),
            self.cache_dir(),
            self.cache_file(),
            self.ignore_file(),
            self.package_file(),
        ]
    }

    /// Fail with every missing path at once.
    pub fn preflight(&self) -> Result<(), PipelineError> {
        let missing: Vec<PathBuf> = self.required().into_iter().filter(|p| !p.exists()).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ConfigurationMissing { paths: missing })
        }
    }
}

/// `funding_key.json`: an extended key and the path of the funding key below it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingKeyFile {
    pub xprv: String,
    pub derivation_path: KeyPath,
}

impl FundingKeyFile {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        read_json(path)
    }

    pub fn funding_key(&self) -> Result<ExtendedPrivateKey, StorageError> {
        let extended: ExtendedPrivateKey = self.xprv.parse()?;
        extended.derive_path(&self.derivation_path)
    }
}

/// `metapush.json`. Only the name is used; the rest is kept as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageInfo {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        read_json(path)
    }

    /// Root node name: the package name, else the workspace directory name.
    pub fn root_name(&self, workspace_root: &Path) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        workspace_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StorageError> {
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| StorageError::Serialization {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
