//! Entry points for loading configuration.

use super::merge::service::MergeService;
use super::MetapushConfig;
use config::{Config, ConfigError, File};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<MetapushConfig, ConfigError> {
        MergeService::load(workspace_root)
    }

    /// Load from a single file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<MetapushConfig, ConfigError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::Message(format!("Invalid path: {}", path.display())))?;
        let config = super::merge::merge_policy::builder_with_defaults()?
            .add_source(File::with_name(path_str).required(true))
            .build()?;
        config.try_deserialize()
    }

    /// Defaults only.
    pub fn default() -> Result<MetapushConfig, ConfigError> {
        Config::builder().build()?.try_deserialize()
    }
}
