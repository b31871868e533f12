//! Builds the layered configuration.

use super::merge_policy;
use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::MetapushConfig;
use config::ConfigError;
use std::path::Path;

pub struct MergeService;

impl MergeService {
    /// defaults, then global file, then workspace files, then environment
    pub fn load(workspace_root: &Path) -> Result<MetapushConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }
}
