//! Configuration
//!
//! Layered settings for push, clone and the chain services. Sources, lowest
//! precedence first: built-in defaults, the user config file, the workspace
//! config files, then `METAPUSH_*` environment variables.

use crate::keys::Network;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetapushConfig {
    #[serde(default)]
    pub push: PushSettings,

    #[serde(default)]
    pub chain: ChainSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunables for building and sending transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    /// Satoshis per byte of estimated transaction size
    #[serde(default = "default_fee_rate")]
    pub fee_rate_per_byte: f64,

    /// Smallest output worth creating; also the floor of every fee
    #[serde(default = "default_minimum_output")]
    pub minimum_output_value: u64,

    /// Files above this size are split into chunk transactions
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Files above this size are gzipped when that makes them smaller
    #[serde(default = "default_gzip_threshold")]
    pub gzip_threshold: usize,

    #[serde(default = "default_max_script_size")]
    pub max_script_size: usize,

    /// Unconfirmed ancestor chain length tolerated by the mempool
    #[serde(default = "default_ancestor_limit")]
    pub ancestor_limit: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Unset polls until satisfied or cancelled
    #[serde(default)]
    pub poll_max_attempts: Option<u32>,

    #[serde(default)]
    pub network: Network,
}

fn default_fee_rate() -> f64 {
    1.1
}

fn default_minimum_output() -> u64 {
    546
}

fn default_max_file_size() -> usize {
    90_000
}

fn default_gzip_threshold() -> usize {
    1_000
}

fn default_max_script_size() -> usize {
    100_000
}

fn default_ancestor_limit() -> usize {
    25
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            fee_rate_per_byte: default_fee_rate(),
            minimum_output_value: default_minimum_output(),
            max_file_size: default_max_file_size(),
            gzip_threshold: default_gzip_threshold(),
            max_script_size: default_max_script_size(),
            ancestor_limit: default_ancestor_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: None,
            network: Network::default(),
        }
    }
}

impl PushSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.fee_rate_per_byte.is_nan() || self.fee_rate_per_byte <= 0.0 {
            return Err("fee_rate_per_byte must be positive".to_string());
        }
        if self.max_file_size == 0 {
            return Err("max_file_size cannot be zero".to_string());
        }
        if self.max_file_size >= self.max_script_size {
            return Err(format!(
                "max_file_size ({}) must be below max_script_size ({})",
                self.max_file_size, self.max_script_size
            ));
        }
        if self.ancestor_limit == 0 {
            return Err("ancestor_limit cannot be zero".to_string());
        }
        if self.poll_max_attempts == Some(0) {
            return Err("poll_max_attempts cannot be zero".to_string());
        }
        Ok(())
    }
}

/// Endpoints of the chain API, the metanet index and the viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Raw transaction index used for visibility and mempool queries
    #[serde(default = "default_bitdb_url")]
    pub bitdb_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_viewer_url")]
    pub viewer_url: String,
}

fn default_api_url() -> String {
    "https://api.whatsonchain.com/v1/bsv/main".to_string()
}

fn default_index_url() -> String {
    "https://metanaria.planaria.network/q".to_string()
}

fn default_bitdb_url() -> String {
    "https://genesis.bitdb.network/q/1FnauZ9aUH2Bex6JzdcV4eNX7oLSSEbxtN".to_string()
}

fn default_viewer_url() -> String {
    "https://codeonchain.network".to_string()
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            index_url: default_index_url(),
            bitdb_url: default_bitdb_url(),
            api_key: None,
            viewer_url: default_viewer_url(),
        }
    }
}

impl ChainSettings {
    /// Link to the pushed tree in the viewer.
    pub fn viewer_link(&self, funding_tx_id: &str) -> String {
        format!("{}?tx={}", self.viewer_url.trim_end_matches('/'), funding_tx_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, url) in [
            ("api_url", &self.api_url),
            ("index_url", &self.index_url),
            ("bitdb_url", &self.bitdb_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("{} must be an http(s) URL, got '{}'", name, url));
            }
        }
        Ok(())
    }
}

impl MetapushConfig {
    /// Validate every section, collecting all failures.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(e) = self.push.validate() {
            errors.push(format!("push: {}", e));
        }
        if let Err(e) = self.chain.validate() {
            errors.push(format!("chain: {}", e));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
