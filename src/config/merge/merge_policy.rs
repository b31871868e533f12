//! Merge rules: defaults and override order.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the push and chain defaults applied.
///
/// Serde defaults cover the same values; setting them here keeps partial
/// sections from higher-precedence sources merging key by key.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("push.fee_rate_per_byte", 1.1)?
        .set_default("push.minimum_output_value", 546)?
        .set_default("push.max_file_size", 90_000)?
        .set_default("push.gzip_threshold", 1_000)?
        .set_default("push.max_script_size", 100_000)?
        .set_default("push.ancestor_limit", 25)?
        .set_default("push.poll_interval_ms", 1_000)?
        .set_default("push.network", "mainnet")
}
