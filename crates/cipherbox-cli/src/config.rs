//! CLI configuration
//!
//! Defaults, overridden by an optional TOML file, overridden by
//! `CIPHERBOX_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides, e.g. `CIPHERBOX_SHARE_FANOUT=16`
pub const ENV_PREFIX: &str = "CIPHERBOX";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How long new address records stay valid
    pub record_lifetime_secs: u64,
    /// Cache hint written into new address records
    pub record_ttl_secs: u64,
    /// Re-wraps in flight during a subtree share
    pub share_fanout: usize,
    /// Default log filter when `RUST_LOG` is unset
    pub log: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            record_lifetime_secs: 24 * 60 * 60, // 24 hours
            record_ttl_secs: 5 * 60,
            share_fanout: cipherbox_core::DEFAULT_SHARE_FANOUT,
            log: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load from an optional TOML file and the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn record_lifetime(&self) -> Duration {
        Duration::from_secs(self.record_lifetime_secs)
    }

    pub fn record_ttl_ns(&self) -> u64 {
        self.record_ttl_secs.saturating_mul(1_000_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_record_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.record_lifetime(), cipherbox_crypto::ipns::DEFAULT_LIFETIME);
        assert_eq!(config.record_ttl_ns(), cipherbox_crypto::ipns::DEFAULT_TTL_NS);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "share_fanout = 3\nrecord_ttl_secs = 60").unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.share_fanout, 3);
        assert_eq!(config.record_ttl_secs, 60);
        assert_eq!(config.record_lifetime_secs, 24 * 60 * 60);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(CliConfig::load(Some(Path::new("/nonexistent/cipherbox.toml"))).is_err());
    }
}
