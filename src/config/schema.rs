//! Configuration schema for Shipyard
//!
//! Global configuration lives at `~/.config/shipyard/config.toml`; a project
//! may override any key in a `.shipyard.toml` next to its `Cargo.toml`.

use crate::pipeline::matrix::{HostPolicy, MatrixEntryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Project being built
    pub project: ProjectConfig,

    /// Which events start a pipeline run
    pub trigger: TriggerConfig,

    /// Release stage settings
    pub release: ReleaseConfig,

    /// Build cache settings
    pub cache: CacheConfig,

    /// Environment passed to every toolchain process
    pub env: EnvConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append pipeline events to the event log
    pub run_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            run_log: true,
        }
    }
}

/// Project settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Binary name produced by the release build.
    /// Falls back to the `[package] name` in Cargo.toml.
    pub binary: Option<String>,

    /// Target triple used for the verify stage cache key.
    /// Falls back to the triple of the machine running shipyard.
    pub reference_target: Option<String>,
}

/// Trigger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Branches that start a run on push, or as the base of a pull request
    pub branches: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            branches: vec!["main".to_string()],
        }
    }
}

/// Release stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Days a published artifact is retained
    pub retention_days: u32,

    /// What to do with matrix entries for a different host OS
    pub host_policy: HostPolicy,

    /// Matrix entries (empty = built-in four-platform matrix)
    pub matrix: Vec<MatrixEntryConfig>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            host_policy: HostPolicy::All,
            matrix: Vec::new(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable dependency caching (default: true)
    pub enabled: bool,

    /// Remove caches not saved for N days on `cache gc` (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gc_days: 30,
        }
    }
}

/// Variable that keeps cargo's output colored when it is piped
pub const TERM_COLOR_VAR: &str = "CARGO_TERM_COLOR";

/// Environment variables for toolchain processes.
///
/// A configured `[env]` table is layered over the defaults, so adding
/// `RUSTFLAGS` does not drop `CARGO_TERM_COLOR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct EnvConfig(pub BTreeMap<String, String>);

impl Default for EnvConfig {
    fn default() -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(TERM_COLOR_VAR.to_string(), "always".to_string());
        Self(vars)
    }
}

impl From<BTreeMap<String, String>> for EnvConfig {
    fn from(configured: BTreeMap<String, String>) -> Self {
        let mut env = Self::default();
        env.0.extend(configured);
        env
    }
}

impl From<EnvConfig> for BTreeMap<String, String> {
    fn from(env: EnvConfig) -> Self {
        env.0
    }
}

impl EnvConfig {
    /// Iterate over `(key, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::matrix::Host;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[release]"));
        assert!(toml.contains("CARGO_TERM_COLOR"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.release.retention_days, 7);
        assert_eq!(config.trigger.branches, vec!["main"]);
        assert_eq!(config.env.0.get("CARGO_TERM_COLOR").unwrap(), "always");
    }

    #[test]
    fn env_table_keeps_term_color() {
        let config: Config = toml::from_str("[env]\nRUSTFLAGS = \"-D warnings\"").unwrap();
        assert_eq!(config.env.0.get("RUSTFLAGS").map(String::as_str), Some("-D warnings"));
        assert_eq!(config.env.0.get(TERM_COLOR_VAR).map(String::as_str), Some("always"));
    }

    #[test]
    fn env_table_can_override_term_color() {
        let config: Config = toml::from_str("[env]\nCARGO_TERM_COLOR = \"never\"").unwrap();
        assert_eq!(config.env.0.get(TERM_COLOR_VAR).map(String::as_str), Some("never"));
        assert_eq!(config.env.0.len(), 1);
    }

    #[test]
    fn config_deserializes_matrix() {
        let toml = r#"
            [project]
            binary = "sso-profiles"

            [[release.matrix]]
            host = "ubuntu-latest"
            target = "x86_64-unknown-linux-gnu"

            [[release.matrix]]
            host = "windows-latest"
            target = "x86_64-pc-windows-msvc"
            artifact_path = "dist/sso-profiles.exe"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.release.matrix.len(), 2);
        assert_eq!(config.release.matrix[1].host, Host::WindowsLatest);
        assert!(config.release.matrix[0].artifact_path.is_none());
        assert_eq!(config.release.retention_days, 7); // default preserved
    }
}
