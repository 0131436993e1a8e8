//! Configuration for the governance core, loaded from `config.toml` relative
//! to a root directory. Layered `[section]` + per-field defaults, resolved
//! to absolute paths once at load time.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub policies: PoliciesConfig,
    #[serde(default)]
    pub reflexive: ReflexiveConfig,
}

impl GovernanceConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<GovernanceConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "no config file found at {}, using GovernanceConfig::default()",
                path.display()
            );
            GovernanceConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.ledger.db_path = absolutize(root, &self.ledger.db_path);
        self.contracts.db_path = absolutize(root, &self.contracts.db_path);
        if let Some(p) = &self.policies.yaml_path {
            self.policies.yaml_path = Some(absolutize(root, p));
        }
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            ledger: LedgerConfig::default(),
            contracts: ContractsConfig::default(),
            policies: PoliciesConfig::default(),
            reflexive: ReflexiveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
    #[serde(default = "SystemConfig::default_version")]
    pub version: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "governance-core".to_string()
    }
    fn default_version() -> String {
        "0.1.0".to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "LedgerConfig::default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "LedgerConfig::default_block_size")]
    pub block_size: usize,
}

impl LedgerConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("ledger.db")
    }
    fn default_block_size() -> usize {
        100
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
            block_size: Self::default_block_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    #[serde(default = "ContractsConfig::default_db_path")]
    pub db_path: PathBuf,
}

impl ContractsConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("contracts.db")
    }
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoliciesConfig {
    /// Path to a YAML file declaring RBAC roles/permissions/hierarchy.
    #[serde(default)]
    pub yaml_path: Option<PathBuf>,
    #[serde(default = "PoliciesConfig::default_true")]
    pub rbac_enabled: bool,
    #[serde(default = "PoliciesConfig::default_true")]
    pub minimum_necessary_enabled: bool,
    #[serde(default = "PoliciesConfig::default_true")]
    pub hipaa_enabled: bool,
}

impl PoliciesConfig {
    fn default_true() -> bool {
        true
    }
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            yaml_path: None,
            rbac_enabled: true,
            minimum_necessary_enabled: true,
            hipaa_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReflexiveConfig {
    #[serde(default = "ReflexiveConfig::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "ReflexiveConfig::default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl ReflexiveConfig {
    fn default_queue_capacity() -> usize {
        1024
    }
    fn default_poll_timeout_ms() -> u64 {
        1000
    }
}

impl Default for ReflexiveConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::default_queue_capacity(),
            poll_timeout_ms: Self::default_poll_timeout_ms(),
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_paths() {
        let cfg = GovernanceConfig::default();
        assert_eq!(cfg.ledger.block_size, 100);
        assert_eq!(cfg.reflexive.poll_timeout_ms, 1000);
    }

    #[test]
    fn load_resolves_relative_paths_against_root() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GovernanceConfig::load(dir.path()).unwrap();
        assert!(cfg.ledger.db_path.starts_with(dir.path()));
        assert!(cfg.contracts.db_path.starts_with(dir.path()));
    }

    #[test]
    fn load_parses_config_toml_when_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "[ledger]\nblock_size = 5\n",
        )
        .unwrap();
        let cfg = GovernanceConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.ledger.block_size, 5);
    }
}
