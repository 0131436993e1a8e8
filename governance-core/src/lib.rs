//! Governance core: policy engine, provenance ledger, contract engine, and
//! reflexive core for a tool-serving agent platform.

pub mod config;
pub mod contract;
pub mod error;
pub mod http;
pub mod ledger;
pub mod merkle;
pub mod policy;
pub mod reflexive;

pub use config::GovernanceConfig;
pub use error::{GovernanceError, GovernanceResult};

use std::sync::Arc;
use std::time::Duration;

use contract::ContractEngine;
use ledger::LedgerStore;
use policy::PolicyEngine;
use reflexive::ReflexiveEngine;

/// Wires the four subsystems against one configuration. Callers of the HTTP
/// surface (or an embedding host) share a single `GovernanceCore`.
pub struct GovernanceCore {
    pub policies: PolicyEngine,
    pub ledger: Arc<LedgerStore>,
    pub contracts: ContractEngine,
    pub reflexive: Arc<ReflexiveEngine>,
}

impl GovernanceCore {
    pub fn open(config: &GovernanceConfig) -> GovernanceResult<Self> {
        let ledger = Arc::new(LedgerStore::open(&config.ledger.db_path, config.ledger.block_size)?);
        let contracts = ContractEngine::open(&config.contracts.db_path)?;

        let mut policies = PolicyEngine::new();
        if config.policies.rbac_enabled {
            policies.register(Box::new(policy::rbac::RbacPolicy::new(load_rbac_config(config)?)));
        }
        if config.policies.minimum_necessary_enabled {
            policies.register(Box::new(policy::minimum_necessary::MinimumNecessaryPolicy::new(
                Default::default(),
            )));
        }
        if config.policies.hipaa_enabled {
            policies.register(Box::new(policy::hipaa::HipaaPolicy::new()));
        }

        let reflexive = Arc::new(ReflexiveEngine::new(
            config.reflexive.queue_capacity,
            Duration::from_millis(config.reflexive.poll_timeout_ms),
            Some(ledger.clone()),
        ));
        reflexive.register_monitor(Box::new(reflexive::monitors::PolicyMonitor::new()));
        reflexive.register_monitor(Box::new(reflexive::monitors::LedgerMonitor::new(ledger.clone())));
        reflexive.register_monitor(Box::new(reflexive::monitors::AnomalyDetector::new()));

        Ok(Self { policies, ledger, contracts, reflexive })
    }

    pub fn start(self: &Arc<Self>) {
        let reflexive = self.reflexive.clone();
        reflexive.start();
    }

    pub fn stop(&self) {
        self.reflexive.stop();
    }
}

/// Loads the YAML policy declaration if configured, else an empty (deny-all)
/// RBAC configuration.
fn load_rbac_config(config: &GovernanceConfig) -> GovernanceResult<policy::rbac::RbacConfig> {
    let Some(path) = &config.policies.yaml_path else {
        return Ok(policy::rbac::RbacConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| GovernanceError::Persistence(e.to_string()))?;
    let declared: YamlPolicyDeclaration =
        serde_yaml::from_str(&text).map_err(|e| GovernanceError::InvalidInput(e.to_string()))?;
    Ok(declared.rbac.unwrap_or_default())
}

#[derive(serde::Deserialize)]
struct YamlPolicyDeclaration {
    #[serde(default)]
    rbac: Option<policy::rbac::RbacConfig>,
}
