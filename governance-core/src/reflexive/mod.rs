//! Reflexive core: the monitor/decide/act pipeline that turns actions into
//! risk-scored decisions.

pub mod actions;
pub mod engine;
pub mod monitors;

pub use engine::ReflexiveEngine;

use chrono::{DateTime, Utc};
use contract_model::hash::content_hash;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    pub action_id: String,
    pub actor_id: String,
    pub action_type: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl ActionContext {
    pub fn new(actor_id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            action_id: Uuid::new_v4().to_string(),
            actor_id: actor_id.into(),
            action_type: action_type.into(),
            resource_id: None,
            metadata: json!({}),
            timestamp: Utc::now(),
            session_id: None,
            request_id: None,
        }
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Violation,
    Anomaly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionType {
    Halt,
    Escalate,
    Monitor,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflexiveDecision {
    pub decision_id: String,
    pub decision_type: DecisionType,
    pub risk_level: RiskLevel,
    pub action_context: ActionContext,
    pub reason: String,
    pub evidence: Evidence,
    #[serde(default)]
    pub escalated_to: Option<String>,
    pub proof_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub violations: Vec<Finding>,
    pub anomalies: Vec<Finding>,
}

impl ReflexiveDecision {
    /// Assemble a decision and stamp `proof_hash` as SHA-256 over the
    /// canonicalized decision (computed with proof_hash absent).
    pub fn build(
        decision_type: DecisionType,
        risk_level: RiskLevel,
        action_context: ActionContext,
        reason: String,
        evidence: Evidence,
        escalated_to: Option<String>,
    ) -> Self {
        let decision_id = Uuid::new_v4().to_string();
        let unsigned = json!({
            "decision_id": decision_id,
            "decision_type": format!("{decision_type:?}"),
            "risk_level": format!("{risk_level:?}"),
            "action_context": action_context,
            "reason": reason,
            "evidence": evidence,
            "escalated_to": escalated_to,
        });
        let proof_hash = content_hash(&unsigned);
        Self { decision_id, decision_type, risk_level, action_context, reason, evidence, escalated_to, proof_hash }
    }
}

pub trait Monitor: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, context: &ActionContext) -> crate::error::GovernanceResult<Vec<Finding>>;

    /// Point-in-time snapshot of this monitor's internal counters, for
    /// introspection. `None` for monitors that keep no state worth reporting.
    fn stats(&self) -> Option<Value> {
        None
    }
}
