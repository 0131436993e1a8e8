//! Pluggable policy engine. A `Policy` inspects a
//! `PolicyContext` and returns a `Decision`; the `PolicyEngine` chains
//! policies in registration order and short-circuits on the first deny.

pub mod hipaa;
pub mod minimum_necessary;
pub mod rbac;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::GovernanceResult;

/// Everything a policy needs to evaluate one request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyContext {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub resource: Value,
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub extra: Value,
}

impl PolicyContext {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: Value::Null,
            user: Value::Null,
            purpose: None,
            justification: None,
            extra: Value::Null,
        }
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_user(mut self, user: Value) -> Self {
        self.user = user;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }

    pub fn user_roles(&self) -> Vec<String> {
        self.user
            .get("roles")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|r| r.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.get("id").and_then(|v| v.as_str())
    }

    pub fn resource_str(&self, field: &str) -> Option<&str> {
        self.resource.get(field).and_then(|v| v.as_str())
    }

    pub fn resource_bool(&self, field: &str) -> bool {
        self.resource.get(field).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obligation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl Obligation {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self { kind: kind.into(), description: description.into() }
    }

    pub fn audit_log() -> Self {
        Self::new("audit_log", "caller must write an audit log entry for this action")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    pub reason: String,
    #[serde(default)]
    pub proof: Value,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self { allow: true, obligations: Vec::new(), reason: reason.into(), proof: Value::Null }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allow: false, obligations: Vec::new(), reason: reason.into(), proof: Value::Null }
    }

    pub fn with_obligation(mut self, obligation: Obligation) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn with_obligations(mut self, obligations: Vec<Obligation>) -> Self {
        self.obligations.extend(obligations);
        self
    }

    pub fn with_proof(mut self, proof: Value) -> Self {
        self.proof = proof;
        self
    }
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, context: &PolicyContext) -> GovernanceResult<Decision>;
}

/// Registry of named policies plus the order they are evaluated in.
#[derive(Default)]
pub struct PolicyEngine {
    policies: HashMap<String, Box<dyn Policy>>,
    order: Vec<String>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, policy: Box<dyn Policy>) {
        let name = policy.name().to_string();
        if !self.policies.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.policies.insert(name, policy);
    }

    pub fn registered_names(&self) -> &[String] {
        &self.order
    }

    /// Evaluate `names` in order (or the full registration order if
    /// `names` is `None`). First deny wins; a policy that errors counts as
    /// a deny citing the policy name and the error.
    pub fn evaluate(&self, context: &PolicyContext, names: Option<&[String]>) -> Decision {
        let chain: Vec<&String> = match names {
            Some(n) => n.iter().collect(),
            None => self.order.iter().collect(),
        };

        let mut evaluated = Vec::new();
        for name in chain {
            let Some(policy) = self.policies.get(name) else {
                return Decision::deny(format!("unknown policy '{name}'"));
            };
            match policy.evaluate(context) {
                Ok(decision) if !decision.allow => return decision,
                Ok(decision) => evaluated.push((name.clone(), decision)),
                Err(e) => {
                    return Decision::deny(format!("policy '{name}' raised an error: {e}"));
                }
            }
        }

        Decision::allow("all policies allow").with_proof(serde_json::json!({
            "evaluated": evaluated.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
        }))
    }

    pub fn evaluate_single(&self, name: &str, context: &PolicyContext) -> GovernanceResult<Decision> {
        match self.policies.get(name) {
            Some(policy) => policy.evaluate(context),
            None => Ok(Decision::deny(format!("unknown policy '{name}'"))),
        }
    }
}
