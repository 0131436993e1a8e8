//! Minimum-necessary policy: denies access to sensitive actions/resources
//! unless the request carries a sufficient justification, with a
//! privileged-actor bypass that still logs.

use chrono::Timelike;
use serde_json::json;
use std::collections::HashSet;

use crate::error::GovernanceResult;

use super::{Decision, Obligation, Policy, PolicyContext};

pub struct MinimumNecessaryConfig {
    pub sensitive_actions: HashSet<String>,
    pub sensitive_resources: HashSet<String>,
    pub required_justification: bool,
}

impl Default for MinimumNecessaryConfig {
    fn default() -> Self {
        Self {
            sensitive_actions: HashSet::new(),
            sensitive_resources: HashSet::new(),
            required_justification: false,
        }
    }
}

pub struct MinimumNecessaryPolicy {
    config: MinimumNecessaryConfig,
}

impl MinimumNecessaryPolicy {
    pub fn new(config: MinimumNecessaryConfig) -> Self {
        Self { config }
    }

    fn is_sensitive(&self, context: &PolicyContext) -> bool {
        let action_sensitive = self.config.sensitive_actions.contains(&context.action);
        let resource_sensitive = context
            .resource_str("type")
            .map(|t| self.config.sensitive_resources.contains(t))
            .unwrap_or(false);
        action_sensitive || resource_sensitive
    }
}

impl Policy for MinimumNecessaryPolicy {
    fn name(&self) -> &str {
        "minimum_necessary"
    }

    fn evaluate(&self, context: &PolicyContext) -> GovernanceResult<Decision> {
        if !self.is_sensitive(context) {
            return Ok(Decision::allow("not a sensitive action or resource"));
        }

        if self.config.required_justification {
            let len = context.justification.as_deref().unwrap_or("").len();
            if len < 10 {
                return Ok(Decision::deny("justification required")
                    .with_obligation(Obligation::new("provide_justification", "resubmit with a justification of at least 10 characters")));
            }
        }

        let roles = context.user_roles();
        let is_admin = roles.iter().any(|r| r == "admin");
        let has_privileged = context
            .user
            .get("permissions")
            .and_then(|v| v.as_array())
            .map(|perms| perms.iter().any(|p| p.as_str() == Some("privileged")))
            .unwrap_or(false);

        if is_admin || has_privileged {
            return Ok(Decision::allow("privileged actor").with_obligation(Obligation::audit_log()));
        }

        let hour = chrono::Utc::now().hour();
        let after_hours = hour >= 22 || hour < 6;
        if self.config.sensitive_actions.contains(&context.action) && after_hours {
            return Ok(Decision::deny("sensitive action outside of permitted hours")
                .with_obligation(Obligation::new("schedule_operation", "retry during the 06:00-22:00 window")));
        }

        Ok(Decision::deny("insufficient permissions")
            .with_obligation(Obligation::new("request_approval", "obtain approval before retrying")))
    }
}
