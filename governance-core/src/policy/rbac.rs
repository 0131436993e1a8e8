//! Role-based access control: permission grant, ownership/visibility/
//! explicit-grant resource scoping, and transitive role hierarchy.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};

use crate::error::GovernanceResult;

use super::{Decision, Obligation, Policy, PolicyContext};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoleDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RbacConfig {
    #[serde(default)]
    pub roles: HashMap<String, RoleDefinition>,
    /// permission -> action synonyms it also covers.
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
    /// role -> roles it transitively inherits from.
    #[serde(default)]
    pub role_hierarchy: HashMap<String, Vec<String>>,
}

pub struct RbacPolicy {
    config: RbacConfig,
}

impl RbacPolicy {
    pub fn new(config: RbacConfig) -> Self {
        Self { config }
    }

    fn expand_roles(&self, roles: &[String]) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = roles.to_vec();
        while let Some(role) = stack.pop() {
            if seen.insert(role.clone()) {
                if let Some(parents) = self.config.role_hierarchy.get(&role) {
                    stack.extend(parents.iter().cloned());
                }
            }
        }
        seen
    }

    fn collect_permissions(&self, roles: &HashSet<String>) -> HashSet<String> {
        roles
            .iter()
            .filter_map(|r| self.config.roles.get(r))
            .flat_map(|def| def.permissions.iter().cloned())
            .collect()
    }

    fn permits_action(&self, permissions: &HashSet<String>, action: &str) -> bool {
        if permissions.contains("*") {
            return true;
        }
        if permissions.contains(action) {
            return true;
        }
        permissions.iter().any(|perm| {
            self.config
                .permissions
                .get(perm)
                .map(|synonyms| synonyms.iter().any(|s| s == action))
                .unwrap_or(false)
        })
    }
}

impl Policy for RbacPolicy {
    fn name(&self) -> &str {
        "rbac"
    }

    fn evaluate(&self, context: &PolicyContext) -> GovernanceResult<Decision> {
        let user_roles = context.user_roles();
        if user_roles.is_empty() {
            return Ok(Decision::deny("no assigned roles").with_proof(json!({
                "user_roles": user_roles,
            })));
        }

        let expanded_roles = self.expand_roles(&user_roles);
        let permissions = self.collect_permissions(&expanded_roles);
        let permission_check = self.permits_action(&permissions, &context.action);

        if !permission_check {
            return Ok(Decision::deny(format!(
                "role set does not grant action '{}'",
                context.action
            ))
            .with_proof(json!({
                "user_roles": user_roles,
                "user_permissions": permissions.iter().collect::<Vec<_>>(),
                "action": context.action,
                "permission_check": false,
            })));
        }

        let owner = context.resource_str("owner");
        let is_owner = matches!((owner, context.user_id()), (Some(o), Some(u)) if o == u);
        let is_admin = expanded_roles.contains("admin");
        let visibility = context.resource_str("visibility").unwrap_or("private");
        let publicly_visible = matches!(visibility, "public" | "shared");

        let explicit_grant = context
            .resource
            .get("permissions")
            .and_then(|v| v.as_object())
            .and_then(|map| context.user_id().and_then(|u| map.get(u)))
            .and_then(|v| v.as_array())
            .map(|granted| {
                granted.iter().any(|g| g.as_str() == Some("*") || g.as_str() == Some(context.action.as_str()))
            })
            .unwrap_or(false);

        let ownership_check = is_owner || is_admin || publicly_visible || explicit_grant;

        if !ownership_check {
            return Ok(Decision::deny("resource scope does not permit this actor").with_proof(json!({
                "user_roles": user_roles,
                "user_permissions": permissions.iter().collect::<Vec<_>>(),
                "action": context.action,
                "permission_check": true,
                "ownership_check": false,
            })));
        }

        let mut decision = Decision::allow("rbac grants access").with_proof(json!({
            "user_roles": user_roles,
            "user_permissions": permissions.iter().collect::<Vec<_>>(),
            "action": context.action,
            "permission_check": true,
            "ownership_check": true,
        }));
        if is_admin {
            decision = decision.with_obligation(Obligation::audit_log());
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> RbacConfig {
        let mut roles = HashMap::new();
        roles.insert(
            "admin".to_string(),
            RoleDefinition { description: "admin".into(), permissions: vec!["*".into()] },
        );
        roles.insert(
            "editor".to_string(),
            RoleDefinition { description: "editor".into(), permissions: vec!["edit_docs".into()] },
        );
        let mut permissions = HashMap::new();
        permissions.insert("edit_docs".to_string(), vec!["update".to_string(), "write".to_string()]);
        RbacConfig { roles, permissions, role_hierarchy: HashMap::new() }
    }

    #[test]
    fn s3_admin_delete_allows_with_audit_obligation() {
        let policy = RbacPolicy::new(config());
        let context = PolicyContext::new("delete")
            .with_user(json!({"id": "admin", "roles": ["admin"]}))
            .with_resource(json!({"type": "user_data", "id": "u1", "owner": "admin", "visibility": "private"}));
        let decision = policy.evaluate(&context).unwrap();
        assert!(decision.allow);
        assert!(decision.obligations.iter().any(|o| o.kind == "audit_log"));
        assert_eq!(decision.proof["permission_check"], json!(true));
    }

    #[test]
    fn empty_roles_denies() {
        let policy = RbacPolicy::new(config());
        let context = PolicyContext::new("read").with_user(json!({"id": "x", "roles": []}));
        let decision = policy.evaluate(&context).unwrap();
        assert!(!decision.allow);
        assert_eq!(decision.reason, "no assigned roles");
    }

    #[test]
    fn permission_synonym_grants_action() {
        let policy = RbacPolicy::new(config());
        let context = PolicyContext::new("write")
            .with_user(json!({"id": "e1", "roles": ["editor"]}))
            .with_resource(json!({"owner": "e1"}));
        let decision = policy.evaluate(&context).unwrap();
        assert!(decision.allow);
    }

    #[test]
    fn non_owner_without_scope_is_denied() {
        let policy = RbacPolicy::new(config());
        let context = PolicyContext::new("write")
            .with_user(json!({"id": "e1", "roles": ["editor"]}))
            .with_resource(json!({"owner": "someone-else", "visibility": "private"}));
        let decision = policy.evaluate(&context).unwrap();
        assert!(!decision.allow);
    }

    #[test]
    fn public_resource_is_accessible_without_ownership() {
        let policy = RbacPolicy::new(config());
        let context = PolicyContext::new("write")
            .with_user(json!({"id": "e1", "roles": ["editor"]}))
            .with_resource(json!({"owner": "someone-else", "visibility": "public"}));
        let decision = policy.evaluate(&context).unwrap();
        assert!(decision.allow);
    }
}
