//! Decision-driven actions. Each action's `execute()` is synchronous: none
//! of halt/escalate/monitor/allow does anything that blocks on I/O, so
//! there is nothing to gain from making them async.

use std::sync::Mutex;

use serde_json::{json, Value};

use super::{DecisionType, ReflexiveDecision, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

pub trait Action: Send + Sync {
    fn execute(&self) -> Value;
    fn status(&self) -> ActionStatus;
}

pub struct HaltAction {
    affected_operations: Vec<String>,
    status: Mutex<ActionStatus>,
}

impl HaltAction {
    pub fn new(decision: &ReflexiveDecision) -> Self {
        let mut affected = Vec::new();
        if let Some(resource_id) = &decision.action_context.resource_id {
            affected.push(resource_id.clone());
        }
        affected.push(decision.action_context.action_id.clone());
        Self { affected_operations: affected, status: Mutex::new(ActionStatus::Pending) }
    }
}

impl Action for HaltAction {
    fn execute(&self) -> Value {
        *self.status.lock().unwrap() = ActionStatus::Executing;
        let result = json!({
            "action": "halt",
            "affected_operations": self.affected_operations,
        });
        *self.status.lock().unwrap() = ActionStatus::Completed;
        result
    }

    fn status(&self) -> ActionStatus {
        *self.status.lock().unwrap()
    }
}

pub struct EscalateAction {
    target: String,
    priority: String,
    context: Value,
    notification_channels: Vec<String>,
    status: Mutex<ActionStatus>,
}

impl EscalateAction {
    pub fn new(decision: &ReflexiveDecision) -> Self {
        let target = decision.escalated_to.clone().unwrap_or_else(|| "monitoring_team".to_string());
        let priority = match decision.risk_level {
            RiskLevel::Critical => "critical",
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
        .to_string();
        Self {
            target,
            priority,
            context: json!(decision.action_context),
            notification_channels: vec!["email".to_string(), "pager".to_string()],
            status: Mutex::new(ActionStatus::Pending),
        }
    }
}

impl Action for EscalateAction {
    fn execute(&self) -> Value {
        *self.status.lock().unwrap() = ActionStatus::Executing;
        let result = json!({
            "action": "escalate",
            "target": self.target,
            "priority": self.priority,
            "context": self.context,
            "notification_channels": self.notification_channels,
        });
        *self.status.lock().unwrap() = ActionStatus::Completed;
        result
    }

    fn status(&self) -> ActionStatus {
        *self.status.lock().unwrap()
    }
}

pub struct MonitorAction {
    level: String,
    duration_seconds: u64,
    scope: String,
    status: Mutex<ActionStatus>,
}

impl MonitorAction {
    pub fn new(decision: &ReflexiveDecision) -> Self {
        Self {
            level: format!("{:?}", decision.risk_level).to_uppercase(),
            duration_seconds: 300,
            scope: decision.action_context.actor_id.clone(),
            status: Mutex::new(ActionStatus::Pending),
        }
    }
}

impl Action for MonitorAction {
    fn execute(&self) -> Value {
        *self.status.lock().unwrap() = ActionStatus::Executing;
        let result = json!({
            "action": "monitor",
            "level": self.level,
            "duration_seconds": self.duration_seconds,
            "scope": self.scope,
        });
        *self.status.lock().unwrap() = ActionStatus::Completed;
        result
    }

    fn status(&self) -> ActionStatus {
        *self.status.lock().unwrap()
    }
}

pub struct AllowAction {
    conditions: Vec<String>,
    restrictions: Vec<String>,
    status: Mutex<ActionStatus>,
}

impl AllowAction {
    pub fn new(_decision: &ReflexiveDecision) -> Self {
        Self { conditions: vec![], restrictions: vec![], status: Mutex::new(ActionStatus::Pending) }
    }
}

impl Action for AllowAction {
    fn execute(&self) -> Value {
        *self.status.lock().unwrap() = ActionStatus::Executing;
        let result = json!({
            "action": "allow",
            "conditions": self.conditions,
            "restrictions": self.restrictions,
        });
        *self.status.lock().unwrap() = ActionStatus::Completed;
        result
    }

    fn status(&self) -> ActionStatus {
        *self.status.lock().unwrap()
    }
}

/// Build the right action object for a decision's type.
pub fn build_action(decision: &ReflexiveDecision) -> Box<dyn Action> {
    match decision.decision_type {
        DecisionType::Halt => Box::new(HaltAction::new(decision)),
        DecisionType::Escalate => Box::new(EscalateAction::new(decision)),
        DecisionType::Monitor => Box::new(MonitorAction::new(decision)),
        DecisionType::Allow => Box::new(AllowAction::new(decision)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflexive::{ActionContext, Evidence};

    fn decision(decision_type: DecisionType, risk_level: RiskLevel) -> ReflexiveDecision {
        ReflexiveDecision::build(
            decision_type,
            risk_level,
            ActionContext::new("actor-1", "read"),
            "test".into(),
            Evidence::default(),
            None,
        )
    }

    #[test]
    fn halt_action_completes_and_lists_affected_operations() {
        let d = decision(DecisionType::Halt, RiskLevel::Critical);
        let action = build_action(&d);
        let result = action.execute();
        assert_eq!(action.status(), ActionStatus::Completed);
        assert_eq!(result["action"], json!("halt"));
    }

    #[test]
    fn escalate_action_defaults_target_when_unset() {
        let d = decision(DecisionType::Escalate, RiskLevel::Medium);
        let action = EscalateAction::new(&d);
        let result = action.execute();
        assert_eq!(result["target"], json!("monitoring_team"));
    }

    #[test]
    fn factory_picks_action_by_decision_type() {
        for (dt, expected) in [
            (DecisionType::Halt, "halt"),
            (DecisionType::Escalate, "escalate"),
            (DecisionType::Monitor, "monitor"),
            (DecisionType::Allow, "allow"),
        ] {
            let d = decision(dt, RiskLevel::Low);
            let action = build_action(&d);
            assert_eq!(action.execute()["action"], json!(expected));
        }
    }
}
