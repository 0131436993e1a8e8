//! Built-in monitors: policy-derived violations, ledger integrity, and
//! behavioral anomaly detection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Timelike, Utc};
use serde_json::json;

use crate::error::GovernanceResult;
use crate::ledger::LedgerStore;

use super::{ActionContext, Finding, FindingKind, Monitor, Severity};

const HISTORY_LIMIT: usize = 1000;
const RATE_LIMIT_WINDOW_SECS: i64 = 5 * 60;
const RATE_LIMIT_THRESHOLD: usize = 3;

/// Flags admin access from guest actors, actors racking up violations, and
/// access to resources flagged "sensitive" without authorization.
pub struct PolicyMonitor {
    history: Mutex<VecDeque<Finding>>,
    violation_times: Mutex<HashMap<String, VecDeque<chrono::DateTime<Utc>>>>,
}

impl Default for PolicyMonitor {
    fn default() -> Self {
        Self { history: Mutex::new(VecDeque::new()), violation_times: Mutex::new(HashMap::new()) }
    }
}

impl PolicyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, finding: Finding) {
        let mut history = self.history.lock().expect("policy monitor history poisoned");
        history.push_back(finding);
        if history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    /// Count of this actor's violations recorded within the rate-limit
    /// window, pruning stale entries in the same pass.
    fn recent_violation_count(&self, actor_id: &str) -> usize {
        let mut times = self.violation_times.lock().expect("policy monitor counters poisoned");
        let window = times.entry(actor_id.to_string()).or_default();
        let cutoff = Utc::now() - Duration::seconds(RATE_LIMIT_WINDOW_SECS);
        while window.front().map(|t| *t < cutoff).unwrap_or(false) {
            window.pop_front();
        }
        window.len()
    }

    fn note_violation(&self, actor_id: &str) {
        let mut times = self.violation_times.lock().expect("policy monitor counters poisoned");
        times.entry(actor_id.to_string()).or_default().push_back(Utc::now());
    }
}

impl Monitor for PolicyMonitor {
    fn name(&self) -> &str {
        "policy_monitor"
    }

    fn check(&self, context: &ActionContext) -> GovernanceResult<Vec<Finding>> {
        let mut findings = Vec::new();

        if context.action_type == "admin_access" && context.actor_id.starts_with("guest") {
            findings.push(Finding {
                kind: FindingKind::Violation,
                severity: Severity::High,
                code: "guest_admin_access".into(),
                message: format!("guest actor '{}' attempted admin access", context.actor_id),
                metadata: json!({"actor_id": context.actor_id}),
            });
        }

        let authorized = context.metadata.get("authorized").and_then(|v| v.as_bool()).unwrap_or(false);
        if context.resource_id.as_deref().map(|r| r.contains("sensitive")).unwrap_or(false) && !authorized {
            findings.push(Finding {
                kind: FindingKind::Violation,
                severity: Severity::Critical,
                code: "unauthorized_sensitive_access".into(),
                message: "access to a sensitive resource without authorization".into(),
                metadata: json!({"resource_id": context.resource_id}),
            });
        }

        let recent_violation_count = self.recent_violation_count(&context.actor_id);
        if recent_violation_count >= RATE_LIMIT_THRESHOLD {
            findings.push(Finding {
                kind: FindingKind::Violation,
                severity: Severity::Medium,
                code: "rate_limit".into(),
                message: format!("actor '{}' has {} recorded violations in the last 5 minutes", context.actor_id, recent_violation_count),
                metadata: json!({"actor_id": context.actor_id, "count": recent_violation_count}),
            });
        }

        for finding in &findings {
            if finding.kind == FindingKind::Violation {
                self.note_violation(&context.actor_id);
            }
            self.record(finding.clone());
        }

        Ok(findings)
    }

    fn stats(&self) -> Option<serde_json::Value> {
        let history = self.history.lock().expect("policy monitor history poisoned");
        let violation_times = self.violation_times.lock().expect("policy monitor counters poisoned");
        let recent_violations: HashMap<String, usize> =
            violation_times.iter().map(|(actor, times)| (actor.clone(), times.len())).collect();
        Some(json!({
            "history_len": history.len(),
            "recent_violations_by_actor": recent_violations,
        }))
    }
}

/// Consults the ledger's own integrity checks.
pub struct LedgerMonitor {
    ledger: Arc<LedgerStore>,
}

impl LedgerMonitor {
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }
}

impl Monitor for LedgerMonitor {
    fn name(&self) -> &str {
        "ledger_monitor"
    }

    fn check(&self, _context: &ActionContext) -> GovernanceResult<Vec<Finding>> {
        let mut findings = Vec::new();

        match self.ledger.verify_chain_integrity(1, None) {
            Ok(true) => {}
            Ok(false) => findings.push(Finding {
                kind: FindingKind::Violation,
                severity: Severity::Critical,
                code: "chain_integrity_broken".into(),
                message: "ledger chain integrity check failed".into(),
                metadata: json!({}),
            }),
            Err(e) => findings.push(Finding {
                kind: FindingKind::Violation,
                severity: Severity::Medium,
                code: "integrity_check_error".into(),
                message: format!("chain integrity check raised an error: {e}"),
                metadata: json!({}),
            }),
        }

        match self.ledger.get_ledger_statistics() {
            Ok(stats) if stats.total_entries > 0 && stats.total_blocks == 0 => {
                findings.push(Finding {
                    kind: FindingKind::Violation,
                    severity: Severity::High,
                    code: "no_blocks_for_entries".into(),
                    message: "entries exist but no blocks have been created".into(),
                    metadata: json!({"total_entries": stats.total_entries}),
                });
            }
            Ok(_) => {}
            Err(e) => findings.push(Finding {
                kind: FindingKind::Violation,
                severity: Severity::Medium,
                code: "integrity_check_error".into(),
                message: format!("ledger statistics raised an error: {e}"),
                metadata: json!({}),
            }),
        }

        Ok(findings)
    }
}

#[derive(Default)]
struct ActorPattern {
    action_counts: HashMap<String, u64>,
    resource_access_counts: HashMap<String, u64>,
    recent_session_times: VecDeque<chrono::DateTime<Utc>>,
    last_seen: Option<chrono::DateTime<Utc>>,
}

const SESSION_HISTORY_LIMIT: usize = 100;
const HIGH_FREQUENCY_WINDOW_SECS: i64 = 5 * 60;
const HIGH_FREQUENCY_THRESHOLD: usize = 20;
const UNUSUAL_TIMING_SEEN_THRESHOLD: u64 = 5;

/// Behavioral baseline tracker, per-actor and global.
pub struct AnomalyDetector {
    patterns: Mutex<HashMap<String, ActorPattern>>,
    global_action_frequency: Mutex<HashMap<String, u64>>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self { patterns: Mutex::new(HashMap::new()), global_action_frequency: Mutex::new(HashMap::new()) }
    }
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Monitor for AnomalyDetector {
    fn name(&self) -> &str {
        "anomaly_detector"
    }

    fn check(&self, context: &ActionContext) -> GovernanceResult<Vec<Finding>> {
        let mut findings = Vec::new();
        let now = context.timestamp;

        let mut patterns = self.patterns.lock().expect("anomaly detector patterns poisoned");
        let pattern = patterns.entry(context.actor_id.clone()).or_default();

        pattern.recent_session_times.push_back(now);
        while pattern.recent_session_times.len() > SESSION_HISTORY_LIMIT {
            pattern.recent_session_times.pop_front();
        }
        let cutoff = now - Duration::seconds(HIGH_FREQUENCY_WINDOW_SECS);
        let recent_count = pattern.recent_session_times.iter().filter(|t| **t >= cutoff).count();
        if recent_count > HIGH_FREQUENCY_THRESHOLD {
            findings.push(Finding {
                kind: FindingKind::Anomaly,
                severity: Severity::Medium,
                code: "high_frequency".into(),
                message: format!("actor '{}' performed {} actions in the last 5 minutes", context.actor_id, recent_count),
                metadata: json!({"count": recent_count}),
            });
        }

        let action_seen_count = *pattern.action_counts.get(&context.action_type).unwrap_or(&0);
        let hour = now.hour();
        if (hour >= 22 || hour < 6) && action_seen_count < UNUSUAL_TIMING_SEEN_THRESHOLD {
            findings.push(Finding {
                kind: FindingKind::Anomaly,
                severity: Severity::Low,
                code: "unusual_timing".into(),
                message: format!("action '{}' outside normal hours for this actor", context.action_type),
                metadata: json!({"hour": hour}),
            });
        }

        if let Some(resource_id) = &context.resource_id {
            let prior = *pattern.resource_access_counts.get(resource_id).unwrap_or(&0);
            let counter = pattern.resource_access_counts.entry(resource_id.clone()).or_insert(0);
            *counter += 1;
            if prior == 0 {
                findings.push(Finding {
                    kind: FindingKind::Anomaly,
                    severity: Severity::Low,
                    code: "new_resource_access".into(),
                    message: format!("first access by '{}' to resource '{}'", context.actor_id, resource_id),
                    metadata: json!({"resource_id": resource_id}),
                });
            }
        }

        if matches!(context.action_type.as_str(), "admin_access" | "root_access" | "privilege_escalation")
            && action_seen_count == 0
        {
            findings.push(Finding {
                kind: FindingKind::Anomaly,
                severity: Severity::High,
                code: "privilege_escalation".into(),
                message: format!("first occurrence of '{}' for actor '{}'", context.action_type, context.actor_id),
                metadata: json!({"action_type": context.action_type}),
            });
        }

        *pattern.action_counts.entry(context.action_type.clone()).or_insert(0) += 1;
        pattern.last_seen = Some(now);
        drop(patterns);

        *self.global_action_frequency.lock().expect("global frequency poisoned").entry(context.action_type.clone()).or_insert(0) += 1;

        Ok(findings)
    }

    fn stats(&self) -> Option<serde_json::Value> {
        let patterns = self.patterns.lock().expect("anomaly detector patterns poisoned");
        let global = self.global_action_frequency.lock().expect("global frequency poisoned");
        Some(json!({
            "tracked_actors": patterns.len(),
            "global_action_frequency": *global,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_admin_access_is_flagged_high() {
        let monitor = PolicyMonitor::new();
        let ctx = ActionContext::new("guest-42", "admin_access");
        let findings = monitor.check(&ctx).unwrap();
        assert!(findings.iter().any(|f| f.code == "guest_admin_access" && f.severity == Severity::High));
    }

    #[test]
    fn sensitive_resource_without_authorization_is_critical() {
        let monitor = PolicyMonitor::new();
        let ctx = ActionContext::new("user-1", "read").with_resource("sensitive-file-1");
        let findings = monitor.check(&ctx).unwrap();
        assert!(findings.iter().any(|f| f.code == "unauthorized_sensitive_access" && f.severity == Severity::Critical));
    }

    #[test]
    fn rate_limit_triggers_after_three_violations() {
        let monitor = PolicyMonitor::new();
        for _ in 0..3 {
            monitor.check(&ActionContext::new("guest-rep", "admin_access")).unwrap();
        }
        let findings = monitor.check(&ActionContext::new("guest-rep", "admin_access")).unwrap();
        assert!(findings.iter().any(|f| f.code == "rate_limit"));
    }

    #[test]
    fn first_privilege_escalation_is_flagged() {
        let monitor = AnomalyDetector::new();
        let ctx = ActionContext::new("actor-y", "admin_access");
        let findings = monitor.check(&ctx).unwrap();
        assert!(findings.iter().any(|f| f.code == "privilege_escalation"));
        let findings2 = monitor.check(&ActionContext::new("actor-y", "admin_access")).unwrap();
        assert!(!findings2.iter().any(|f| f.code == "privilege_escalation"));
    }

    #[test]
    fn new_resource_access_flagged_once() {
        let monitor = AnomalyDetector::new();
        let ctx = ActionContext::new("actor-z", "read").with_resource("doc-1");
        let findings = monitor.check(&ctx).unwrap();
        assert!(findings.iter().any(|f| f.code == "new_resource_access"));
        let findings2 = monitor.check(&ActionContext::new("actor-z", "read").with_resource("doc-1")).unwrap();
        assert!(!findings2.iter().any(|f| f.code == "new_resource_access"));
    }

    #[test]
    fn ledger_monitor_flags_broken_chain() {
        let store = Arc::new(LedgerStore::open_in_memory(10).unwrap());
        store.append_event(crate::ledger::LedgerEvent::new(crate::ledger::EventType::ToolCall, "a", "call")).unwrap();
        let monitor = LedgerMonitor::new(store.clone());
        assert!(monitor.check(&ActionContext::new("a", "call")).unwrap().is_empty());
    }
}
