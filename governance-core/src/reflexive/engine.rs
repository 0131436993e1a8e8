//! Reflexive engine: bounded event queue, monitor pipeline, risk
//! assessment, and action execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde_json::json;

use crate::error::{GovernanceError, GovernanceResult};
use crate::ledger::{EventType, LedgerEvent, LedgerStore};

use super::actions::build_action;
use super::{ActionContext, DecisionType, Evidence, Finding, FindingKind, Monitor, ReflexiveDecision, RiskLevel, Severity};

pub struct ReflexiveEngine {
    monitors: Mutex<Vec<Box<dyn Monitor>>>,
    sender: Sender<ActionContext>,
    receiver: Receiver<ActionContext>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ledger: Option<Arc<LedgerStore>>,
    poll_timeout: StdDuration,
}

impl ReflexiveEngine {
    pub fn new(queue_capacity: usize, poll_timeout: StdDuration, ledger: Option<Arc<LedgerStore>>) -> Self {
        let (sender, receiver) = bounded(queue_capacity.max(1));
        Self {
            monitors: Mutex::new(Vec::new()),
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            ledger,
            poll_timeout,
        }
    }

    pub fn register_monitor(&self, monitor: Box<dyn Monitor>) {
        self.monitors.lock().expect("monitor list poisoned").push(monitor);
    }

    pub fn submit_action(&self, context: ActionContext) -> GovernanceResult<()> {
        self.sender
            .try_send(context)
            .map_err(|_| GovernanceError::Persistence("reflexive queue is full".into()))
    }

    /// Spawn the processing thread if it is not already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            while engine.running.load(Ordering::SeqCst) {
                match engine.receiver.recv_timeout(engine.poll_timeout) {
                    Ok(context) => engine.process_event(context),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        *self.worker.lock().expect("worker handle poisoned") = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().expect("worker handle poisoned").take() {
            let _ = handle.join();
        }
    }

    fn process_event(&self, context: ActionContext) {
        let decision = self.evaluate(&context);
        let action = build_action(&decision);
        let _ = action.execute();
        if let Some(ledger) = &self.ledger {
            let event = LedgerEvent::new(EventType::ReflexiveDecision, context.actor_id.clone(), context.action_type.clone())
                .with_metadata(json!(decision));
            let _ = ledger.append_event(event);
        }
    }

    /// The pure monitor/decide portion of the pipeline: no ledger write,
    /// no action execution. Shared by `process_event` and `simulate_risk`.
    pub fn evaluate(&self, context: &ActionContext) -> ReflexiveDecision {
        let monitors = self.monitors.lock().expect("monitor list poisoned");
        let mut violations = Vec::new();
        let mut anomalies = Vec::new();
        for monitor in monitors.iter() {
            match monitor.check(context) {
                Ok(findings) => {
                    for finding in findings {
                        match finding.kind {
                            FindingKind::Violation => violations.push(finding),
                            FindingKind::Anomaly => anomalies.push(finding),
                        }
                    }
                }
                Err(e) => violations.push(Finding {
                    kind: FindingKind::Violation,
                    severity: Severity::Medium,
                    code: "monitor_error".into(),
                    message: format!("monitor '{}' raised an error: {e}", monitor.name()),
                    metadata: json!({}),
                }),
            }
        }
        drop(monitors);

        let risk_level = assess_risk(&violations, &anomalies);
        let total_issues = violations.len() + anomalies.len();
        let decision_type = match risk_level {
            RiskLevel::Critical | RiskLevel::High => DecisionType::Halt,
            RiskLevel::Medium => DecisionType::Escalate,
            RiskLevel::Low if total_issues > 0 => DecisionType::Monitor,
            RiskLevel::Low => DecisionType::Allow,
        };

        let escalated_to = if decision_type == DecisionType::Escalate {
            Some(
                match risk_level {
                    RiskLevel::Critical => "security_admin",
                    RiskLevel::High => "system_admin",
                    _ => "monitoring_team",
                }
                .to_string(),
            )
        } else {
            None
        };

        let reason = if total_issues == 0 {
            "no violations or anomalies detected".to_string()
        } else {
            format!("{total_issues} issue(s) detected, risk level {risk_level:?}")
        };

        ReflexiveDecision::build(
            decision_type,
            risk_level,
            context.clone(),
            reason,
            Evidence { violations, anomalies },
            escalated_to,
        )
    }

    /// Per-monitor stats snapshot, keyed by monitor name, for monitors that
    /// report one (see `Monitor::stats`).
    pub fn monitor_stats(&self) -> serde_json::Value {
        let monitors = self.monitors.lock().expect("monitor list poisoned");
        let mut out = serde_json::Map::new();
        for monitor in monitors.iter() {
            if let Some(stats) = monitor.stats() {
                out.insert(monitor.name().to_string(), stats);
            }
        }
        serde_json::Value::Object(out)
    }

    /// Swap in `monitors` for the duration of one evaluation, then restore
    /// the original list. Never writes to the ledger.
    pub fn simulate_risk(&self, context: &ActionContext, monitors: Vec<Box<dyn Monitor>>) -> ReflexiveDecision {
        let original = std::mem::replace(&mut *self.monitors.lock().expect("monitor list poisoned"), monitors);
        let decision = self.evaluate(context);
        *self.monitors.lock().expect("monitor list poisoned") = original;
        decision
    }
}

fn assess_risk(violations: &[Finding], anomalies: &[Finding]) -> RiskLevel {
    let total_issues = violations.len() + anomalies.len();
    let has_severity = |sev: Severity| violations.iter().chain(anomalies.iter()).any(|f| f.severity == sev);

    if has_severity(Severity::Critical) {
        RiskLevel::Critical
    } else if has_severity(Severity::High) || total_issues >= 5 {
        RiskLevel::High
    } else if has_severity(Severity::Medium) || total_issues >= 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflexive::monitors::PolicyMonitor;

    fn engine() -> Arc<ReflexiveEngine> {
        Arc::new(ReflexiveEngine::new(16, StdDuration::from_millis(50), None))
    }

    #[test]
    fn s6_halt_on_sensitive_access_without_authorization() {
        let e = engine();
        e.register_monitor(Box::new(PolicyMonitor::new()));
        let context = ActionContext::new("user-1", "read").with_resource("sensitive-db");
        let decision = e.evaluate(&context);
        assert_eq!(decision.decision_type, DecisionType::Halt);
        assert_eq!(decision.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn no_issues_allows() {
        let e = engine();
        e.register_monitor(Box::new(PolicyMonitor::new()));
        let context = ActionContext::new("user-1", "read");
        let decision = e.evaluate(&context);
        assert_eq!(decision.decision_type, DecisionType::Allow);
    }

    #[test]
    fn s7_simulate_risk_does_not_mutate_persistent_monitor_state() {
        let e = engine();
        e.register_monitor(Box::new(PolicyMonitor::new()));

        struct AlwaysCritical;
        impl Monitor for AlwaysCritical {
            fn name(&self) -> &str {
                "always_critical"
            }
            fn check(&self, _context: &ActionContext) -> GovernanceResult<Vec<Finding>> {
                Ok(vec![Finding {
                    kind: FindingKind::Violation,
                    severity: Severity::Critical,
                    code: "synthetic".into(),
                    message: "synthetic critical finding".into(),
                    metadata: json!({}),
                }])
            }
        }

        let context = ActionContext::new("user-1", "read");
        let simulated = e.simulate_risk(&context, vec![Box::new(AlwaysCritical)]);
        assert_eq!(simulated.risk_level, RiskLevel::Critical);

        // The real monitor list is restored; a normal evaluate() call sees no issues.
        let after = e.evaluate(&context);
        assert_eq!(after.decision_type, DecisionType::Allow);
    }

    #[test]
    fn queue_full_is_reported_as_an_error() {
        let e = engine_with_capacity(1);
        e.submit_action(ActionContext::new("a", "read")).unwrap();
        let err = e.submit_action(ActionContext::new("b", "read")).unwrap_err();
        assert!(matches!(err, GovernanceError::Persistence(_)));
    }

    fn engine_with_capacity(n: usize) -> ReflexiveEngine {
        ReflexiveEngine::new(n, StdDuration::from_millis(50), None)
    }
}
