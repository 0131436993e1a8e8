//! Actor-aware HIPAA policy. This is an illustrative ruleset encoding
//! common PHI-access rules, not a certified compliance product.

use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashSet;

use crate::error::GovernanceResult;

use super::{Decision, Obligation, Policy, PolicyContext};

const CITATION_PRIVACY_RULE: &str = "45 CFR 164.502";
const CITATION_MINIMUM_NECESSARY: &str = "45 CFR 164.502(b)";
const CITATION_INTEGRITY: &str = "45 CFR 164.312(c)(1)";
const CITATION_PSYCHOTHERAPY_NOTES: &str = "45 CFR 164.508(a)(2)";
const CITATION_MARKETING: &str = "45 CFR 164.508(a)(3)";
const CITATION_RESTRICTION: &str = "45 CFR 164.522(a)";
const CITATION_EMERGENCY: &str = "45 CFR 164.510";
const CITATION_ACCESS_RIGHT: &str = "45 CFR 164.524";

#[derive(Default)]
pub struct HipaaPolicy;

impl HipaaPolicy {
    pub fn new() -> Self {
        Self
    }

    fn minimum_necessary_ok(&self, context: &PolicyContext, permitted: &HashSet<&str>) -> bool {
        if context.purpose.as_deref() == Some("treatment") {
            return true;
        }
        let requested: Vec<&str> = context
            .resource
            .get("data_elements")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|e| e.as_str()).collect())
            .unwrap_or_default();
        if permitted.contains("full_record") {
            return true;
        }
        requested.iter().all(|r| permitted.contains(r))
    }
}

impl Policy for HipaaPolicy {
    fn name(&self) -> &str {
        "hipaa"
    }

    fn evaluate(&self, context: &PolicyContext) -> GovernanceResult<Decision> {
        let proof_base = |citation: &str| json!({"policy": "hipaa", "citation": citation});

        if !context.resource_bool("is_phi") {
            return Ok(Decision::allow("resource is not PHI; HIPAA policy does not apply"));
        }

        if context.extra.get("is_emergency_access").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Ok(Decision::allow("emergency access")
                .with_obligation(Obligation::new("audit_log", "log emergency access for retrospective review"))
                .with_obligation(Obligation::new("follow_up", "schedule a compliance follow-up review"))
                .with_proof(proof_base(CITATION_EMERGENCY)));
        }

        let patient = context.extra.get("patient").cloned().unwrap_or(json!({}));
        if patient.get("has_restriction").and_then(|v| v.as_bool()).unwrap_or(false) {
            let restriction = patient.get("restriction_details").cloned().unwrap_or(json!({}));
            let restricted_action = restriction.get("action").and_then(|v| v.as_str());
            let restricted_recipient = restriction.get("recipient").and_then(|v| v.as_str());
            let recipient_id = context
                .extra
                .get("recipient")
                .and_then(|r| r.get("id"))
                .and_then(|v| v.as_str());
            let matches_action = restricted_action.map(|a| a == context.action).unwrap_or(false);
            let matches_recipient = restricted_recipient == recipient_id;
            if matches_action && matches_recipient {
                return Ok(Decision::deny("patient has an active restriction on this disclosure")
                    .with_proof(proof_base(CITATION_RESTRICTION)));
            }
        }

        if patient.get("is_deceased").and_then(|v| v.as_bool()).unwrap_or(false) {
            if let Some(dod) = patient.get("date_of_death").and_then(|v| v.as_str()) {
                if let Ok(dod) = dod.parse::<chrono::DateTime<Utc>>() {
                    if Utc::now() > dod + Duration::days(50 * 365) {
                        return Ok(Decision::allow("no longer PHI: 50 years since date of death")
                            .with_proof(proof_base(CITATION_PRIVACY_RULE)));
                    }
                }
            }
        }

        let authorization_present = context
            .extra
            .get("request")
            .and_then(|r| r.get("authorization_present"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let purpose = context.purpose.as_deref().unwrap_or("");

        if context.resource_str("type") == Some("psychotherapy_notes")
            && purpose != "treatment"
            && !authorization_present
        {
            return Ok(Decision::deny("psychotherapy notes require authorization outside of treatment")
                .with_proof(proof_base(CITATION_PSYCHOTHERAPY_NOTES)));
        }
        if matches!(purpose, "marketing" | "sale_of_phi") && !authorization_present {
            return Ok(Decision::deny("marketing and sale of PHI require authorization")
                .with_proof(proof_base(CITATION_MARKETING)));
        }

        let roles = context.user_roles();
        let is_clinical = context.resource_bool("is_clinical");

        if roles.iter().any(|r| r == "provider" || r == "admin") {
            let permitted: HashSet<&str> = ["full_record"].into_iter().collect();
            if !self.minimum_necessary_ok(context, &permitted) {
                return Ok(Decision::deny("requested data elements exceed minimum necessary")
                    .with_proof(proof_base(CITATION_MINIMUM_NECESSARY)));
            }
            let mut decision = Decision::allow("provider access granted")
                .with_obligation(Obligation::audit_log())
                .with_proof(proof_base(CITATION_PRIVACY_RULE));
            if context.action == "disclose" {
                decision = decision.with_obligation(Obligation::new(
                    "transmission_security",
                    "use an encrypted transmission channel for this disclosure",
                ));
            }
            return Ok(decision);
        }

        if roles.iter().any(|r| r == "payee") {
            if is_clinical && matches!(context.action.as_str(), "write" | "delete") {
                return Ok(Decision::deny("payee cannot modify clinical data")
                    .with_proof(proof_base(CITATION_INTEGRITY)));
            }
            let permitted: HashSet<&str> =
                ["demographics", "billing_codes", "dates_of_service", "insurance_info"].into_iter().collect();
            if !self.minimum_necessary_ok(context, &permitted) {
                return Ok(Decision::deny("requested data elements exceed minimum necessary")
                    .with_proof(proof_base(CITATION_MINIMUM_NECESSARY)));
            }
            let mut decision = Decision::allow("payee access granted")
                .with_obligation(Obligation::audit_log())
                .with_proof(proof_base(CITATION_PRIVACY_RULE));
            if context.action == "export" {
                decision = decision.with_obligation(Obligation::new(
                    "encryption",
                    "encrypt exported data at rest and in transit",
                ));
            }
            return Ok(decision);
        }

        if roles.iter().any(|r| r == "patient") {
            let patient_id = patient.get("id").and_then(|v| v.as_str());
            if context.user_id() != patient_id {
                return Ok(Decision::deny("patient may only access their own record")
                    .with_proof(proof_base(CITATION_ACCESS_RIGHT)));
            }
            let mut decision = Decision::allow("patient self-access granted")
                .with_obligation(Obligation::audit_log())
                .with_proof(proof_base(CITATION_ACCESS_RIGHT));
            if context.action == "export" {
                decision = decision.with_obligation(Obligation::new(
                    "encryption",
                    "encrypt exported data at rest and in transit",
                ));
            }
            return Ok(decision);
        }

        Ok(Decision::deny("no recognized HIPAA role").with_proof(proof_base(CITATION_PRIVACY_RULE)))
    }
}
