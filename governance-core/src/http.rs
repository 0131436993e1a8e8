//! Thin HTTP route table. The hosting server's transport layer lives
//! elsewhere; this module only maps parsed requests to governance-core
//! operations and JSON responses.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::contract::{CreateContractRequest, ProposeRequest, RevokeRequest, SignRequest};
use crate::error::GovernanceError;
use crate::ledger::LedgerEvent;
use crate::policy::PolicyContext;
use crate::reflexive::ActionContext;
use crate::GovernanceCore;

/// A parsed HTTP request: method/path already routed, body decoded to JSON.
pub struct Request {
    pub path_params: Vec<String>,
    pub query: Value,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn created(body: Value) -> Self {
        Self { status: 201, body }
    }

    fn accepted(body: Value) -> Self {
        Self { status: 202, body }
    }

    fn error(status: u16, error: &str, reason: Option<String>) -> Self {
        Self { status, body: json!({"error": error, "reason": reason}) }
    }
}

impl From<GovernanceError> for Response {
    fn from(e: GovernanceError) -> Self {
        Response::error(e.status_code(), "governance_error", Some(e.to_string()))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| Response::error(400, "invalid_input", Some(format!("not a UUID: {raw}"))))
}

/// POST /policy/evaluate
pub fn policy_evaluate(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(context) = serde_json::from_value::<PolicyContext>(req.body["context"].clone()) else {
        return Response::error(400, "invalid_input", Some("malformed policy context".into()));
    };
    let names: Option<Vec<String>> = req
        .body
        .get("policy_names")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    let decision = core.policies.evaluate(&context, names.as_deref());
    Response::ok(json!(decision))
}

/// POST /contracts
pub fn contracts_create(core: &GovernanceCore, req: &Request) -> Response {
    let request: Result<CreateContractRequest, _> = (|| {
        Ok::<_, serde_json::Error>(CreateContractRequest {
            title: req.body["title"].as_str().unwrap_or_default().to_string(),
            description: req.body["description"].as_str().unwrap_or_default().to_string(),
            clauses: serde_json::from_value(req.body["clauses"].clone()).unwrap_or_default(),
            parties: serde_json::from_value(req.body["parties"].clone())?,
            expires_at: serde_json::from_value(req.body["expires_at"].clone()).unwrap_or(None),
            metadata: req.body["metadata"].clone(),
            hipaa_entities: serde_json::from_value(req.body["hipaa_entities"].clone()).unwrap_or_default(),
        })
    })();
    let created_by = req.body["created_by"].as_str().unwrap_or("unknown").to_string();
    match request {
        Ok(request) => match core.contracts.create(request, created_by) {
            Ok(contract) => Response::created(json!(contract)),
            Err(e) => e.into(),
        },
        Err(e) => Response::error(400, "invalid_input", Some(e.to_string())),
    }
}

/// GET /contracts
pub fn contracts_list(core: &GovernanceCore, req: &Request) -> Response {
    let state = req
        .query
        .get("state")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_value(json!(s)).ok());
    let created_by = req.query.get("created_by").and_then(|v| v.as_str());
    match core.contracts.list(state, created_by) {
        Ok(contracts) => Response::ok(json!(contracts)),
        Err(e) => e.into(),
    }
}

/// GET /contracts/statistics
pub fn contracts_statistics(core: &GovernanceCore) -> Response {
    match core.contracts.statistics() {
        Ok(stats) => Response::ok(json!(stats)),
        Err(e) => e.into(),
    }
}

/// GET /contracts/{id}
pub fn contracts_get(core: &GovernanceCore, req: &Request) -> Response {
    let id = match parse_uuid(&req.path_params[0]) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match core.contracts.get(id) {
        Ok(Some(contract)) => Response::ok(json!(contract)),
        Ok(None) => Response::error(404, "not_found", Some(format!("contract {id}"))),
        Err(e) => e.into(),
    }
}

/// POST /contracts/{id}/propose
pub fn contracts_propose(core: &GovernanceCore, req: &Request) -> Response {
    let id = match parse_uuid(&req.path_params[0]) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let request = ProposeRequest {
        proposed_to: serde_json::from_value(req.body["proposed_to"].clone()).unwrap_or_default(),
        message: req.body["message"].as_str().unwrap_or_default().to_string(),
    };
    let proposed_by = req.body["proposed_by"].as_str().unwrap_or("unknown");
    match core.contracts.propose(id, request, proposed_by) {
        Ok(contract) => Response::ok(json!(contract)),
        Err(e) => e.into(),
    }
}

/// POST /contracts/{id}/sign
pub fn contracts_sign(core: &GovernanceCore, req: &Request) -> Response {
    let id = match parse_uuid(&req.path_params[0]) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let request = SignRequest {
        signer_id: req.body["signer_id"].as_str().unwrap_or_default().to_string(),
        signer_type: req.body["signer_type"].as_str().unwrap_or_default().to_string(),
        signature: req.body["signature"].as_str().unwrap_or_default().to_string(),
        public_key: req.body["public_key"].as_str().unwrap_or_default().to_string(),
        metadata: req.body["metadata"].clone(),
    };
    match core.contracts.sign(id, request) {
        Ok(contract) => Response::ok(json!(contract)),
        Err(e) => e.into(),
    }
}

/// POST /contracts/{id}/revoke
pub fn contracts_revoke(core: &GovernanceCore, req: &Request) -> Response {
    let id = match parse_uuid(&req.path_params[0]) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let request = RevokeRequest { reason: req.body["reason"].as_str().unwrap_or_default().to_string() };
    match core.contracts.revoke(id, request) {
        Ok(contract) => Response::ok(json!(contract)),
        Err(e) => e.into(),
    }
}

/// POST /ledger/events
pub fn ledger_append(core: &GovernanceCore, req: &Request) -> Response {
    let event: Result<LedgerEvent, _> = serde_json::from_value(req.body.clone());
    match event {
        Ok(event) => match core.ledger.append_event(event) {
            Ok(entry) => Response::created(json!(entry)),
            Err(e) => e.into(),
        },
        Err(e) => Response::error(400, "invalid_input", Some(e.to_string())),
    }
}

/// GET /ledger/entries/{seq}
pub fn ledger_get_entry(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(seq) = req.path_params[0].parse::<u64>() else {
        return Response::error(400, "invalid_input", Some("sequence must be a non-negative integer".into()));
    };
    match core.ledger.get_entry(seq) {
        Ok(Some(entry)) => Response::ok(json!(entry)),
        Ok(None) => Response::error(404, "not_found", Some(format!("entry {seq}"))),
        Err(e) => e.into(),
    }
}

/// GET /ledger/blocks/{n}
pub fn ledger_get_block(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(n) = req.path_params[0].parse::<u64>() else {
        return Response::error(400, "invalid_input", Some("block number must be a non-negative integer".into()));
    };
    let block = match core.ledger.get_block(n) {
        Ok(Some(b)) => b,
        Ok(None) => return Response::error(404, "not_found", Some(format!("block {n}"))),
        Err(e) => return e.into(),
    };
    match core.ledger.get_block_entries(n) {
        Ok(entries) => Response::ok(json!({"block": block, "entries": entries})),
        Err(e) => e.into(),
    }
}

/// GET /ledger/verify/{n}
pub fn ledger_verify_block(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(n) = req.path_params[0].parse::<u64>() else {
        return Response::error(400, "invalid_input", Some("block number must be a non-negative integer".into()));
    };
    match core.ledger.verify_block_integrity(n) {
        Ok(verified) => Response::ok(json!({"block_number": n, "verified": verified})),
        Err(e) => e.into(),
    }
}

/// GET /ledger/verify-chain
pub fn ledger_verify_chain(core: &GovernanceCore, req: &Request) -> Response {
    let start = req.query.get("start_sequence").and_then(|v| v.as_u64()).unwrap_or(1);
    let end = req.query.get("end_sequence").and_then(|v| v.as_u64());
    match core.ledger.verify_chain_integrity(start, end) {
        Ok(verified) => Response::ok(json!({"start_sequence": start, "end_sequence": end, "verified": verified})),
        Err(e) => e.into(),
    }
}

/// GET /ledger/proof/{seq}
pub fn ledger_get_proof(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(seq) = req.path_params[0].parse::<u64>() else {
        return Response::error(400, "invalid_input", Some("sequence must be a non-negative integer".into()));
    };
    match core.ledger.get_proof(seq) {
        Ok(Some(proof)) => Response::ok(json!(proof)),
        Ok(None) => Response::error(404, "not_found", Some(format!("no proof for sequence {seq}"))),
        Err(e) => e.into(),
    }
}

/// GET /ledger/statistics
pub fn ledger_statistics(core: &GovernanceCore) -> Response {
    match core.ledger.get_ledger_statistics() {
        Ok(stats) => Response::ok(json!(stats)),
        Err(e) => e.into(),
    }
}

/// POST /core/simulate-risk
pub fn core_simulate_risk(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(context) = serde_json::from_value::<ActionContext>(req.body["action_context"].clone()) else {
        return Response::error(400, "invalid_input", Some("malformed action_context".into()));
    };
    let decision = core.reflexive.evaluate(&context);
    let action = crate::reflexive::actions::build_action(&decision);
    let result = action.execute();
    Response::ok(json!({"decision": decision, "action": result}))
}

/// GET /core/status
pub fn core_status(core: &GovernanceCore) -> Response {
    let ledger_stats = core.ledger.get_ledger_statistics().ok();
    let contract_stats = core.contracts.statistics().ok();
    Response::ok(json!({
        "policies": core.policies.registered_names(),
        "ledger": ledger_stats,
        "contracts": contract_stats,
    }))
}

/// GET /core/monitor-stats
pub fn core_monitor_stats(core: &GovernanceCore) -> Response {
    Response::ok(core.reflexive.monitor_stats())
}

/// POST /core/submit-action
pub fn core_submit_action(core: &GovernanceCore, req: &Request) -> Response {
    let Ok(context) = serde_json::from_value::<ActionContext>(req.body.clone()) else {
        return Response::error(400, "invalid_input", Some("malformed action context".into()));
    };
    match core.reflexive.submit_action(context) {
        Ok(()) => Response::accepted(json!({"status": "enqueued"})),
        Err(e) => e.into(),
    }
}

/// POST /core/risk-scenario
///
/// Synthesizes a named scenario into an ActionContext and evaluates it
/// without enqueuing, so callers can preview a decision.
pub fn core_risk_scenario(core: &GovernanceCore, req: &Request) -> Response {
    let Some(scenario) = req.body["scenario"].as_str() else {
        return Response::error(400, "invalid_input", Some("missing 'scenario'".into()));
    };
    let context = match scenario {
        "guest_admin_access" => ActionContext::new("guest_user", "admin_access"),
        "sensitive_resource_access" => ActionContext::new("user", "read").with_resource("sensitive-data-1"),
        other => return Response::error(400, "invalid_input", Some(format!("unknown scenario '{other}'"))),
    };
    let decision = core.reflexive.evaluate(&context);
    Response::ok(json!(decision))
}
