use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use governance_core::http::{self, Request, Response};
use governance_core::{GovernanceConfig, GovernanceCore};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "governance-agent", about = "Long-running governance core process")]
struct Cli {
    /// Root directory holding config.toml, ledger.db, contracts.db.
    #[arg(long, default_value = ".")]
    root: String,
    /// Newline-delimited JSON file of request envelopes to drive through the
    /// HTTP route table each cycle. Each line: {"route", "path_params",
    /// "query", "body"}. Omit to run maintenance-only cycles.
    #[arg(long)]
    requests: Option<String>,
    /// Run one cycle then exit.
    #[arg(long)]
    once: bool,
    #[arg(long, default_value_t = 900)]
    interval_seconds: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    let root = PathBuf::from(&cli.root);

    let config = GovernanceConfig::load(&root)?;
    let core = Arc::new(GovernanceCore::open(&config)?);
    core.start();

    if cli.once {
        run_cycle(&core, cli.requests.as_deref())?;
        core.stop();
        return Ok(());
    }

    loop {
        if let Err(e) = run_cycle(&core, cli.requests.as_deref()) {
            tracing::error!(error = %e, "governance-agent cycle failed");
        }
        thread::sleep(Duration::from_secs(cli.interval_seconds));
    }
}

fn run_cycle(core: &Arc<GovernanceCore>, requests_path: Option<&str>) -> Result<()> {
    if let Some(path) = requests_path {
        drive_requests(core, path)?;
    }
    maintain(core)?;
    Ok(())
}

/// A single line of the request-envelope file: the route name (matching one
/// `governance_core::http` handler) plus the parsed `Request` it is called
/// with.
#[derive(serde::Deserialize)]
struct RequestEnvelope {
    route: String,
    #[serde(default)]
    path_params: Vec<String>,
    #[serde(default = "default_query")]
    query: Value,
    #[serde(default = "default_body")]
    body: Value,
}

fn default_query() -> Value {
    serde_json::json!({})
}

fn default_body() -> Value {
    serde_json::json!({})
}

fn drive_requests(core: &GovernanceCore, path: &str) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let envelope: RequestEnvelope = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(line_no, error = %e, "skipping malformed request envelope");
                continue;
            }
        };
        let request = Request { path_params: envelope.path_params, query: envelope.query, body: envelope.body };
        let response = dispatch(core, &envelope.route, &request);
        println!("{}", serde_json::to_string(&response_json(&response))?);
    }
    Ok(())
}

fn response_json(response: &Response) -> Value {
    serde_json::json!({"status": response.status, "body": response.body})
}

fn dispatch(core: &GovernanceCore, route: &str, request: &Request) -> Response {
    match route {
        "policy_evaluate" => http::policy_evaluate(core, request),
        "contracts_create" => http::contracts_create(core, request),
        "contracts_list" => http::contracts_list(core, request),
        "contracts_statistics" => http::contracts_statistics(core),
        "contracts_get" => http::contracts_get(core, request),
        "contracts_propose" => http::contracts_propose(core, request),
        "contracts_sign" => http::contracts_sign(core, request),
        "contracts_revoke" => http::contracts_revoke(core, request),
        "ledger_append" => http::ledger_append(core, request),
        "ledger_get_entry" => http::ledger_get_entry(core, request),
        "ledger_get_block" => http::ledger_get_block(core, request),
        "ledger_verify_block" => http::ledger_verify_block(core, request),
        "ledger_verify_chain" => http::ledger_verify_chain(core, request),
        "ledger_get_proof" => http::ledger_get_proof(core, request),
        "ledger_statistics" => http::ledger_statistics(core),
        "core_simulate_risk" => http::core_simulate_risk(core, request),
        "core_status" => http::core_status(core),
        "core_monitor_stats" => http::core_monitor_stats(core),
        "core_submit_action" => http::core_submit_action(core, request),
        "core_risk_scenario" => http::core_risk_scenario(core, request),
        other => Response::from(governance_core::GovernanceError::InvalidInput(format!("unknown route '{other}'"))),
    }
}

/// Periodic upkeep that does not depend on any inbound request: advance
/// past-due contracts to EXPIRED and seal any ledger block that has
/// accumulated entries but was never closed out by `append_event` reaching
/// `block_size`.
fn maintain(core: &GovernanceCore) -> Result<()> {
    let expired = core.contracts.cleanup_expired()?;
    if expired > 0 {
        tracing::info!(expired, "transitioned contracts to EXPIRED");
    }
    if let Some(block_number) = core.ledger.seal_current_block()? {
        tracing::info!(block_number, "sealed ledger block during maintenance cycle");
    }
    Ok(())
}
