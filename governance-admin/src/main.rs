use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use governance_core::policy::rbac::RbacConfig;
use governance_core::{GovernanceConfig, GovernanceCore};

#[derive(Parser)]
#[command(name = "governance-admin", about = "Operator CLI for the governance core")]
struct Cli {
    /// Root directory holding config.toml, ledger.db, contracts.db.
    #[arg(long, default_value = ".")]
    root: String,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate a YAML RBAC declaration without starting the core.
    ValidateRbac {
        #[arg(long, value_name = "FILE")]
        yaml: String,
    },
    /// Print ledger and contract statistics.
    Stats,
    /// Verify hash-chain integrity over a sequence range.
    VerifyChain {
        #[arg(long, default_value_t = 1)]
        start: u64,
        #[arg(long)]
        end: Option<u64>,
    },
    /// Verify a single sealed block's Merkle root against its entries.
    VerifyBlock {
        #[arg(long)]
        number: u64,
    },
    /// Force-seal the ledger's current (unsealed) block.
    SealBlock,
    /// Advance any past-due, non-terminal contracts to EXPIRED.
    CleanupExpiredContracts,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    let root = PathBuf::from(&cli.root);

    match cli.cmd {
        Cmd::ValidateRbac { yaml } => validate_rbac(&yaml),
        Cmd::Stats => stats(&root),
        Cmd::VerifyChain { start, end } => verify_chain(&root, start, end),
        Cmd::VerifyBlock { number } => verify_block(&root, number),
        Cmd::SealBlock => seal_block(&root),
        Cmd::CleanupExpiredContracts => cleanup_expired_contracts(&root),
    }
}

fn validate_rbac(yaml_path: &str) -> Result<()> {
    let text = std::fs::read_to_string(yaml_path).with_context(|| format!("read {yaml_path}"))?;
    let cfg: RbacConfig = serde_yaml::from_str(&text).context("parse RBAC YAML")?;
    println!(
        "ok: {} role(s), {} permission synonym group(s), {} role-hierarchy edge(s)",
        cfg.roles.len(),
        cfg.permissions.len(),
        cfg.role_hierarchy.len(),
    );
    Ok(())
}

fn open_core(root: &PathBuf) -> Result<GovernanceCore> {
    let config = GovernanceConfig::load(root)?;
    Ok(GovernanceCore::open(&config)?)
}

fn stats(root: &PathBuf) -> Result<()> {
    let core = open_core(root)?;
    let ledger_stats = core.ledger.get_ledger_statistics()?;
    let contract_stats = core.contracts.statistics()?;
    println!("policies registered: {:?}", core.policies.registered_names());
    println!("ledger: {}", serde_json::to_string_pretty(&ledger_stats)?);
    println!("contracts: {}", serde_json::to_string_pretty(&contract_stats)?);
    Ok(())
}

fn verify_chain(root: &PathBuf, start: u64, end: Option<u64>) -> Result<()> {
    let core = open_core(root)?;
    let verified = core.ledger.verify_chain_integrity(start, end)?;
    println!("chain[{start}..{end:?}] verified: {verified}");
    if !verified {
        anyhow::bail!("ledger chain integrity check failed");
    }
    Ok(())
}

fn verify_block(root: &PathBuf, number: u64) -> Result<()> {
    let core = open_core(root)?;
    let verified = core.ledger.verify_block_integrity(number)?;
    println!("block {number} verified: {verified}");
    if !verified {
        anyhow::bail!("block {number} failed Merkle verification");
    }
    Ok(())
}

fn seal_block(root: &PathBuf) -> Result<()> {
    let core = open_core(root)?;
    match core.ledger.seal_current_block()? {
        Some(block_number) => println!("sealed block {block_number}"),
        None => println!("no unsealed entries to seal"),
    }
    Ok(())
}

fn cleanup_expired_contracts(root: &PathBuf) -> Result<()> {
    let core = open_core(root)?;
    let expired = core.contracts.cleanup_expired()?;
    println!("transitioned {expired} contract(s) to EXPIRED");
    Ok(())
}
