use std::fs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contract_model::crypto;
use contract_model::types::Signature;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "keytool", about = "Ed25519 keypair generation and offline contract signing")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate a fresh Ed25519 keypair and print it (or write to --out).
    Genkey {
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
    },
    /// Sign a contract's content hash as one of its parties.
    Sign {
        /// Path to a JSON-serialized Contract (as returned by governance-core).
        #[arg(long, value_name = "FILE")]
        contract: String,
        #[arg(long)]
        signer_id: String,
        #[arg(long)]
        signer_type: String,
        /// Base64-encoded Ed25519 private key.
        #[arg(long)]
        sk_b64: String,
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
    },
    /// Verify a signature block against a contract, without staging it.
    Verify {
        #[arg(long, value_name = "FILE")]
        contract: String,
        #[arg(long, value_name = "FILE")]
        signature: String,
    },
}

#[derive(Debug, Deserialize)]
struct ContractStub {
    id: Uuid,
    content_hash: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Genkey { out } => genkey(out.as_deref()),
        Cmd::Sign { contract, signer_id, signer_type, sk_b64, out } => {
            sign(&contract, &signer_id, &signer_type, &sk_b64, out.as_deref())
        }
        Cmd::Verify { contract, signature } => verify(&contract, &signature),
    }
}

#[derive(Serialize)]
struct KeyOutput {
    public_key: String,
    private_key: String,
}

fn genkey(out: Option<&str>) -> Result<()> {
    let (public_key, private_key) = crypto::generate_keypair();
    let output = KeyOutput { public_key, private_key };
    let text = serde_json::to_string_pretty(&output)?;
    match out {
        Some(path) => fs::write(path, &text).with_context(|| format!("write {path}"))?,
        None => println!("{text}"),
    }
    Ok(())
}

fn sign(contract_path: &str, signer_id: &str, signer_type: &str, sk_b64: &str, out: Option<&str>) -> Result<()> {
    let raw = fs::read_to_string(contract_path).with_context(|| format!("read {contract_path}"))?;
    let contract: ContractStub = serde_json::from_str(&raw).context("parse contract json")?;

    let message = Signature::signing_message(&contract.id, &contract.content_hash, signer_id, signer_type);
    let signature = crypto::sign(sk_b64, message.as_bytes()).context("sign contract content hash")?;
    let public_key = derive_public_key(sk_b64)?;

    let block = json!({
        "signer_id": signer_id,
        "signer_type": signer_type,
        "signature": signature,
        "public_key": public_key,
    });
    let text = serde_json::to_string_pretty(&block)?;
    match out {
        Some(path) => fs::write(path, &text).with_context(|| format!("write {path}"))?,
        None => println!("{text}"),
    }
    Ok(())
}

fn verify(contract_path: &str, signature_path: &str) -> Result<()> {
    let raw = fs::read_to_string(contract_path).with_context(|| format!("read {contract_path}"))?;
    let contract: ContractStub = serde_json::from_str(&raw).context("parse contract json")?;

    let raw_sig = fs::read_to_string(signature_path).with_context(|| format!("read {signature_path}"))?;
    let sig: Signature = serde_json::from_str(&raw_sig).context("parse signature json")?;

    if sig.verifies_against(&contract.id, &contract.content_hash) {
        println!("signature verified");
        Ok(())
    } else {
        anyhow::bail!("signature does not verify against the contract's content hash");
    }
}

/// keytool never stores a private key alongside a derived public key on
/// disk, so signing re-derives the public half from the secret for the
/// output block instead of asking the caller to pass both.
fn derive_public_key(sk_b64: &str) -> Result<String> {
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine as _;
    use ed25519_dalek::SigningKey;

    let bytes = B64.decode(sk_b64).context("decode private key base64")?;
    let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("private key must be 32 bytes"))?;
    let signing_key = SigningKey::from_bytes(&key_bytes);
    Ok(B64.encode(signing_key.verifying_key().to_bytes()))
}
