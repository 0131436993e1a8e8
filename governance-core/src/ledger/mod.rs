//! Provenance ledger: append-only, hash-chained, block-batched event log.

pub mod adapters;
pub mod store;

use chrono::{DateTime, Utc};
use contract_model::hash::content_hash;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ToolCall,
    PolicyDecision,
    DataFlow,
    ContractAction,
    Authn,
    Authz,
    System,
    ReflexiveDecision,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ToolCall => "tool_call",
            EventType::PolicyDecision => "policy_decision",
            EventType::DataFlow => "data_flow",
            EventType::ContractAction => "contract_action",
            EventType::Authn => "authn",
            EventType::Authz => "authz",
            EventType::System => "system",
            EventType::ReflexiveDecision => "reflexive_decision",
        }
    }
}

/// The payload written to the ledger for a single action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_type: EventType,
    pub actor_id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data_hash: Option<String>,
}

impl LedgerEvent {
    pub fn new(event_type: EventType, actor_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            event_type,
            actor_id: actor_id.into(),
            resource_id: None,
            action: action.into(),
            metadata: json!({}),
            timestamp: Utc::now(),
            data_hash: None,
        }
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Persisted wrapper for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence_number: u64,
    pub event: LedgerEvent,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
    pub block_id: u64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// entry_hash = SHA-256 over {sequence_number, event encoding, previous_hash, created_at}.
    pub fn compute_hash(
        sequence_number: u64,
        event: &LedgerEvent,
        previous_hash: &Option<String>,
        created_at: &DateTime<Utc>,
    ) -> String {
        let v = json!({
            "sequence_number": sequence_number,
            "event": event,
            "previous_hash": previous_hash,
            "created_at": created_at.to_rfc3339(),
        });
        content_hash(&v)
    }

    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(
            self.sequence_number,
            &self.event,
            &self.previous_hash,
            &self.created_at,
        )
    }
}

/// A rolling batch of entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerBlock {
    pub block_number: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
    pub entry_count: usize,
    pub merkle_root: Option<String>,
    pub sealed_at: Option<DateTime<Utc>>,
    pub is_verified: bool,
}

impl LedgerBlock {
    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_entries: u64,
    pub total_blocks: u64,
    pub sealed_blocks: u64,
    pub unsealed_blocks: u64,
    pub latest_sequence: u64,
}
