use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use contract_model::{Clause, Contract, ContractState, Party, Signature};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{GovernanceError, GovernanceResult};

pub struct ProposeRequest {
    pub proposed_to: Vec<String>,
    pub message: String,
}

pub struct SignRequest {
    pub signer_id: String,
    pub signer_type: String,
    pub signature: String,
    pub public_key: String,
    #[allow(dead_code)]
    pub metadata: Value,
}

pub struct RevokeRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ContractStatistics {
    pub total: u64,
    pub by_state: HashMap<String, u64>,
    pub hipaa_compliant_count: u64,
    pub signed_count: u64,
    pub expired_count: u64,
}

/// Request fields for `create`; mirrors `Contract::new`'s parameters minus
/// `created_by`, which is supplied separately by the caller.
pub struct CreateContractRequest {
    pub title: String,
    pub description: String,
    pub clauses: Vec<Clause>,
    pub parties: Vec<Party>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub hipaa_entities: Vec<String>,
}

pub struct ContractEngine {
    conn: Mutex<Connection>,
}

impl ContractEngine {
    pub fn open(db_path: &Path) -> GovernanceResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GovernanceError::Persistence(e.to_string()))?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> GovernanceResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> GovernanceResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS contracts (
                id          TEXT PRIMARY KEY,
                state       TEXT NOT NULL,
                created_by  TEXT NOT NULL,
                expires_at  TEXT,
                contract_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contracts_state ON contracts(state);
            CREATE INDEX IF NOT EXISTS idx_contracts_created_by ON contracts(created_by);
            "#,
        )?;
        Ok(())
    }

    fn put(conn: &Connection, contract: &Contract) -> GovernanceResult<()> {
        conn.execute(
            "INSERT INTO contracts (id, state, created_by, expires_at, contract_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               state = excluded.state,
               expires_at = excluded.expires_at,
               contract_json = excluded.contract_json",
            params![
                contract.id.to_string(),
                contract.state.to_string(),
                contract.created_by,
                contract.expires_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(contract)?,
            ],
        )?;
        Ok(())
    }

    fn load(conn: &Connection, id: Uuid) -> GovernanceResult<Option<Contract>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT contract_json FROM contracts WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).map_err(GovernanceError::from)).transpose()
    }

    pub fn create(&self, request: CreateContractRequest, created_by: String) -> GovernanceResult<Contract> {
        let contract = Contract::new(
            request.title,
            request.description,
            request.clauses,
            request.parties,
            created_by,
            request.expires_at,
            request.metadata,
            request.hipaa_entities,
        )?;
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        Self::put(&conn, &contract)?;
        Ok(contract)
    }

    pub fn get(&self, id: Uuid) -> GovernanceResult<Option<Contract>> {
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        Self::load(&conn, id)
    }

    pub fn list(&self, state: Option<ContractState>, created_by: Option<&str>) -> GovernanceResult<Vec<Contract>> {
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        let mut stmt = conn.prepare("SELECT contract_json FROM contracts")?;
        let rows: Vec<String> = stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?;
        drop(stmt);
        rows.into_iter()
            .map(|json| serde_json::from_str::<Contract>(&json).map_err(GovernanceError::from))
            .collect::<GovernanceResult<Vec<_>>>()
            .map(|contracts| {
                contracts
                    .into_iter()
                    .filter(|c| state.map(|s| c.state == s).unwrap_or(true))
                    .filter(|c| created_by.map(|cb| c.created_by == cb).unwrap_or(true))
                    .collect()
            })
    }

    pub fn by_party(&self, party_id: &str) -> GovernanceResult<Vec<Contract>> {
        Ok(self
            .list(None, None)?
            .into_iter()
            .filter(|c| c.parties.iter().any(|p| p.id == party_id))
            .collect())
    }

    pub fn propose(&self, id: Uuid, request: ProposeRequest, proposed_by: &str) -> GovernanceResult<Contract> {
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        let mut contract = Self::load(&conn, id)?.ok_or_else(|| GovernanceError::NotFound(id.to_string()))?;

        if !contract.state.can_transition_to(ContractState::Proposed) {
            return Err(GovernanceError::StateMachine {
                from: contract.state.to_string(),
                to: ContractState::Proposed.to_string(),
            });
        }

        let now = Utc::now();
        contract.state = ContractState::Proposed;
        contract.proposed_at = Some(now);
        contract.last_modified = now;
        contract.metadata["proposal"] = serde_json::json!({
            "proposed_to": request.proposed_to,
            "message": request.message,
            "proposer": proposed_by,
            "timestamp": now.to_rfc3339(),
        });

        Self::put(&conn, &contract)?;
        Ok(contract)
    }

    /// Verify and append a signature. Serialized on the engine-wide lock so
    /// two concurrent signers of the same contract cannot both read a stale
    /// row and silently drop each other's signature.
    pub fn sign(&self, id: Uuid, request: SignRequest) -> GovernanceResult<Contract> {
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        let mut contract = Self::load(&conn, id)?.ok_or_else(|| GovernanceError::NotFound(id.to_string()))?;

        if contract.state != ContractState::Proposed && contract.state != ContractState::Signed {
            return Err(GovernanceError::StateMachine {
                from: contract.state.to_string(),
                to: ContractState::Signed.to_string(),
            });
        }
        if contract.has_signer(&request.signer_id) {
            return Err(GovernanceError::InvalidInput(format!(
                "signer '{}' has already signed this contract",
                request.signer_id
            )));
        }

        let signature = Signature {
            signer_id: request.signer_id,
            signer_type: request.signer_type,
            signature: request.signature,
            public_key: request.public_key,
            timestamp: Utc::now(),
            metadata: request.metadata,
        };
        contract.verify_and_stage_signature(&signature)?;
        contract.signatures.push(signature);
        contract.last_modified = Utc::now();

        if contract.state == ContractState::Proposed && contract.is_fully_signed() {
            contract.state = ContractState::Signed;
            contract.signed_at = Some(Utc::now());
        }

        Self::put(&conn, &contract)?;
        Ok(contract)
    }

    pub fn revoke(&self, id: Uuid, request: RevokeRequest) -> GovernanceResult<Contract> {
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        let mut contract = Self::load(&conn, id)?.ok_or_else(|| GovernanceError::NotFound(id.to_string()))?;

        if matches!(contract.state, ContractState::Revoked | ContractState::Expired) {
            return Err(GovernanceError::StateMachine {
                from: contract.state.to_string(),
                to: ContractState::Revoked.to_string(),
            });
        }

        let now = Utc::now();
        contract.state = ContractState::Revoked;
        contract.revoked_at = Some(now);
        contract.last_modified = now;
        contract.metadata["revocation"] = serde_json::json!({
            "reason": request.reason,
            "timestamp": now.to_rfc3339(),
        });

        Self::put(&conn, &contract)?;
        Ok(contract)
    }

    pub fn cleanup_expired(&self) -> GovernanceResult<u64> {
        let conn = self.conn.lock().expect("contract engine mutex poisoned");
        let mut stmt = conn.prepare("SELECT contract_json FROM contracts")?;
        let rows: Vec<String> = stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?;
        drop(stmt);

        let now = Utc::now();
        let mut expired = 0u64;
        for json in rows {
            let mut contract: Contract = serde_json::from_str(&json)?;
            let is_expired = contract.expires_at.map(|exp| exp < now).unwrap_or(false);
            if is_expired && !matches!(contract.state, ContractState::Expired | ContractState::Revoked) {
                contract.state = ContractState::Expired;
                contract.last_modified = now;
                Self::put(&conn, &contract)?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub fn statistics(&self) -> GovernanceResult<ContractStatistics> {
        let contracts = self.list(None, None)?;
        let mut stats = ContractStatistics { total: contracts.len() as u64, ..Default::default() };
        for contract in &contracts {
            *stats.by_state.entry(contract.state.to_string()).or_insert(0) += 1;
            if !contract.hipaa_entities.is_empty() {
                stats.hipaa_compliant_count += 1;
            }
            if contract.state == ContractState::Signed {
                stats.signed_count += 1;
            }
            if contract.state == ContractState::Expired {
                stats.expired_count += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::crypto::{generate_keypair, sign};
    use serde_json::json;

    fn parties() -> Vec<Party> {
        vec![
            Party { id: "p1".into(), name: "Provider".into(), kind: "provider".into(), metadata: json!({}) },
            Party { id: "p2".into(), name: "Patient".into(), kind: "patient".into(), metadata: json!({}) },
        ]
    }

    fn create_request() -> CreateContractRequest {
        CreateContractRequest {
            title: "Data sharing agreement".into(),
            description: "d".into(),
            clauses: vec![],
            parties: parties(),
            expires_at: None,
            metadata: json!({}),
            hipaa_entities: vec!["p1".into()],
        }
    }

    #[test]
    fn s5_full_contract_lifecycle() {
        let engine = ContractEngine::open_in_memory().unwrap();
        let contract = engine.create(create_request(), "admin".into()).unwrap();
        assert_eq!(contract.state, ContractState::Draft);

        let proposed = engine
            .propose(
                contract.id,
                ProposeRequest { proposed_to: vec!["p1".into(), "p2".into()], message: "please sign".into() },
                "admin",
            )
            .unwrap();
        assert_eq!(proposed.state, ContractState::Proposed);
        assert!(proposed.proposed_at.is_some());

        let (pk1, sk1) = generate_keypair();
        let msg1 = contract_model::Signature::signing_message(&contract.id, &proposed.content_hash, "p1", "provider");
        let sig1 = sign(&sk1, msg1.as_bytes()).unwrap();
        let after_first = engine
            .sign(
                contract.id,
                SignRequest { signer_id: "p1".into(), signer_type: "provider".into(), signature: sig1, public_key: pk1, metadata: json!({}) },
            )
            .unwrap();
        assert_eq!(after_first.state, ContractState::Proposed);
        assert_eq!(after_first.signatures.len(), 1);

        let (pk2, sk2) = generate_keypair();
        let msg2 = contract_model::Signature::signing_message(&contract.id, &proposed.content_hash, "p2", "patient");
        let sig2 = sign(&sk2, msg2.as_bytes()).unwrap();
        let after_second = engine
            .sign(
                contract.id,
                SignRequest { signer_id: "p2".into(), signer_type: "patient".into(), signature: sig2, public_key: pk2, metadata: json!({}) },
            )
            .unwrap();
        assert_eq!(after_second.state, ContractState::Signed);
        assert!(after_second.signed_at.is_some());

        let revoked = engine.revoke(contract.id, RevokeRequest { reason: "terms violated".into() }).unwrap();
        assert_eq!(revoked.state, ContractState::Revoked);
        assert!(revoked.revoked_at.is_some());

        let err = engine.revoke(contract.id, RevokeRequest { reason: "again".into() }).unwrap_err();
        assert!(matches!(err, GovernanceError::StateMachine { .. }));
    }

    #[test]
    fn duplicate_signer_rejected() {
        let engine = ContractEngine::open_in_memory().unwrap();
        let contract = engine.create(create_request(), "admin".into()).unwrap();
        engine
            .propose(contract.id, ProposeRequest { proposed_to: vec![], message: "m".into() }, "admin")
            .unwrap();
        let (pk, sk) = generate_keypair();
        let proposed = engine.get(contract.id).unwrap().unwrap();
        let msg = contract_model::Signature::signing_message(&contract.id, &proposed.content_hash, "p1", "provider");
        let sig = sign(&sk, msg.as_bytes()).unwrap();
        engine
            .sign(contract.id, SignRequest { signer_id: "p1".into(), signer_type: "provider".into(), signature: sig.clone(), public_key: pk.clone(), metadata: json!({}) })
            .unwrap();
        let err = engine
            .sign(contract.id, SignRequest { signer_id: "p1".into(), signer_type: "provider".into(), signature: sig, public_key: pk, metadata: json!({}) })
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidInput(_)));
    }

    #[test]
    fn cleanup_expired_transitions_past_due_contracts() {
        let engine = ContractEngine::open_in_memory().unwrap();
        let mut request = create_request();
        request.expires_at = Some(Utc::now() - chrono::Duration::days(1));
        let contract = engine.create(request, "admin".into()).unwrap();
        let count = engine.cleanup_expired().unwrap();
        assert_eq!(count, 1);
        let reloaded = engine.get(contract.id).unwrap().unwrap();
        assert_eq!(reloaded.state, ContractState::Expired);
    }

    #[test]
    fn statistics_counts_by_state() {
        let engine = ContractEngine::open_in_memory().unwrap();
        engine.create(create_request(), "admin".into()).unwrap();
        let stats = engine.statistics().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.hipaa_compliant_count, 1);
        assert_eq!(*stats.by_state.get("DRAFT").unwrap(), 1);
    }

    #[test]
    fn by_party_filters_correctly() {
        let engine = ContractEngine::open_in_memory().unwrap();
        engine.create(create_request(), "admin".into()).unwrap();
        assert_eq!(engine.by_party("p1").unwrap().len(), 1);
        assert_eq!(engine.by_party("nonexistent").unwrap().len(), 0);
    }
}
