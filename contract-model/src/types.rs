//! Contract data model: parties, clauses, signatures, and the contract
//! envelope itself, plus content hashing and signature verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::crypto;
use crate::error::ContractModelError;
use crate::hash::content_hash;
use crate::transitions::ContractState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub clause_type: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub signer_id: String,
    pub signer_type: String,
    /// Base64-encoded Ed25519 signature.
    pub signature: String,
    /// Base64-encoded Ed25519 public key used to produce `signature`.
    pub public_key: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl Signature {
    /// The exact message a signature is taken over: `{id}:{content_hash}:{signer_id}:{signer_type}`.
    pub fn signing_message(contract_id: &Uuid, content_hash: &str, signer_id: &str, signer_type: &str) -> String {
        format!("{contract_id}:{content_hash}:{signer_id}:{signer_type}")
    }

    pub fn verifies_against(&self, contract_id: &Uuid, content_hash: &str) -> bool {
        let msg = Self::signing_message(contract_id, content_hash, &self.signer_id, &self.signer_type);
        crypto::verify(&self.public_key, msg.as_bytes(), &self.signature)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub clauses: Vec<Clause>,
    pub parties: Vec<Party>,
    pub state: ContractState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub proposed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub hipaa_entities: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    pub version: u32,
    pub created_by: String,
    pub last_modified: DateTime<Utc>,
    pub content_hash: String,
}

impl Contract {
    /// Build a new DRAFT contract. Rejects duplicate party ids up front
    /// (invariant: each party.id unique within a contract).
    pub fn new(
        title: String,
        description: String,
        clauses: Vec<Clause>,
        parties: Vec<Party>,
        created_by: String,
        expires_at: Option<DateTime<Utc>>,
        metadata: Value,
        hipaa_entities: Vec<String>,
    ) -> Result<Self, ContractModelError> {
        let mut seen = std::collections::HashSet::new();
        for p in &parties {
            if !seen.insert(p.id.clone()) {
                return Err(ContractModelError::DuplicateParty(p.id.clone()));
            }
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut contract = Self {
            id,
            title,
            description,
            clauses,
            parties,
            state: ContractState::Draft,
            created_at: now,
            proposed_at: None,
            signed_at: None,
            revoked_at: None,
            expires_at,
            signatures: vec![],
            hipaa_entities,
            metadata,
            version: 1,
            created_by,
            last_modified: now,
            content_hash: String::new(),
        };
        contract.recompute_content_hash();
        Ok(contract)
    }

    /// content_hash = SHA-256 over {id, title, description, clauses, parties, version} (sorted keys).
    pub fn compute_content_hash(&self) -> String {
        let v = json!({
            "id": self.id.to_string(),
            "title": self.title,
            "description": self.description,
            "clauses": self.clauses,
            "parties": self.parties,
            "version": self.version,
        });
        content_hash(&v)
    }

    pub fn recompute_content_hash(&mut self) {
        self.content_hash = self.compute_content_hash();
    }

    pub fn party_ids(&self) -> std::collections::HashSet<&str> {
        self.parties.iter().map(|p| p.id.as_str()).collect()
    }

    /// Whether every party.id is covered by a signature, per the SIGNED
    /// auto-advance rule.
    pub fn is_fully_signed(&self) -> bool {
        let required = self.party_ids();
        let signed: std::collections::HashSet<&str> =
            self.signatures.iter().map(|s| s.signer_id.as_str()).collect();
        required.is_subset(&signed)
    }

    pub fn has_signer(&self, signer_id: &str) -> bool {
        self.signatures.iter().any(|s| s.signer_id == signer_id)
    }

    /// Append a signature after verifying it against this contract's content hash.
    /// Caller is responsible for checking state legality and signer uniqueness first.
    pub fn verify_and_stage_signature(&self, sig: &Signature) -> Result<(), ContractModelError> {
        if sig.verifies_against(&self.id, &self.content_hash) {
            Ok(())
        } else {
            Err(ContractModelError::SignatureInvalid(sig.signer_id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, sign};

    fn sample_parties() -> Vec<Party> {
        vec![
            Party { id: "p1".into(), name: "Provider".into(), kind: "provider".into(), metadata: json!({}) },
            Party { id: "p2".into(), name: "Patient".into(), kind: "patient".into(), metadata: json!({}) },
        ]
    }

    #[test]
    fn duplicate_party_rejected() {
        let parties = vec![
            Party { id: "p1".into(), name: "A".into(), kind: "provider".into(), metadata: json!({}) },
            Party { id: "p1".into(), name: "B".into(), kind: "patient".into(), metadata: json!({}) },
        ];
        let err = Contract::new("t".into(), "d".into(), vec![], parties, "admin".into(), None, json!({}), vec![]).unwrap_err();
        assert!(matches!(err, ContractModelError::DuplicateParty(_)));
    }

    #[test]
    fn content_hash_changes_with_version() {
        let mut c = Contract::new("t".into(), "d".into(), vec![], sample_parties(), "admin".into(), None, json!({}), vec![]).unwrap();
        let h1 = c.content_hash.clone();
        c.version += 1;
        c.recompute_content_hash();
        assert_ne!(h1, c.content_hash);
    }

    #[test]
    fn signature_verifies_against_content_hash() {
        let c = Contract::new("t".into(), "d".into(), vec![], sample_parties(), "admin".into(), None, json!({}), vec![]).unwrap();
        let (pk, sk) = generate_keypair();
        let msg = Signature::signing_message(&c.id, &c.content_hash, "p1", "provider");
        let sig_b64 = sign(&sk, msg.as_bytes()).unwrap();
        let sig = Signature {
            signer_id: "p1".into(),
            signer_type: "provider".into(),
            signature: sig_b64,
            public_key: pk,
            timestamp: Utc::now(),
            metadata: json!({}),
        };
        assert!(c.verify_and_stage_signature(&sig).is_ok());
    }

    #[test]
    fn signature_fails_after_content_changes() {
        let mut c = Contract::new("t".into(), "d".into(), vec![], sample_parties(), "admin".into(), None, json!({}), vec![]).unwrap();
        let (pk, sk) = generate_keypair();
        let msg = Signature::signing_message(&c.id, &c.content_hash, "p1", "provider");
        let sig_b64 = sign(&sk, msg.as_bytes()).unwrap();
        let sig = Signature {
            signer_id: "p1".into(),
            signer_type: "provider".into(),
            signature: sig_b64,
            public_key: pk,
            timestamp: Utc::now(),
            metadata: json!({}),
        };
        c.title = "changed".into();
        c.recompute_content_hash();
        assert!(c.verify_and_stage_signature(&sig).is_err());
    }

    #[test]
    fn fully_signed_requires_all_parties() {
        let mut c = Contract::new("t".into(), "d".into(), vec![], sample_parties(), "admin".into(), None, json!({}), vec![]).unwrap();
        assert!(!c.is_fully_signed());
        c.signatures.push(Signature {
            signer_id: "p1".into(),
            signer_type: "provider".into(),
            signature: "x".into(),
            public_key: "y".into(),
            timestamp: Utc::now(),
            metadata: json!({}),
        });
        assert!(!c.is_fully_signed());
        c.signatures.push(Signature {
            signer_id: "p2".into(),
            signer_type: "patient".into(),
            signature: "x".into(),
            public_key: "y".into(),
            timestamp: Utc::now(),
            metadata: json!({}),
        });
        assert!(c.is_fully_signed());
    }
}
