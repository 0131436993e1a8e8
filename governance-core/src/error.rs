//! Error kinds surfaced as typed values rather than exceptions, so callers
//! can match on failure modes instead of parsing messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("illegal state transition {from} -> {to}")]
    StateMachine { from: String, to: String },

    #[error("policy '{policy}' raised an error: {message}")]
    PolicyEvaluation { policy: String, message: String },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("anchor adapter error: {0}")]
    Anchor(String),
}

impl GovernanceError {
    /// HTTP status code the thin routing surface should report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GovernanceError::InvalidInput(_) => 400,
            GovernanceError::NotFound(_) => 404,
            GovernanceError::StateMachine { .. } => 400,
            GovernanceError::Crypto(_) => 400,
            GovernanceError::PolicyEvaluation { .. } => 500,
            GovernanceError::Integrity(_) => 500,
            GovernanceError::Persistence(_) => 500,
            GovernanceError::Anchor(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for GovernanceError {
    fn from(e: rusqlite::Error) -> Self {
        GovernanceError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for GovernanceError {
    fn from(e: serde_json::Error) -> Self {
        GovernanceError::InvalidInput(e.to_string())
    }
}

impl From<contract_model::ContractModelError> for GovernanceError {
    fn from(e: contract_model::ContractModelError) -> Self {
        use contract_model::ContractModelError as E;
        match e {
            E::InvalidTransition { from, to } => GovernanceError::StateMachine { from, to },
            E::CryptoDecode(m) => GovernanceError::Crypto(m),
            E::SignatureInvalid(signer) => {
                GovernanceError::Crypto(format!("signature invalid for signer {signer}"))
            }
            E::DuplicateParty(id) => {
                GovernanceError::InvalidInput(format!("duplicate party id: {id}"))
            }
            E::DuplicateSigner(id) => {
                GovernanceError::InvalidInput(format!("duplicate signer id: {id}"))
            }
        }
    }
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;
