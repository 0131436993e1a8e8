use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractModelError {
    #[error("illegal contract state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("duplicate party id: {0}")]
    DuplicateParty(String),

    #[error("duplicate signer id: {0}")]
    DuplicateSigner(String),

    #[error("crypto decode error: {0}")]
    CryptoDecode(String),

    #[error("signature does not verify for signer {0}")]
    SignatureInvalid(String),
}
