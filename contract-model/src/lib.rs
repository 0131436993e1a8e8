//! Data model, content hashing, and Ed25519 signature verification for
//! multi-party governance contracts. Deliberately has no persistence or
//! lifecycle orchestration of its own — that lives in `governance-core`'s
//! contract engine, layered on top of this standalone data model.

pub mod crypto;
pub mod error;
pub mod hash;
pub mod transitions;
pub mod types;

pub use error::ContractModelError;
pub use transitions::ContractState;
pub use types::{Clause, Contract, Party, Signature};
