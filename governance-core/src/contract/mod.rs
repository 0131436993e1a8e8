//! Contract lifecycle engine. Wraps `contract_model::Contract` with SQLite
//! persistence and the concurrency-serializing operations a multi-party
//! signing workflow needs.

pub mod engine;

pub use engine::{
    ContractEngine, ContractStatistics, CreateContractRequest, ProposeRequest, RevokeRequest, SignRequest,
};
