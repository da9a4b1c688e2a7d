//! DKG Engine Core Library
//!
//! Threshold key generation rounds for a BFT reporting engine: at most one
//! round per factory, recovery of already-published keys from persisted
//! share records, and exactly-once completion.

pub mod audit;
pub mod crypto;
pub mod dkg;
pub mod error;
pub mod logging;
pub mod types;
pub mod utils;
pub mod vault;

pub use dkg::{DkgRound, DkgRoundFactory, FactoryConfig, KeyConsumer, KeyData, OnchainContract, RoundParams};
pub use error::{ConfigError, DkgError, PersistenceError};
pub use logging::{LogConfig, init_logging};
pub use types::{ConfigDigest, KeyId, MAX_PLAYER, PlayerIdx};

#[cfg(test)]
mod tests;
