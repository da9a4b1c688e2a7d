//! Centralized DKG engine error types.

use thiserror::Error;

use crate::types::PlayerIdx;

/// Errors surfaced by the round factory and round instances.
#[derive(Error, Debug)]
pub enum DkgError {
    /// A second round was requested while one is still live.
    #[error("attempt to initiate DKG round while an earlier DKG round is in progress")]
    RoundAlreadyInProgress,

    #[error("too many players: {players} > {max}")]
    TooManyPlayers { players: usize, max: usize },

    #[error("player index {index} out of range (max {max})")]
    InvalidPlayerIndex { index: usize, max: usize },

    /// Round arguments derived from the configuration are inconsistent.
    #[error("invalid round arguments: {0}")]
    InvalidRoundArgs(String),

    #[error("invalid configuration")]
    InvalidConfiguration(#[source] ConfigError),

    /// The key is finalized on-chain but our share could not be rebuilt.
    #[error("could not reconstruct shares for an available distributed key")]
    RecoveryFailed(#[source] Box<DkgError>),

    #[error("could not persist share records")]
    PersistenceWrite(#[source] PersistenceError),

    #[error("could not read share records")]
    PersistenceRead(#[source] PersistenceError),

    /// On-chain contract query failed.
    #[error("on-chain contract error: {0}")]
    Contract(String),

    #[error("invalid dealing from player {dealer}: {reason}")]
    InvalidDealing { dealer: PlayerIdx, reason: String },

    #[error("duplicate dealing from player {dealer}")]
    DuplicateDealing { dealer: PlayerIdx },

    #[error("insufficient dealings: have {have}, need {need}")]
    InsufficientDealings { have: usize, need: usize },

    #[error("no share records stored for this key")]
    NoShareRecords,

    /// Persisted bytes do not match the stored integrity hash.
    #[error("share record hash mismatch for dealer {dealer}")]
    RecordHashMismatch { dealer: PlayerIdx },

    #[error("observation of {size} bytes exceeds limit of {max}")]
    ObservationTooLarge { size: usize, max: usize },

    /// Rebuilt public key disagrees with the one published on-chain.
    #[error("recovered public key does not match the on-chain key")]
    KeyMismatch,

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The round already reached a terminal state.
    #[error("round is closed")]
    RoundClosed,

    #[error("round was cancelled")]
    Cancelled,

    /// A spawned round task panicked or was aborted.
    #[error("round task failed: {0}")]
    TaskFailed(String),
}

/// Errors raised while decoding or checking plugin configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not encode offchain config: {0}")]
    Encode(String),

    #[error("could not decode offchain config: {0}")]
    Decode(String),

    #[error("onchain config must be {expected} bytes, got {actual}")]
    OnchainLength { expected: usize, actual: usize },

    #[error("unsupported encryption group: {0}")]
    UnsupportedEncryptionGroup(String),

    #[error("unsupported point translation: {0}")]
    UnsupportedTranslator(String),

    #[error("key count mismatch: {encryption} encryption keys, {signing} signing keys")]
    KeyCountMismatch { encryption: usize, signing: usize },

    #[error("configuration lists {count} players, must be between 1 and {max}")]
    PlayerCount { count: usize, max: usize },

    #[error("invalid encryption public key for player {0}")]
    InvalidEncryptionKey(usize),

    #[error("invalid signing public key for player {0}")]
    InvalidSigningKey(usize),

    #[error("key ID in onchain config does not match the local key ID")]
    KeyIdMismatch,

    #[error("invalid local key configuration: {0}")]
    LocalKey(String),
}

/// Share-store failures.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sealing error: {0}")]
    Seal(String),

    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<ConfigError> for DkgError {
    fn from(err: ConfigError) -> Self {
        DkgError::InvalidConfiguration(err)
    }
}

impl From<bincode::Error> for DkgError {
    fn from(err: bincode::Error) -> Self {
        DkgError::Serialization(err.to_string())
    }
}
