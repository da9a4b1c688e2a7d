// Shared DKG round types

use std::fmt;
use std::sync::{Arc, Mutex};

use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, CryptoRngCore, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::types::{ConfigDigest, KeyId, PlayerIdx};

/// Randomness source handed to rounds. One source is shared by every round a
/// factory builds.
pub struct Randomness(Box<dyn CryptoRngCore + Send>);

impl Randomness {
    pub fn new(rng: impl CryptoRngCore + Send + 'static) -> Self {
        Randomness(Box::new(rng))
    }

    pub fn shared(rng: impl CryptoRngCore + Send + 'static) -> SharedRandomness {
        Arc::new(Mutex::new(Self::new(rng)))
    }
}

impl RngCore for Randomness {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl CryptoRng for Randomness {}

pub type SharedRandomness = Arc<Mutex<Randomness>>;

/// This player's share of the distributed secret. Wiped on drop and never printed.
#[derive(Clone)]
pub struct SecretShare(pub(crate) Zeroizing<Scalar>);

impl SecretShare {
    pub fn expose(&self) -> &Scalar {
        &self.0
    }
}

impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretShare(<redacted>)")
    }
}

impl PartialEq for SecretShare {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

/// Key material produced by a completed round, or rebuilt by recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyData {
    pub key_id: KeyId,
    /// Compressed Edwards encoding of the shared public key.
    pub public_key: [u8; 32],
    /// The shared public key as the on-chain contract stores it.
    pub onchain_public_key: Vec<u8>,
    /// `share_i * G` for every player, indexed by player.
    pub public_shares: Vec<[u8; 32]>,
    pub secret_share: SecretShare,
    pub threshold: usize,
    /// Players whose dealings were summed into the key, ascending.
    pub dealers: Vec<PlayerIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    Constructing,
    Recovering,
    Recovered,
    GeneratingFresh,
    Completed,
    Failed,
}

impl RoundPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundPhase::Completed | RoundPhase::Failed)
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundPhase::Constructing => "constructing",
            RoundPhase::Recovering => "recovering",
            RoundPhase::Recovered => "recovered",
            RoundPhase::GeneratingFresh => "generating",
            RoundPhase::Completed => "completed",
            RoundPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// How a round ended, as reported to the factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Size limits advertised to the reporting engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLimits {
    pub max_query_len: usize,
    pub max_observation_len: usize,
    pub max_report_len: usize,
}

impl Default for RoundLimits {
    fn default() -> Self {
        RoundLimits { max_query_len: 1000, max_observation_len: 1_000_000, max_report_len: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundInfo {
    pub name: String,
    pub limits: RoundLimits,
    pub unique_reports: bool,
}

/// What the reporting engine hands the factory when it asks for a new round.
#[derive(Debug, Clone)]
pub struct RoundParams {
    pub config_digest: ConfigDigest,
    /// This player's ordinal.
    pub player: u8,
    pub n: usize,
    /// Fault tolerance; also the threshold of the generated key.
    pub f: usize,
    pub offchain_config: Vec<u8>,
    pub onchain_config: Vec<u8>,
}
