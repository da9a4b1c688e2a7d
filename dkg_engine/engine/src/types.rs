//! Shared data types for the DKG engine: player indices, config digests, key IDs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DkgError;

/// Protocol-wide upper bound on the number of players in a round.
pub const MAX_PLAYER: u8 = 31;

/// Position of a player within a round, always in `[0, MAX_PLAYER)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerIdx(u8);

impl PlayerIdx {
    /// Validate a raw ordinal.
    pub fn new(idx: usize) -> Result<Self, DkgError> {
        if idx >= MAX_PLAYER as usize {
            return Err(DkgError::InvalidPlayerIndex { index: idx, max: MAX_PLAYER as usize });
        }
        Ok(PlayerIdx(idx as u8))
    }

    /// All indices of a round with `n` players.
    pub fn all(n: usize) -> Result<Vec<PlayerIdx>, DkgError> {
        (0..n).map(PlayerIdx::new).collect()
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The non-zero x coordinate this player's share is evaluated at.
    pub(crate) fn eval_point(self) -> u64 {
        self.0 as u64 + 1
    }
}

impl fmt::Display for PlayerIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque configuration version handed to us by the reporting engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigDigest(pub [u8; 32]);

/// Identifier of the shared key a round is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 32]);

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}
