//! Persisted share-record types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PlayerIdx;

/// BLAKE3 digest of a marshaled share record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHash(pub [u8; 32]);

impl RecordHash {
    pub fn of(bytes: &[u8]) -> Self {
        RecordHash(*blake3::hash(bytes).as_bytes())
    }
}

impl fmt::Debug for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordHash({})", hex::encode(self.0))
    }
}

/// One dealer's contribution to a key, as written to share persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub dealer: PlayerIdx,
    pub marshaled_share_record: Vec<u8>,
    pub hash: RecordHash,
}

impl ShareRecord {
    /// Wrap marshaled bytes, computing their integrity hash.
    pub fn new(dealer: PlayerIdx, marshaled_share_record: Vec<u8>) -> Self {
        let hash = RecordHash::of(&marshaled_share_record);
        ShareRecord { dealer, marshaled_share_record, hash }
    }

    /// Whether the stored hash still matches the stored bytes.
    pub fn hash_matches(&self) -> bool {
        RecordHash::of(&self.marshaled_share_record) == self.hash
    }
}
