//! Capabilities a round consumes from its surroundings: the on-chain DKG
//! contract and the consumer of finished keys.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::dkg::types::KeyData;
use crate::error::DkgError;
use crate::types::KeyId;

/// Read access to the on-chain DKG contract.
#[async_trait]
pub trait OnchainContract: Send + Sync {
    /// The key published for `key_id` in its on-chain (translated) encoding,
    /// or `None` while no round has finalized it.
    async fn published_key(&self, key_id: &KeyId) -> Result<Option<Vec<u8>>, DkgError>;

    async fn is_key_finalized(&self, key_id: &KeyId) -> Result<bool, DkgError> {
        Ok(self.published_key(key_id).await?.is_some())
    }
}

/// Receives key lifecycle notifications. Shared by every round of a factory
/// and may be called from whichever task finishes a round.
pub trait KeyConsumer: Send + Sync {
    /// Any previously delivered key for `key_id` must no longer be used.
    fn key_invalidated(&self, key_id: KeyId);

    fn key_generated(&self, key_data: Arc<KeyData>);
}

/// In-memory contract, for local simulations and tests.
#[derive(Default)]
pub struct MemoryContract {
    published: RwLock<HashMap<KeyId, Vec<u8>>>,
    latency: Option<Duration>,
}

impl MemoryContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query, imitating a network round-trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Record `onchain_key` as the finalized key for `key_id`.
    pub fn publish(&self, key_id: KeyId, onchain_key: Vec<u8>) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key_id, onchain_key);
    }
}

#[async_trait]
impl OnchainContract for MemoryContract {
    async fn published_key(&self, key_id: &KeyId) -> Result<Option<Vec<u8>>, DkgError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let published = self
            .published
            .read()
            .map_err(|_| DkgError::Contract("contract state lock poisoned".into()))?;
        Ok(published.get(key_id).cloned())
    }
}
