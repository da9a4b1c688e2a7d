
pub mod memory;
pub mod sealed;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::types::{ConfigDigest, KeyId};
use crate::vault::types::ShareRecord;

/// Durable storage of share records, keyed by `(config digest, key ID)`.
///
/// A write replaces the whole set for its key pair atomically; a read never
/// observes a partial write. Reading a pair that was never written yields an
/// empty set.
#[async_trait]
pub trait SharePersistence: Send + Sync {
    async fn write_share_records(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
        records: &[ShareRecord],
    ) -> Result<(), PersistenceError>;

    async fn read_share_records(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
    ) -> Result<Vec<ShareRecord>, PersistenceError>;
}
