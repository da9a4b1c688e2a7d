
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::PersistenceError;
use crate::types::{ConfigDigest, KeyId};
use crate::utils::filename::{ShareFileMetadata, share_file_name, validate_share_filename};
use crate::vault::backend::SharePersistence;
use crate::vault::types::ShareRecord;

/// Sealed share-set blob, encrypted using AES-GCM
#[derive(Serialize, Deserialize)]
struct SealedBlob {
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
}

/// Share store that seals each share set with AES-256-GCM and writes it to
/// its own file under `dir`. The sealing key never leaves this struct.
pub struct SealedFileShareStore {
    dir: PathBuf,
    cipher: Aes256Gcm,
    // serializes writers so temp files never collide
    write_lock: Mutex<()>,
}

impl SealedFileShareStore {
    /// Open a store under `dir` sealed with `key`. The same key must be used
    /// after a restart to read earlier share sets back.
    pub fn new(dir: impl Into<PathBuf>, key: Zeroizing<[u8; 32]>) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        SealedFileShareStore { dir: dir.into(), cipher, write_lock: Mutex::new(()) }
    }

    /// Store with a fresh random sealing key; its contents are unreadable
    /// by any other instance.
    pub fn ephemeral(dir: impl Into<PathBuf>) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut key[..]);
        Self::new(dir, key)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every share set currently on disk, by key pair.
    pub async fn stored_share_sets(&self) -> Result<Vec<ShareFileMetadata>, PersistenceError> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(meta) = validate_share_filename(name) {
                    found.push(meta);
                }
            }
        }
        found.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(found)
    }

    fn path_for(&self, config_digest: &ConfigDigest, key_id: &KeyId) -> PathBuf {
        self.dir.join(share_file_name(config_digest, key_id))
    }

    /// Ciphertexts are bound to their key pair, so a renamed file fails to open.
    fn associated_data(config_digest: &ConfigDigest, key_id: &KeyId) -> [u8; 64] {
        let mut aad = [0u8; 64];
        aad[..32].copy_from_slice(&config_digest.0);
        aad[32..].copy_from_slice(&key_id.0);
        aad
    }

    /// Only returns once the new set and its directory entry are on disk.
    async fn replace_durably(&self, tmp: &Path, path: &Path, sealed: &[u8]) -> Result<(), PersistenceError> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(sealed).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(tmp, path).await?;
        sync_dir(&self.dir).await
    }

    fn seal(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
        records: &[ShareRecord],
    ) -> Result<Vec<u8>, PersistenceError> {
        let plaintext = Zeroizing::new(
            bincode::serialize(records).map_err(|e| PersistenceError::Serde(format!("{e:?}")))?,
        );

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let aad = Self::associated_data(config_digest, key_id);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: &plaintext[..], aad: &aad })
            .map_err(|e| PersistenceError::Seal(format!("Encryption failed: {e:?}")))?;

        bincode::serialize(&SealedBlob { nonce, ciphertext })
            .map_err(|e| PersistenceError::Serde(format!("{e:?}")))
    }

    fn unseal(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
        data: &[u8],
    ) -> Result<Vec<ShareRecord>, PersistenceError> {
        let blob: SealedBlob =
            bincode::deserialize(data).map_err(|e| PersistenceError::Serde(format!("{e:?}")))?;

        let aad = Self::associated_data(config_digest, key_id);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(&blob.nonce), Payload { msg: &blob.ciphertext, aad: &aad })
                .map_err(|e| PersistenceError::Seal(format!("Decryption failed: {e:?}")))?,
        );

        bincode::deserialize(&plaintext).map_err(|e| PersistenceError::Serde(format!("{e:?}")))
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), PersistenceError> {
    tokio::fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

// directories cannot be opened for syncing here
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), PersistenceError> {
    Ok(())
}

#[async_trait]
impl SharePersistence for SealedFileShareStore {
    async fn write_share_records(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
        records: &[ShareRecord],
    ) -> Result<(), PersistenceError> {
        let mut sorted = records.to_vec();
        sorted.sort_by_key(|r| r.dealer);
        let sealed = self.seal(config_digest, key_id, &sorted)?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;

        // write-then-rename so readers see either the old set or the new one
        let path = self.path_for(config_digest, key_id);
        let tmp = path.with_extension("sealed.tmp");
        if let Err(e) = self.replace_durably(&tmp, &path, &sealed).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "could not remove temporary share file");
                }
            }
            return Err(e);
        }

        debug!(
            config_digest = %config_digest,
            key_id = %key_id,
            records = sorted.len(),
            "sealed share records written"
        );
        Ok(())
    }

    async fn read_share_records(
        &self,
        config_digest: &ConfigDigest,
        key_id: &KeyId,
    ) -> Result<Vec<ShareRecord>, PersistenceError> {
        let path = self.path_for(config_digest, key_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        self.unseal(config_digest, key_id, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlayerIdx;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dkg-sealed-{}", uuid::Uuid::new_v4()))
    }

    fn records() -> Vec<ShareRecord> {
        (0..3)
            .rev()
            .map(|i| ShareRecord::new(PlayerIdx::new(i).unwrap(), vec![i as u8; 16]))
            .collect()
    }

    #[tokio::test]
    async fn test_records_survive_reopen_with_same_key() {
        let dir = scratch_dir();
        let key = [5u8; 32];
        let (digest, key_id) = (ConfigDigest([1; 32]), KeyId([2; 32]));

        let store = SealedFileShareStore::new(&dir, Zeroizing::new(key));
        store.write_share_records(&digest, &key_id, &records()).await.unwrap();
        drop(store);

        let reopened = SealedFileShareStore::new(&dir, Zeroizing::new(key));
        let read = reopened.read_share_records(&digest, &key_id).await.unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[0].dealer, PlayerIdx::new(0).unwrap());
        assert!(read.iter().all(ShareRecord::hash_matches));

        let sets = reopened.stored_share_sets().await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].key_id, key_id);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_wrong_key_cannot_unseal() {
        let dir = scratch_dir();
        let (digest, key_id) = (ConfigDigest([1; 32]), KeyId([2; 32]));

        let store = SealedFileShareStore::ephemeral(&dir);
        store.write_share_records(&digest, &key_id, &records()).await.unwrap();

        let other = SealedFileShareStore::ephemeral(&dir);
        let err = other.read_share_records(&digest, &key_id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Seal(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_set_reads_empty() {
        let store = SealedFileShareStore::ephemeral(scratch_dir());
        let read = store.read_share_records(&ConfigDigest([0; 32]), &KeyId([0; 32])).await.unwrap();
        assert!(read.is_empty());
        assert!(store.stored_share_sets().await.unwrap().is_empty());
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = scratch_dir();
        let store = SealedFileShareStore::new(&dir, Zeroizing::new([4u8; 32]));
        let (digest, key_id) = (ConfigDigest([1; 32]), KeyId([2; 32]));

        store.write_share_records(&digest, &key_id, &records()).await.unwrap();
        store.write_share_records(&digest, &key_id, &records()[..1]).await.unwrap();
        assert_eq!(leftover_temp_files(&dir), 0);
        assert_eq!(store.read_share_records(&digest, &key_id).await.unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_replace_removes_temp_file() {
        let dir = scratch_dir();
        let store = SealedFileShareStore::new(&dir, Zeroizing::new([4u8; 32]));
        let (digest, key_id) = (ConfigDigest([1; 32]), KeyId([2; 32]));

        // a directory squatting on the target makes the rename fail
        std::fs::create_dir_all(store.path_for(&digest, &key_id)).unwrap();
        let err = store.write_share_records(&digest, &key_id, &records()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));
        assert_eq!(leftover_temp_files(&dir), 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_renamed_file_fails_to_unseal() {
        let dir = scratch_dir();
        let store = SealedFileShareStore::new(&dir, Zeroizing::new([9u8; 32]));
        let (digest, key_id, other_id) = (ConfigDigest([1; 32]), KeyId([2; 32]), KeyId([3; 32]));
        store.write_share_records(&digest, &key_id, &records()).await.unwrap();

        std::fs::rename(store.path_for(&digest, &key_id), store.path_for(&digest, &other_id)).unwrap();
        assert!(store.read_share_records(&digest, &other_id).await.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
