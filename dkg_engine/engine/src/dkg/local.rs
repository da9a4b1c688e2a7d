//! This node's long-term DKG keys and the JSON file they are loaded from.

use std::fmt;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::SigningKey;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::crypto::sharing::decode_scalar;
use crate::error::ConfigError;
use crate::types::KeyId;

/// Long-term secrets of the local player, plus the key id it serves.
pub struct LocalKeys {
    pub(crate) encryption_secret: Zeroizing<Scalar>,
    pub(crate) signing_key: SigningKey,
    pub key_id: KeyId,
}

impl LocalKeys {
    /// `encryption_secret` must be a canonical scalar; `signing_seed` is an
    /// Ed25519 secret key seed.
    pub fn new(encryption_secret: [u8; 32], signing_seed: [u8; 32], key_id: KeyId) -> Result<Self, ConfigError> {
        let encryption_secret = Zeroizing::new(encryption_secret);
        let scalar = decode_scalar(&encryption_secret)
            .ok_or_else(|| ConfigError::LocalKey("encryption secret is not a canonical scalar".into()))?;
        let signing_seed = Zeroizing::new(signing_seed);
        Ok(LocalKeys {
            encryption_secret: Zeroizing::new(scalar),
            signing_key: SigningKey::from_bytes(&signing_seed),
            key_id,
        })
    }

    pub fn signing_public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl fmt::Debug for LocalKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeys")
            .field("signing_public_key", &hex::encode(self.signing_public_key()))
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// On-disk form of [`LocalKeys`].
///
/// ```json
/// { "encryption_secret": "<base64>", "signing_secret": "<base64>", "key_id": "<hex>" }
/// ```
#[derive(Deserialize)]
pub struct LocalKeyConfig {
    pub encryption_secret: String,
    pub signing_secret: String,
    pub key_id: String,
}

impl LocalKeyConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::LocalKey(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = Zeroizing::new(
            std::fs::read_to_string(path)
                .map_err(|e| ConfigError::LocalKey(format!("{}: {e}", path.display())))?,
        );
        Self::from_json_str(&json)
    }

    pub fn into_local_keys(self) -> Result<LocalKeys, ConfigError> {
        let encryption_secret = decode_base64_key("encryption_secret", &self.encryption_secret)?;
        let signing_secret = decode_base64_key("signing_secret", &self.signing_secret)?;

        let key_id = hex::decode(&self.key_id).map_err(|e| ConfigError::LocalKey(format!("key_id: {e}")))?;
        let key_id: [u8; 32] = key_id
            .try_into()
            .map_err(|v: Vec<u8>| ConfigError::LocalKey(format!("key_id must be 32 bytes, got {}", v.len())))?;

        LocalKeys::new(*encryption_secret, *signing_secret, KeyId(key_id))
    }
}

fn decode_base64_key(field: &str, encoded: &str) -> Result<Zeroizing<[u8; 32]>, ConfigError> {
    let bytes = Zeroizing::new(
        STANDARD.decode(encoded.trim()).map_err(|e| ConfigError::LocalKey(format!("{field}: {e}")))?,
    );
    if bytes.len() != 32 {
        return Err(ConfigError::LocalKey(format!("{field} must be 32 bytes, got {}", bytes.len())));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&bytes);
    Ok(key)
}
