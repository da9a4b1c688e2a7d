//! Plugin configuration: the offchain/onchain blobs a round is built from,
//! and the checks that decide whether this factory can serve them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::groups::{EncryptionGroup, encryption_group};
use crate::crypto::signing::parse_verifying_key;
use crate::crypto::translation::{PointTranslation, translator};
use crate::error::ConfigError;
use crate::types::{KeyId, MAX_PLAYER};

/// Decoded round configuration. Immutable once built.
#[derive(Clone)]
pub struct PluginConfig {
    pub encryption_public_keys: Vec<[u8; 32]>,
    pub signing_public_keys: Vec<[u8; 32]>,
    pub encryption_group: &'static dyn EncryptionGroup,
    pub translator: &'static dyn PointTranslation,
    pub key_id: KeyId,
}

impl PartialEq for PluginConfig {
    fn eq(&self, other: &Self) -> bool {
        self.encryption_public_keys == other.encryption_public_keys
            && self.signing_public_keys == other.signing_public_keys
            && self.encryption_group.name() == other.encryption_group.name()
            && self.translator.name() == other.translator.name()
            && self.key_id == other.key_id
    }
}

impl fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfig")
            .field("players", &self.encryption_public_keys.len())
            .field("encryption_group", &self.encryption_group.name())
            .field("translator", &self.translator.name())
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Offchain config as it travels through the reporting engine.
#[derive(Serialize, Deserialize)]
struct OffchainConfigWire {
    encryption_public_keys: Vec<[u8; 32]>,
    signing_public_keys: Vec<[u8; 32]>,
    encryption_group: String,
    translator: String,
}

pub fn new_plugin_config(
    encryption_public_keys: Vec<[u8; 32]>,
    signing_public_keys: Vec<[u8; 32]>,
    encryption_group: &'static dyn EncryptionGroup,
    translator: &'static dyn PointTranslation,
    key_id: KeyId,
) -> PluginConfig {
    PluginConfig { encryption_public_keys, signing_public_keys, encryption_group, translator, key_id }
}

/// Encode the offchain half of a plugin config.
pub fn offchain_config(
    encryption_public_keys: &[[u8; 32]],
    signing_public_keys: &[[u8; 32]],
    encryption_group: &dyn EncryptionGroup,
    translator: &dyn PointTranslation,
) -> Result<Vec<u8>, ConfigError> {
    check_key_counts(encryption_public_keys.len(), signing_public_keys.len())?;
    let wire = OffchainConfigWire {
        encryption_public_keys: encryption_public_keys.to_vec(),
        signing_public_keys: signing_public_keys.to_vec(),
        encryption_group: encryption_group.name().to_string(),
        translator: translator.name().to_string(),
    };
    encode_wire(&wire)
}

fn encode_wire<T: Serialize>(wire: &T) -> Result<Vec<u8>, ConfigError> {
    bincode::serialize(wire).map_err(|e| ConfigError::Encode(e.to_string()))
}

/// The onchain half is just the key id.
pub fn onchain_config(key_id: &KeyId) -> Vec<u8> {
    key_id.0.to_vec()
}

pub fn decode_onchain_config(onchain: &[u8]) -> Result<KeyId, ConfigError> {
    let bytes: [u8; 32] = onchain
        .try_into()
        .map_err(|_| ConfigError::OnchainLength { expected: 32, actual: onchain.len() })?;
    Ok(KeyId(bytes))
}

pub fn unmarshal_plugin_config(offchain: &[u8], onchain: &[u8]) -> Result<PluginConfig, ConfigError> {
    let wire: OffchainConfigWire =
        bincode::deserialize(offchain).map_err(|e| ConfigError::Decode(e.to_string()))?;
    let key_id = decode_onchain_config(onchain)?;

    let group = encryption_group(&wire.encryption_group)
        .ok_or_else(|| ConfigError::UnsupportedEncryptionGroup(wire.encryption_group.clone()))?;
    let translator = translator(&wire.translator)
        .ok_or_else(|| ConfigError::UnsupportedTranslator(wire.translator.clone()))?;

    Ok(new_plugin_config(
        wire.encryption_public_keys,
        wire.signing_public_keys,
        group,
        translator,
        key_id,
    ))
}

/// What a round factory declares it can serve.
pub trait RoundFactoryCapabilities {
    fn supports_encryption_group(&self, name: &str) -> bool;
    fn supports_translator(&self, name: &str) -> bool;
    fn key_id(&self) -> KeyId;
}

fn check_key_counts(encryption: usize, signing: usize) -> Result<(), ConfigError> {
    if encryption != signing {
        return Err(ConfigError::KeyCountMismatch { encryption, signing });
    }
    if encryption == 0 || encryption > MAX_PLAYER as usize {
        return Err(ConfigError::PlayerCount { count: encryption, max: MAX_PLAYER as usize });
    }
    Ok(())
}

/// Check a decoded config against the factory that is about to use it.
pub fn sanity_check_configs(
    config: &PluginConfig,
    factory: &dyn RoundFactoryCapabilities,
) -> Result<(), ConfigError> {
    let group = config.encryption_group.name();
    if !factory.supports_encryption_group(group) {
        return Err(ConfigError::UnsupportedEncryptionGroup(group.to_string()));
    }
    let translator = config.translator.name();
    if !factory.supports_translator(translator) {
        return Err(ConfigError::UnsupportedTranslator(translator.to_string()));
    }

    check_key_counts(config.encryption_public_keys.len(), config.signing_public_keys.len())?;

    for (i, key) in config.encryption_public_keys.iter().enumerate() {
        if !config.encryption_group.is_valid_public_key(key) {
            return Err(ConfigError::InvalidEncryptionKey(i));
        }
    }
    for (i, key) in config.signing_public_keys.iter().enumerate() {
        parse_verifying_key(key).map_err(|_| ConfigError::InvalidSigningKey(i))?;
    }

    if config.key_id != factory.key_id() {
        return Err(ConfigError::KeyIdMismatch);
    }
    Ok(())
}
