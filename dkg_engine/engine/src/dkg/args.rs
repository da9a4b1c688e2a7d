//! Everything a round is built from, and the checks run before one exists.

use std::fmt;
use std::sync::Arc;

use crate::crypto::groups::EncryptionGroup;
use crate::crypto::translation::PointTranslation;
use crate::dkg::config::PluginConfig;
use crate::dkg::contract::{KeyConsumer, OnchainContract};
use crate::dkg::local::LocalKeys;
use crate::dkg::scope::RoundScope;
use crate::dkg::types::{RoundLimits, RoundParams, SharedRandomness};
use crate::error::DkgError;
use crate::types::{ConfigDigest, KeyId, MAX_PLAYER, PlayerIdx};
use crate::vault::SharePersistence;

/// Immutable per-round protocol context.
pub struct RoundContext {
    pub threshold: usize,
    pub players: usize,
    pub self_idx: PlayerIdx,
    pub config_digest: ConfigDigest,
    pub key_id: KeyId,
    pub(crate) keys: Arc<LocalKeys>,
    pub encryption_public_keys: Vec<[u8; 32]>,
    pub signing_public_keys: Vec<[u8; 32]>,
    pub encryption_group: &'static dyn EncryptionGroup,
    pub translator: &'static dyn PointTranslation,
    pub limits: RoundLimits,
}

impl fmt::Debug for RoundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundContext")
            .field("threshold", &self.threshold)
            .field("players", &self.players)
            .field("self_idx", &self.self_idx)
            .field("config_digest", &self.config_digest)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Shared capabilities a round calls out to.
#[derive(Clone)]
pub struct RoundServices {
    pub contract: Arc<dyn OnchainContract>,
    pub persistence: Arc<dyn SharePersistence>,
    pub key_consumer: Arc<dyn KeyConsumer>,
    pub randomness: SharedRandomness,
}

pub struct RoundArgs {
    pub context: RoundContext,
    pub services: RoundServices,
    pub scope: RoundScope,
}

impl RoundArgs {
    /// Combine a decoded config with the engine's parameters. The threshold
    /// of the generated key is the engine's fault tolerance `f`.
    pub fn new(
        config: &PluginConfig,
        params: &RoundParams,
        keys: Arc<LocalKeys>,
        services: RoundServices,
        limits: RoundLimits,
        scope: RoundScope,
    ) -> Result<Self, DkgError> {
        let self_idx = PlayerIdx::new(params.player as usize)?;
        let context = RoundContext {
            threshold: params.f,
            players: params.n,
            self_idx,
            config_digest: params.config_digest,
            key_id: config.key_id,
            keys,
            encryption_public_keys: config.encryption_public_keys.clone(),
            signing_public_keys: config.signing_public_keys.clone(),
            encryption_group: config.encryption_group,
            translator: config.translator,
            limits,
        };
        Ok(RoundArgs { context, services, scope })
    }

    pub fn sanity_check(&self) -> Result<(), DkgError> {
        let ctx = &self.context;
        let invalid = |msg: String| Err(DkgError::InvalidRoundArgs(msg));

        if ctx.encryption_public_keys.len() != ctx.players || ctx.signing_public_keys.len() != ctx.players {
            return invalid(format!(
                "{} players but {} encryption keys and {} signing keys",
                ctx.players,
                ctx.encryption_public_keys.len(),
                ctx.signing_public_keys.len()
            ));
        }
        if ctx.players > MAX_PLAYER as usize {
            return invalid(format!("{} players exceeds maximum of {}", ctx.players, MAX_PLAYER));
        }
        if ctx.self_idx.as_usize() >= ctx.players {
            return invalid(format!("own index {} not among {} players", ctx.self_idx, ctx.players));
        }
        // 2t < n, with f as the engine sent it
        if ctx.threshold >= ctx.players.div_ceil(2) {
            return invalid(format!("threshold {} too large for {} players", ctx.threshold, ctx.players));
        }
        if ctx.keys.key_id != ctx.key_id {
            return invalid("local keys serve a different key id".into());
        }

        let own = ctx.self_idx.as_usize();
        if ctx.encryption_group.public_key(&ctx.keys.encryption_secret) != ctx.encryption_public_keys[own] {
            return invalid("encryption secret does not match own encryption public key".into());
        }
        if ctx.keys.signing_public_key() != ctx.signing_public_keys[own] {
            return invalid("signing secret does not match own signing public key".into());
        }
        Ok(())
    }
}
