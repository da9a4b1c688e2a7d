//! The round factory: hands out at most one live DKG round at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{RoundAuditLog, RoundAuditRecord, RoundEvent};
use crate::crypto::groups::encryption_group_names;
use crate::crypto::translation::translator_names;
use crate::dkg::args::{RoundArgs, RoundServices};
use crate::dkg::config::{RoundFactoryCapabilities, sanity_check_configs, unmarshal_plugin_config};
use crate::dkg::contract::{KeyConsumer, OnchainContract};
use crate::dkg::local::LocalKeys;
use crate::dkg::round::{CompletionHandle, DkgRound};
use crate::dkg::scope::RoundScope;
use crate::dkg::types::{Randomness, RoundInfo, RoundLimits, RoundOutcome, RoundParams, SharedRandomness};
use crate::error::DkgError;
use crate::types::{KeyId, MAX_PLAYER};
use crate::vault::SharePersistence;

/// Factory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub limits: RoundLimits,
    /// Keep a handle on the most recent round for inspection.
    pub test_mode: bool,
    /// Encryption groups this factory accepts; `None` accepts every registered group.
    pub encryption_groups: Option<Vec<String>>,
    /// Point translations this factory accepts; `None` accepts every registered one.
    pub translators: Option<Vec<String>>,
}

struct LiveRound {
    generation: u64,
    scope: RoundScope,
    round: Weak<DkgRound>,
}

/// State shared between the factory and the completion callbacks of its rounds.
struct FactoryShared {
    /// Generation of the round in progress, if any.
    in_progress: RwLock<Option<u64>>,
    next_generation: AtomicU64,
    live: Mutex<Option<LiveRound>>,
    last_round: Mutex<Weak<DkgRound>>,
    audit: RoundAuditLog,
}

impl FactoryShared {
    fn mark_completed(&self, generation: u64) {
        {
            let mut in_progress = self.in_progress.write().unwrap_or_else(PoisonError::into_inner);
            if *in_progress == Some(generation) {
                *in_progress = None;
            }
        }
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.as_ref().is_some_and(|l| l.generation == generation) {
            *live = None;
        }
    }
}

/// Clears the in-progress flag unless construction got far enough to hand
/// the round (and its completion callback) to the caller. Also stops any
/// recovery still running for the abandoned round.
struct InProgressGuard {
    shared: Arc<FactoryShared>,
    generation: u64,
    scope: RoundScope,
    armed: bool,
}

impl InProgressGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        if self.armed {
            self.scope.cancel();
            self.shared.mark_completed(self.generation);
        }
    }
}

pub struct DkgRoundFactory {
    shared: Arc<FactoryShared>,
    keys: Arc<LocalKeys>,
    contract: Arc<dyn OnchainContract>,
    persistence: Arc<dyn SharePersistence>,
    key_consumer: RwLock<Arc<dyn KeyConsumer>>,
    randomness: SharedRandomness,
    config: FactoryConfig,
}

impl DkgRoundFactory {
    pub fn new(
        keys: LocalKeys,
        contract: Arc<dyn OnchainContract>,
        persistence: Arc<dyn SharePersistence>,
        key_consumer: Arc<dyn KeyConsumer>,
        config: FactoryConfig,
    ) -> Self {
        DkgRoundFactory {
            shared: Arc::new(FactoryShared {
                in_progress: RwLock::new(None),
                next_generation: AtomicU64::new(0),
                live: Mutex::new(None),
                last_round: Mutex::new(Weak::new()),
                audit: RoundAuditLog::default(),
            }),
            keys: Arc::new(keys),
            contract,
            persistence,
            key_consumer: RwLock::new(key_consumer),
            randomness: Randomness::shared(OsRng),
            config,
        }
    }

    /// Replace the randomness source used by future rounds.
    pub fn with_randomness(mut self, randomness: SharedRandomness) -> Self {
        self.randomness = randomness;
        self
    }

    /// Build the round for `params`. Fails immediately if another round is
    /// still in progress; rejected requests are not queued.
    pub async fn start_round(&self, params: RoundParams) -> Result<(Arc<DkgRound>, RoundInfo), DkgError> {
        let generation = match self.acquire(&params) {
            Ok(generation) => generation,
            Err(e) => {
                warn!(player = params.player, players = params.n, error = %e, "DKG round rejected");
                self.shared.audit.log(RoundAuditRecord::new(RoundEvent::Rejected, e.to_string()).player(params.player));
                return Err(e);
            }
        };
        let scope = RoundScope::new();
        let guard = InProgressGuard { shared: self.shared.clone(), generation, scope: scope.clone(), armed: true };

        match self.build_round(&params, generation, scope).await {
            Ok(built) => {
                guard.disarm();
                Ok(built)
            }
            Err(e) => {
                warn!(player = params.player, error = %e, "could not construct DKG round");
                self.shared.audit.log(
                    RoundAuditRecord::new(RoundEvent::Failed, format!("construction failed: {e}"))
                        .player(params.player)
                        .key(self.keys.key_id),
                );
                Err(e)
            }
        }
    }

    /// Check-and-set of the in-progress flag, under one write lock.
    fn acquire(&self, params: &RoundParams) -> Result<u64, DkgError> {
        let mut in_progress = self.shared.in_progress.write().unwrap_or_else(PoisonError::into_inner);
        if in_progress.is_some() {
            return Err(DkgError::RoundAlreadyInProgress);
        }
        if params.n > MAX_PLAYER as usize {
            return Err(DkgError::TooManyPlayers { players: params.n, max: MAX_PLAYER as usize });
        }
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        *in_progress = Some(generation);
        Ok(generation)
    }

    async fn build_round(
        &self,
        params: &RoundParams,
        generation: u64,
        scope: RoundScope,
    ) -> Result<(Arc<DkgRound>, RoundInfo), DkgError> {
        let config = unmarshal_plugin_config(&params.offchain_config, &params.onchain_config)?;
        sanity_check_configs(&config, self)?;

        let key_consumer = self.key_consumer();
        let services = RoundServices {
            contract: self.contract.clone(),
            persistence: self.persistence.clone(),
            key_consumer: key_consumer.clone(),
            randomness: self.randomness.clone(),
        };
        *self.shared.live.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(LiveRound { generation, scope: scope.clone(), round: Weak::new() });

        let args = RoundArgs::new(&config, params, self.keys.clone(), services, self.config.limits, scope)?;

        let completion = {
            let shared = Arc::downgrade(&self.shared);
            CompletionHandle::new(move |outcome| {
                if let Some(shared) = shared.upgrade() {
                    let event = match &outcome {
                        RoundOutcome::Completed => RoundEvent::Completed,
                        RoundOutcome::Failed(_) => RoundEvent::Failed,
                        RoundOutcome::Cancelled => RoundEvent::Cancelled,
                    };
                    shared.mark_completed(generation);
                    shared.audit.log(RoundAuditRecord::new(event, format!("{outcome:?}")));
                }
            })
        };

        debug!(player = params.player, key_id = %config.key_id, "constructing share set");
        let round = DkgRound::new(args, completion).await?;
        debug!(round_id = %round.round_id(), "finished constructing share set");

        if let Some(live) = self.shared.live.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            if live.generation == generation {
                live.round = Arc::downgrade(&round);
            }
        }
        if self.config.test_mode {
            *self.shared.last_round.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&round);
        }

        let record = RoundAuditRecord::new(RoundEvent::Started, format!("round started at phase {}", round.phase()))
            .round(round.round_id())
            .player(params.player)
            .key(round.key_id());
        self.shared.audit.log(record);

        if !round.is_cancelled() {
            key_consumer.key_invalidated(round.key_id());
            if let Some(key_data) = round.key_data() {
                self.shared.audit.log(
                    RoundAuditRecord::new(RoundEvent::Recovered, "key share recovered from persistence")
                        .round(round.round_id())
                        .player(params.player)
                        .key(round.key_id()),
                );
                key_consumer.key_generated(key_data);
            }
        }

        info!(round_id = %round.round_id(), player = params.player, players = params.n, "DKG round started");
        let info = RoundInfo {
            name: format!("dkg instance {}", round.self_idx()),
            limits: self.config.limits,
            unique_reports: true,
        };
        Ok((round, info))
    }

    /// Used by rounds started after this call.
    pub fn set_key_consumer(&self, key_consumer: Arc<dyn KeyConsumer>) {
        *self.key_consumer.write().unwrap_or_else(PoisonError::into_inner) = key_consumer;
    }

    fn key_consumer(&self) -> Arc<dyn KeyConsumer> {
        self.key_consumer.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn round_in_progress(&self) -> bool {
        self.shared.in_progress.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Cancel whatever round is live, including one still being constructed.
    /// Returns whether there was one.
    pub fn cancel_current_round(&self) -> bool {
        // completion takes the same lock, so release it before cancelling
        let (round, scope) = {
            let live = self.shared.live.lock().unwrap_or_else(PoisonError::into_inner);
            match live.as_ref() {
                Some(live) => (live.round.upgrade(), live.scope.clone()),
                None => return false,
            }
        };
        match round {
            Some(round) => round.cancel(),
            None => scope.cancel(),
        }
        true
    }

    /// The most recently started round, when test mode is on and it is still alive.
    pub fn last_round_for_testing(&self) -> Option<Arc<DkgRound>> {
        if !self.config.test_mode {
            return None;
        }
        self.shared.last_round.lock().unwrap_or_else(PoisonError::into_inner).upgrade()
    }

    pub fn audit(&self) -> &RoundAuditLog {
        &self.shared.audit
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }
}

impl RoundFactoryCapabilities for DkgRoundFactory {
    fn supports_encryption_group(&self, name: &str) -> bool {
        match &self.config.encryption_groups {
            Some(allowed) => allowed.iter().any(|g| g == name),
            None => encryption_group_names().iter().any(|g| *g == name),
        }
    }

    fn supports_translator(&self, name: &str) -> bool {
        match &self.config.translators {
            Some(allowed) => allowed.iter().any(|t| t == name),
            None => translator_names().iter().any(|t| *t == name),
        }
    }

    fn key_id(&self) -> KeyId {
        self.keys.key_id
    }
}
