//! A single DKG round: construction (with recovery of already-finalized keys),
//! the generation hooks the reporting engine drives, and exactly-once
//! completion.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dkg::args::{RoundArgs, RoundContext, RoundServices};
use crate::dkg::dealing::{self, Dealing};
use crate::dkg::recovery::{DealingSet, StoredDealing, recover_key_data};
use crate::dkg::scope::RoundScope;
use crate::dkg::types::{KeyData, RoundOutcome, RoundPhase};
use crate::error::DkgError;
use crate::types::{ConfigDigest, KeyId, PlayerIdx};
use crate::vault::ShareRecord;

/// Notifies the round's owner that the round is over. Fires at most once.
pub struct CompletionHandle {
    fired: AtomicBool,
    callback: Box<dyn Fn(RoundOutcome) + Send + Sync>,
}

impl CompletionHandle {
    pub fn new(callback: impl Fn(RoundOutcome) + Send + Sync + 'static) -> Self {
        CompletionHandle { fired: AtomicBool::new(false), callback: Box::new(callback) }
    }

    /// A handle nobody listens to.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Returns whether this call was the one that fired.
    pub(crate) fn fire(&self, outcome: RoundOutcome) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        (self.callback)(outcome);
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

struct RoundState {
    phase: RoundPhase,
    dealings: DealingSet,
    own_dealing: Option<Vec<u8>>,
    key_data: Option<Arc<KeyData>>,
    finalizing: bool,
}

enum InitialCheck {
    Fresh,
    Recovered(KeyData, DealingSet),
}

pub struct DkgRound {
    round_id: Uuid,
    ctx: Arc<RoundContext>,
    services: RoundServices,
    scope: RoundScope,
    completion: CompletionHandle,
    state: Mutex<RoundState>,
}

impl fmt::Debug for DkgRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkgRound")
            .field("round_id", &self.round_id)
            .field("ctx", &self.ctx)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl DkgRound {
    /// Build a round. If the key is already finalized on-chain, this player's
    /// share is recovered from persistence before the round is returned.
    ///
    /// On error no round exists and `completion` is never fired.
    pub async fn new(args: RoundArgs, completion: CompletionHandle) -> Result<Arc<Self>, DkgError> {
        args.sanity_check()?;
        let RoundArgs { context, services, scope } = args;
        let ctx = Arc::new(context);
        let round_id = Uuid::new_v4();
        debug!(
            %round_id,
            player = %ctx.self_idx,
            key_id = %ctx.key_id,
            config_digest = %ctx.config_digest,
            phase = %RoundPhase::Constructing,
            "constructing DKG round"
        );

        let task = {
            let (ctx, services, scope) = (ctx.clone(), services.clone(), scope.clone());
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => Err(DkgError::Cancelled),
                    res = initial_check(round_id, ctx, services) => res,
                }
            })
        };
        let initial = task.await.map_err(|e| DkgError::TaskFailed(e.to_string()))??;

        let (phase, dealings, key_data) = match initial {
            InitialCheck::Fresh => (RoundPhase::GeneratingFresh, DealingSet::new(), None),
            InitialCheck::Recovered(key_data, dealings) => {
                (RoundPhase::Recovered, dealings, Some(Arc::new(key_data)))
            }
        };

        let round = Arc::new(DkgRound {
            round_id,
            ctx,
            services,
            scope,
            completion,
            state: Mutex::new(RoundState { phase, dealings, own_dealing: None, key_data, finalizing: false }),
        });
        watch_cancellation(Arc::downgrade(&round), round.scope.clone());

        info!(%round_id, player = %round.ctx.self_idx, key_id = %round.ctx.key_id, %phase, "DKG round ready");
        Ok(round)
    }

    /// This player's marshaled dealing. Created on first call; recovered rounds
    /// contribute nothing.
    pub fn observation(&self) -> Result<Vec<u8>, DkgError> {
        let mut state = self.lock_state();
        self.ensure_open(&state)?;
        if state.phase == RoundPhase::Recovered {
            return Ok(Vec::new());
        }
        if let Some(own) = &state.own_dealing {
            return Ok(own.clone());
        }

        let dealing = {
            let mut rng = self.services.randomness.lock().unwrap_or_else(PoisonError::into_inner);
            dealing::deal(&self.ctx, &mut *rng)?
        };
        let bytes = dealing.marshal()?;
        let max = self.ctx.limits.max_observation_len;
        if bytes.len() > max {
            return Err(DkgError::ObservationTooLarge { size: bytes.len(), max });
        }

        let own = self.ctx.self_idx;
        let opened = dealing::open(&self.ctx, own, &dealing)?;
        state
            .dealings
            .insert(own, StoredDealing { record: ShareRecord::new(own, bytes.clone()), opened });
        state.own_dealing = Some(bytes.clone());
        debug!(round_id = %self.round_id, player = %own, size = bytes.len(), "created own dealing");
        Ok(bytes)
    }

    /// Accept a peer's dealing.
    pub fn ingest(&self, dealer: PlayerIdx, bytes: &[u8]) -> Result<(), DkgError> {
        let mut state = self.lock_state();
        self.ensure_open(&state)?;
        if state.phase == RoundPhase::Recovered {
            debug!(round_id = %self.round_id, dealer = %dealer, "ignoring dealing for recovered key");
            return Ok(());
        }
        if state.finalizing {
            return Err(DkgError::RoundClosed);
        }

        let max = self.ctx.limits.max_observation_len;
        if bytes.len() > max {
            return Err(DkgError::ObservationTooLarge { size: bytes.len(), max });
        }
        if state.dealings.contains_key(&dealer) {
            return Err(DkgError::DuplicateDealing { dealer });
        }

        let dealing = Dealing::unmarshal(bytes)
            .map_err(|e| DkgError::InvalidDealing { dealer, reason: e.to_string() })?;
        let opened = dealing::open(&self.ctx, dealer, &dealing).inspect_err(|e| {
            warn!(round_id = %self.round_id, dealer = %dealer, error = %e, "rejected dealing");
        })?;
        state
            .dealings
            .insert(dealer, StoredDealing { record: ShareRecord::new(dealer, bytes.to_vec()), opened });
        debug!(round_id = %self.round_id, dealer = %dealer, received = state.dealings.len(), "accepted dealing");
        Ok(())
    }

    /// Combine the accepted dealings, persist them, and hand the key to the
    /// consumer. A persistence failure fails the round.
    pub async fn finalize(&self) -> Result<Arc<KeyData>, DkgError> {
        let (key_data, records) = {
            let mut state = self.lock_state();
            self.ensure_open(&state)?;
            if let (RoundPhase::Recovered, Some(key_data)) = (state.phase, state.key_data.clone()) {
                drop(state);
                self.finish(RoundPhase::Completed, RoundOutcome::Completed);
                return Ok(key_data);
            }
            if state.finalizing {
                return Err(DkgError::RoundClosed);
            }

            let key_data = dealing::combine(&self.ctx, state.dealings.values().map(|d| &d.opened))?;
            let records: Vec<ShareRecord> = state.dealings.values().map(|d| d.record.clone()).collect();
            state.finalizing = true;
            (Arc::new(key_data), records)
        };

        if self.scope.is_cancelled() {
            return Err(DkgError::Cancelled);
        }
        if let Err(e) = self
            .services
            .persistence
            .write_share_records(&self.ctx.config_digest, &self.ctx.key_id, &records)
            .await
        {
            error!(round_id = %self.round_id, key_id = %self.ctx.key_id, error = %e, "failed to persist share records");
            let err = DkgError::PersistenceWrite(e);
            self.finish(RoundPhase::Failed, RoundOutcome::Failed(err.to_string()));
            return Err(err);
        }

        {
            let mut state = self.lock_state();
            if state.phase.is_terminal() || self.scope.is_cancelled() {
                return Err(DkgError::Cancelled);
            }
            state.key_data = Some(key_data.clone());
        }
        self.services.key_consumer.key_generated(key_data.clone());
        info!(
            round_id = %self.round_id,
            key_id = %self.ctx.key_id,
            dealers = key_data.dealers.len(),
            public_key = %hex::encode(key_data.public_key),
            "distributed key generated"
        );
        self.finish(RoundPhase::Completed, RoundOutcome::Completed);
        Ok(key_data)
    }

    /// End the round without a key. No-op once terminal.
    pub fn close(&self) {
        self.finish(RoundPhase::Failed, RoundOutcome::Cancelled);
    }

    pub fn cancel(&self) {
        debug!(round_id = %self.round_id, "round cancelled");
        self.finish(RoundPhase::Failed, RoundOutcome::Cancelled);
    }

    pub fn round_id(&self) -> Uuid {
        self.round_id
    }

    pub fn phase(&self) -> RoundPhase {
        self.lock_state().phase
    }

    pub fn self_idx(&self) -> PlayerIdx {
        self.ctx.self_idx
    }

    pub fn key_id(&self) -> KeyId {
        self.ctx.key_id
    }

    pub fn config_digest(&self) -> ConfigDigest {
        self.ctx.config_digest
    }

    pub fn threshold(&self) -> usize {
        self.ctx.threshold
    }

    /// Generated or recovered key material, once available.
    pub fn key_data(&self) -> Option<Arc<KeyData>> {
        self.lock_state().key_data.clone()
    }

    pub fn dealings_received(&self) -> usize {
        self.lock_state().dealings.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    fn lock_state(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self, state: &RoundState) -> Result<(), DkgError> {
        if state.phase.is_terminal() {
            return Err(DkgError::RoundClosed);
        }
        if self.scope.is_cancelled() {
            return Err(DkgError::Cancelled);
        }
        Ok(())
    }

    /// Move to a terminal phase and notify the owner. Only the first call has
    /// any effect on phase or completion.
    fn finish(&self, phase: RoundPhase, outcome: RoundOutcome) {
        let transitioned = {
            let mut state = self.lock_state();
            if state.phase.is_terminal() {
                false
            } else {
                state.phase = phase;
                true
            }
        };
        self.scope.cancel();
        if transitioned && self.completion.fire(outcome.clone()) {
            info!(round_id = %self.round_id, key_id = %self.ctx.key_id, %phase, ?outcome, "DKG round finished");
        }
    }
}

impl Drop for DkgRound {
    fn drop(&mut self) {
        self.finish(RoundPhase::Failed, RoundOutcome::Cancelled);
    }
}

async fn initial_check(
    round_id: Uuid,
    ctx: Arc<RoundContext>,
    services: RoundServices,
) -> Result<InitialCheck, DkgError> {
    let Some(published) = services.contract.published_key(&ctx.key_id).await? else {
        debug!(%round_id, key_id = %ctx.key_id, phase = %RoundPhase::GeneratingFresh, "key not finalized on-chain");
        return Ok(InitialCheck::Fresh);
    };

    info!(%round_id, key_id = %ctx.key_id, phase = %RoundPhase::Recovering, "key finalized on-chain, recovering share");
    let (key_data, dealings) = recover_key_data(&ctx, services.persistence.as_ref(), &published)
        .await
        .map_err(|e| {
            error!(%round_id, key_id = %ctx.key_id, error = %e, "share recovery failed");
            DkgError::RecoveryFailed(Box::new(e))
        })?;
    Ok(InitialCheck::Recovered(key_data, dealings))
}

/// Fail the round as soon as its scope is cancelled from outside.
fn watch_cancellation(round: Weak<DkgRound>, scope: RoundScope) {
    tokio::spawn(async move {
        scope.cancelled().await;
        if let Some(round) = round.upgrade() {
            round.finish(RoundPhase::Failed, RoundOutcome::Cancelled);
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_completion_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = {
            let count = count.clone();
            CompletionHandle::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(handle.fire(RoundOutcome::Completed));
        assert!(!handle.fire(RoundOutcome::Cancelled));
        assert!(handle.has_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
