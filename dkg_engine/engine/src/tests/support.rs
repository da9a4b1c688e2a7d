// Shared fixtures for round scenarios: deterministic player keys, recording
// consumers and misbehaving stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::SigningKey;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::crypto::groups::{ED25519_GROUP, encryption_group};
use crate::crypto::translation::{COMPRESSED_EDWARDS, translator};
use crate::dkg::config::{offchain_config, onchain_config};
use crate::dkg::types::Randomness;
use crate::dkg::{
    DkgRound, DkgRoundFactory, FactoryConfig, KeyConsumer, KeyData, LocalKeys, MemoryContract,
    OnchainContract, RoundParams,
};
use crate::error::{DkgError, PersistenceError};
use crate::types::{ConfigDigest, KeyId, PlayerIdx};
use crate::vault::{MemoryShareStore, SharePersistence, ShareRecord};

pub const KEY_ID: KeyId = KeyId([0x4b; 32]);
pub const DIGEST: ConfigDigest = ConfigDigest([0xd1; 32]);

pub struct PlayerSecrets {
    pub encryption_secret: [u8; 32],
    pub signing_seed: [u8; 32],
}

/// Keys and encoded configuration for an `n`-player committee.
pub struct Committee {
    pub players: Vec<PlayerSecrets>,
    pub offchain: Vec<u8>,
    pub onchain: Vec<u8>,
}

impl Committee {
    pub fn new(n: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let group = encryption_group(ED25519_GROUP).unwrap();
        let translator = translator(COMPRESSED_EDWARDS).unwrap();

        let mut players = Vec::with_capacity(n);
        let (mut epks, mut spks) = (Vec::new(), Vec::new());
        for _ in 0..n {
            let secret = Scalar::random(&mut rng);
            let mut signing_seed = [0u8; 32];
            rng.fill_bytes(&mut signing_seed);

            epks.push(group.public_key(&secret));
            spks.push(SigningKey::from_bytes(&signing_seed).verifying_key().to_bytes());
            players.push(PlayerSecrets { encryption_secret: secret.to_bytes(), signing_seed });
        }

        let offchain = offchain_config(&epks, &spks, group, translator).unwrap();
        Committee { players, offchain, onchain: onchain_config(&KEY_ID) }
    }

    pub fn n(&self) -> usize {
        self.players.len()
    }

    pub fn local_keys(&self, player: usize) -> LocalKeys {
        let p = &self.players[player];
        LocalKeys::new(p.encryption_secret, p.signing_seed, KEY_ID).unwrap()
    }

    pub fn params(&self, player: usize, f: usize) -> RoundParams {
        RoundParams {
            config_digest: DIGEST,
            player: player as u8,
            n: self.n(),
            f,
            offchain_config: self.offchain.clone(),
            onchain_config: self.onchain.clone(),
        }
    }

    pub fn factory(
        &self,
        player: usize,
        contract: Arc<dyn OnchainContract>,
        store: Arc<dyn SharePersistence>,
        consumer: Arc<dyn KeyConsumer>,
    ) -> DkgRoundFactory {
        let config = FactoryConfig { test_mode: true, ..FactoryConfig::default() };
        DkgRoundFactory::new(self.local_keys(player), contract, store, consumer, config)
            .with_randomness(Randomness::shared(StdRng::seed_from_u64(1000 + player as u64)))
    }
}

#[derive(Default)]
pub struct RecordingConsumer {
    pub invalidated: Mutex<Vec<KeyId>>,
    pub generated: Mutex<Vec<Arc<KeyData>>>,
    /// "invalidated"/"generated" in call order.
    pub calls: Mutex<Vec<&'static str>>,
}

impl KeyConsumer for RecordingConsumer {
    fn key_invalidated(&self, key_id: KeyId) {
        self.invalidated.lock().unwrap().push(key_id);
        self.calls.lock().unwrap().push("invalidated");
    }

    fn key_generated(&self, key_data: Arc<KeyData>) {
        self.generated.lock().unwrap().push(key_data);
        self.calls.lock().unwrap().push("generated");
    }
}

/// Rejects every write; reads see nothing.
pub struct FailingStore;

#[async_trait]
impl SharePersistence for FailingStore {
    async fn write_share_records(
        &self,
        _config_digest: &ConfigDigest,
        _key_id: &KeyId,
        _records: &[ShareRecord],
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::Storage("disk full".into()))
    }

    async fn read_share_records(
        &self,
        _config_digest: &ConfigDigest,
        _key_id: &KeyId,
    ) -> Result<Vec<ShareRecord>, PersistenceError> {
        Ok(Vec::new())
    }
}

pub struct BrokenContract;

#[async_trait]
impl OnchainContract for BrokenContract {
    async fn published_key(&self, _key_id: &KeyId) -> Result<Option<Vec<u8>>, DkgError> {
        Err(DkgError::Contract("rpc unavailable".into()))
    }
}

/// Reports every key as unpublished after `delay`, noting whether any
/// lookup ran that long.
pub struct SlowContract {
    delay: Duration,
    answered: AtomicBool,
}

impl SlowContract {
    pub fn new(delay: Duration) -> Self {
        SlowContract { delay, answered: AtomicBool::new(false) }
    }

    pub fn answered(&self) -> bool {
        self.answered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnchainContract for SlowContract {
    async fn published_key(&self, _key_id: &KeyId) -> Result<Option<Vec<u8>>, DkgError> {
        tokio::time::sleep(self.delay).await;
        self.answered.store(true, Ordering::SeqCst);
        Ok(None)
    }
}

/// One player's view of a committee-wide round.
pub struct Node {
    pub factory: DkgRoundFactory,
    pub store: Arc<MemoryShareStore>,
    pub consumer: Arc<RecordingConsumer>,
    pub round: Arc<DkgRound>,
}

/// Start a round on every player, each with its own store and consumer.
pub async fn start_committee(committee: &Committee, f: usize, contract: Arc<MemoryContract>) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(committee.n());
    for i in 0..committee.n() {
        let store = Arc::new(MemoryShareStore::new());
        let consumer = Arc::new(RecordingConsumer::default());
        let factory = committee.factory(i, contract.clone(), store.clone(), consumer.clone());
        let (round, _) = factory.start_round(committee.params(i, f)).await.unwrap();
        nodes.push(Node { factory, store, consumer, round });
    }
    nodes
}

/// Exchange every player's dealing with every other player.
pub fn exchange_dealings(rounds: &[Arc<DkgRound>]) {
    let observations: Vec<_> = rounds.iter().map(|r| r.observation().unwrap()).collect();
    for (i, round) in rounds.iter().enumerate() {
        for (dealer, observation) in observations.iter().enumerate() {
            if dealer != i {
                round.ingest(PlayerIdx::new(dealer).unwrap(), observation).unwrap();
            }
        }
    }
}

/// Run fresh generation to completion on every player.
pub async fn generate(committee: &Committee, f: usize, contract: Arc<MemoryContract>) -> Vec<Node> {
    let nodes = start_committee(committee, f, contract).await;
    let rounds: Vec<_> = nodes.iter().map(|n| n.round.clone()).collect();
    exchange_dealings(&rounds);
    for node in &nodes {
        node.round.finalize().await.unwrap();
    }
    nodes
}
