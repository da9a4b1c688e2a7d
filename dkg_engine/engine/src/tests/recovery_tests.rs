use std::error::Error as _;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::audit::RoundEvent;
use crate::dkg::{MemoryContract, RoundPhase};
use crate::error::DkgError;
use crate::tests::support::{BrokenContract, Committee, RecordingConsumer, DIGEST, KEY_ID, generate};
use crate::vault::{MemoryShareStore, SealedFileShareStore, SharePersistence};

fn recovery_error(err: DkgError) -> DkgError {
    match err {
        DkgError::RecoveryFailed(inner) => *inner,
        other => panic!("expected recovery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_finalized_key_recovered_from_records() {
    let committee = Committee::new(4, 40);
    let contract = Arc::new(MemoryContract::new());
    let nodes = generate(&committee, 1, contract.clone()).await;
    let generated = nodes[0].round.key_data().unwrap();
    contract.publish(KEY_ID, generated.onchain_public_key.clone());

    for (i, node) in nodes.iter().enumerate() {
        let consumer = Arc::new(RecordingConsumer::default());
        let factory = committee.factory(i, contract.clone(), node.store.clone(), consumer.clone());
        let (round, info) = factory.start_round(committee.params(i, 1)).await.unwrap();

        assert_eq!(info.name, format!("dkg instance {i}"));
        assert_eq!(round.phase(), RoundPhase::Recovered);
        let recovered = round.key_data().unwrap();
        assert_eq!(*recovered, *node.round.key_data().unwrap());
        assert_eq!(recovered.dealers.len(), 4);

        assert_eq!(*consumer.calls.lock().unwrap(), vec!["invalidated", "generated"]);
        assert_eq!(*consumer.generated.lock().unwrap()[0], *recovered);

        // no fresh dealing is produced for a recovered key
        assert!(round.observation().unwrap().is_empty());
        assert_eq!(round.finalize().await.unwrap(), recovered);
        assert_eq!(round.phase(), RoundPhase::Completed);
        assert!(!factory.round_in_progress());

        let events: Vec<_> = factory.audit().recent(10).iter().map(|r| r.event).collect();
        assert!(events.contains(&RoundEvent::Recovered));
    }
}

#[tokio::test]
async fn test_recovery_survives_restart_with_sealed_store() {
    let committee = Committee::new(4, 41);
    let contract = Arc::new(MemoryContract::new());
    let nodes = generate(&committee, 1, contract.clone()).await;
    let generated = nodes[2].round.key_data().unwrap();
    contract.publish(KEY_ID, generated.onchain_public_key.clone());

    let dir = std::env::temp_dir().join(format!("dkg-recovery-{}", uuid::Uuid::new_v4()));
    let sealing_key = [0x5a; 32];
    {
        let records = nodes[2].store.read_share_records(&DIGEST, &KEY_ID).await.unwrap();
        let sealed = SealedFileShareStore::new(&dir, Zeroizing::new(sealing_key));
        sealed.write_share_records(&DIGEST, &KEY_ID, &records).await.unwrap();
    }

    let reopened = Arc::new(SealedFileShareStore::new(&dir, Zeroizing::new(sealing_key)));
    let factory = committee.factory(2, contract, reopened, Arc::new(RecordingConsumer::default()));
    let (round, _) = factory.start_round(committee.params(2, 1)).await.unwrap();
    assert_eq!(round.key_data().unwrap(), generated);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_hash_mismatch_yields_no_round() {
    let committee = Committee::new(4, 42);
    let contract = Arc::new(MemoryContract::new());
    let nodes = generate(&committee, 1, contract.clone()).await;
    contract.publish(KEY_ID, nodes[0].round.key_data().unwrap().onchain_public_key.clone());

    let store = nodes[0].store.clone();
    let mut records = store.read_share_records(&DIGEST, &KEY_ID).await.unwrap();
    records[1].marshaled_share_record[40] ^= 0x01;
    store.write_share_records(&DIGEST, &KEY_ID, &records).await.unwrap();

    let consumer = Arc::new(RecordingConsumer::default());
    let factory = committee.factory(0, contract, store, consumer.clone());
    let err = factory.start_round(committee.params(0, 1)).await.unwrap_err();

    assert_eq!(err.to_string(), "could not reconstruct shares for an available distributed key");
    assert!(err.source().is_some());
    let inner = recovery_error(err);
    assert!(matches!(inner, DkgError::RecordHashMismatch { dealer } if dealer.as_usize() == 1));

    assert!(!factory.round_in_progress());
    assert!(factory.last_round_for_testing().is_none());
    assert!(consumer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_records_fail_recovery() {
    let committee = Committee::new(4, 43);
    let contract = Arc::new(MemoryContract::new());
    contract.publish(KEY_ID, vec![1; 32]);

    let factory = committee.factory(
        0,
        contract,
        Arc::new(MemoryShareStore::new()),
        Arc::new(RecordingConsumer::default()),
    );
    let err = factory.start_round(committee.params(0, 1)).await.unwrap_err();
    assert!(matches!(recovery_error(err), DkgError::NoShareRecords));
    assert!(!factory.round_in_progress());
}

#[tokio::test]
async fn test_published_key_mismatch_fails_recovery() {
    let committee = Committee::new(4, 44);
    let contract = Arc::new(MemoryContract::new());
    let nodes = generate(&committee, 1, contract.clone()).await;
    contract.publish(KEY_ID, vec![7; 32]);

    let factory = committee.factory(1, contract, nodes[1].store.clone(), Arc::new(RecordingConsumer::default()));
    let err = factory.start_round(committee.params(1, 1)).await.unwrap_err();
    assert!(matches!(recovery_error(err), DkgError::KeyMismatch));
}

#[tokio::test]
async fn test_records_for_other_digest_are_not_used() {
    let committee = Committee::new(4, 45);
    let contract = Arc::new(MemoryContract::new());
    let nodes = generate(&committee, 1, contract.clone()).await;
    contract.publish(KEY_ID, nodes[0].round.key_data().unwrap().onchain_public_key.clone());

    let mut params = committee.params(0, 1);
    params.config_digest = crate::types::ConfigDigest([0x99; 32]);
    let factory = committee.factory(0, contract, nodes[0].store.clone(), Arc::new(RecordingConsumer::default()));
    let err = factory.start_round(params).await.unwrap_err();
    assert!(matches!(recovery_error(err), DkgError::NoShareRecords));
}

#[tokio::test]
async fn test_contract_error_is_fatal() {
    let committee = Committee::new(4, 46);
    let factory = committee.factory(
        0,
        Arc::new(BrokenContract),
        Arc::new(MemoryShareStore::new()),
        Arc::new(RecordingConsumer::default()),
    );
    let err = factory.start_round(committee.params(0, 1)).await.unwrap_err();
    assert!(matches!(err, DkgError::Contract(_)));
    assert!(!factory.round_in_progress());
}
