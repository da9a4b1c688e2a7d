use crate::audit::{RoundAuditLog, RoundAuditRecord, RoundEvent};
use crate::types::KeyId;

#[test]
fn test_audit_log_adds_and_retrieves() {
    let log = RoundAuditLog::new(10);

    log.log(
        RoundAuditRecord::new(RoundEvent::Started, "round started")
            .round("round_1")
            .player(2)
            .key(KeyId([1; 32])),
    );

    let recent = log.recent(1);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].round_id.as_deref(), Some("round_1"));
    assert_eq!(recent[0].message, "round started");
    assert_eq!(recent[0].to_string(), "[STARTED] round_1 (P#2) :: round started");
    assert!(chrono::DateTime::parse_from_rfc3339(&recent[0].timestamp).is_ok());
}

#[test]
fn test_audit_log_eviction() {
    let log = RoundAuditLog::new(3);

    for i in 0..5 {
        log.log(
            RoundAuditRecord::new(RoundEvent::Rejected, format!("rejected P#{}", i))
                .round(format!("round_{}", i))
                .player(i as u8),
        );
    }

    let recent = log.recent(5);
    assert_eq!(recent.len(), 3); // oldest two evicted
    assert_eq!(recent[0].round_id.as_deref(), Some("round_4"));
    assert_eq!(recent[2].round_id.as_deref(), Some("round_2"));
    assert_eq!(log.len(), 3);
}

#[test]
fn test_audit_log_thread_safety() {
    use std::thread;

    let log = RoundAuditLog::new(100);

    thread::scope(|s| {
        for i in 0..10 {
            let log = &log;
            s.spawn(move || {
                log.log(RoundAuditRecord::new(RoundEvent::Completed, format!("thread event {}", i)).player(i as u8));
            });
        }
    });

    let recent = log.recent(10);
    assert_eq!(recent.len(), 10);
}
