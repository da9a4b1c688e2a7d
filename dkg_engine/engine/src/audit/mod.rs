use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::types::KeyId;

/// Type of round event being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    Started,
    Rejected,
    Recovered,
    Completed,
    Failed,
    Cancelled,
}

impl RoundEvent {
    pub fn label(self) -> &'static str {
        match self {
            RoundEvent::Started => "STARTED",
            RoundEvent::Rejected => "REJECTED",
            RoundEvent::Recovered => "RECOVERED",
            RoundEvent::Completed => "COMPLETED",
            RoundEvent::Failed => "FAILED",
            RoundEvent::Cancelled => "CANCELLED",
        }
    }
}

/// Record of a round lifecycle event
#[derive(Debug, Clone)]
pub struct RoundAuditRecord {
    pub event: RoundEvent,
    /// Absent for requests rejected before a round was built.
    pub round_id: Option<String>,
    pub player: Option<u8>,
    pub key_id: Option<KeyId>,
    pub message: String,
    pub timestamp: String, // RFC3339
}

impl RoundAuditRecord {
    pub fn new(event: RoundEvent, message: impl Into<String>) -> Self {
        RoundAuditRecord {
            event,
            round_id: None,
            player: None,
            key_id: None,
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn round(mut self, round_id: impl ToString) -> Self {
        self.round_id = Some(round_id.to_string());
        self
    }

    pub fn player(mut self, player: u8) -> Self {
        self.player = Some(player);
        self
    }

    pub fn key(mut self, key_id: KeyId) -> Self {
        self.key_id = Some(key_id);
        self
    }
}

impl fmt::Display for RoundAuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.event.label(), self.round_id.as_deref().unwrap_or("-"))?;
        if let Some(player) = self.player {
            write!(f, " (P#{player})")?;
        }
        write!(f, " :: {}", self.message)
    }
}

/// Bounded in-memory trail of round events, oldest evicted first.
pub struct RoundAuditLog {
    records: Mutex<VecDeque<RoundAuditRecord>>,
    max_entries: usize,
}

impl RoundAuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self { records: Mutex::new(VecDeque::with_capacity(max_entries)), max_entries }
    }

    /// Record a new event in the audit log
    pub fn log(&self, record: RoundAuditRecord) {
        let key_id = record.key_id.map(|k| k.to_string()).unwrap_or_else(|| "-".into());
        info!(
            target: "dkg_engine::audit",
            event = record.event.label(),
            round_id = record.round_id.as_deref().unwrap_or("-"),
            player = ?record.player,
            key_id = %key_id,
            timestamp = %record.timestamp,
            "{}",
            record.message
        );

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if self.max_entries == 0 {
            return;
        }
        if records.len() == self.max_entries {
            records.pop_front(); // evict oldest
        }
        records.push_back(record);
    }

    /// Most recent events first.
    pub fn recent(&self, count: usize) -> Vec<RoundAuditRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RoundAuditLog {
    fn default() -> Self {
        Self::new(500)
    }
}

/// Helper to get current timestamp as RFC3339 string
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
