//! Request attempt log.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::health::passive::AttemptOutcome;
use crate::registry::ProviderId;

pub const DEFAULT_ATTEMPT_LOG_CAPACITY: usize = 1_000;

/// One provider attempt, live or probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub provider: ProviderId,
    /// Request URL without query string.
    pub endpoint: String,
    pub started_at_unix_ms: u64,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    pub used_proxy: bool,
    pub probe: bool,
}

impl AttemptRecord {
    pub fn new(
        provider: ProviderId,
        endpoint: String,
        started_at: SystemTime,
        duration: Duration,
        outcome: AttemptOutcome,
        used_proxy: bool,
    ) -> Self {
        Self {
            provider,
            endpoint,
            started_at_unix_ms: started_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            duration_ms: duration.as_millis() as u64,
            outcome,
            used_proxy,
            probe: false,
        }
    }

    pub fn as_probe(mut self) -> Self {
        self.probe = true;
        self
    }
}

/// Bounded ring of recent attempts; the oldest entry drops first.
#[derive(Debug)]
pub struct AttemptLog {
    records: Mutex<VecDeque<AttemptRecord>>,
    capacity: usize,
}

impl AttemptLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn push(&self, record: AttemptRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<AttemptRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AttemptLog {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(provider: &str) -> AttemptRecord {
        AttemptRecord::new(
            provider.into(),
            "https://api.example.com/v1".into(),
            SystemTime::now(),
            Duration::from_millis(12),
            AttemptOutcome::Success,
            false,
        )
    }

    #[test]
    fn ring_drops_oldest() {
        let log = AttemptLog::new(2);
        log.push(record("a"));
        log.push(record("b"));
        log.push(record("c"));

        let recent: Vec<_> = log.recent(10).into_iter().map(|r| r.provider.to_string()).collect();
        assert_eq!(recent, vec!["c", "b"]);
        assert_eq!(log.recent(1).len(), 1);
    }
}
