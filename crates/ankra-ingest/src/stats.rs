use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Per-processor counters, updated on every terminal state.
#[derive(Default)]
pub struct ProcessorStats {
    pub received: AtomicU64,
    pub processed: AtomicU64,
    pub duplicates: AtomicU64,
    pub not_found: AtomicU64,
    pub invalid_signature: AtomicU64,
    pub unauthorized: AtomicU64,
    pub errors: AtomicU64,
    pub no_handler: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProcessorStatsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub duplicates: u64,
    pub not_found: u64,
    pub invalid_signature: u64,
    pub unauthorized: u64,
    pub errors: u64,
    pub no_handler: u64,
    pub dedup_clears: u64,
    pub last_error: Option<String>,
}

impl ProcessorStats {
    pub fn record_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().expect("stats lock") = Some(message.to_string());
    }

    /// `dedup_clears` lives with the dedup state; the caller passes the
    /// current count in so one snapshot carries every processor counter.
    pub fn snapshot(&self, dedup_clears: u64) -> ProcessorStatsSnapshot {
        ProcessorStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            invalid_signature: self.invalid_signature.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            no_handler: self.no_handler.load(Ordering::Relaxed),
            dedup_clears,
            last_error: self.last_error.lock().expect("stats lock").clone(),
        }
    }
}
