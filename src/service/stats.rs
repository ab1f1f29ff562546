use std::sync::atomic::{AtomicU64, Ordering};

/// Routing counters for a service instance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages ingested from sources or direct dispatch.
    pub received: u64,
    /// Messages whose handler succeeded.
    pub processed: u64,
    /// Messages whose handler failed or panicked.
    pub failed: u64,
    /// Messages with no registered handler.
    pub unhandled: u64,
    /// Runtime faults reported by sources.
    pub source_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    unhandled: AtomicU64,
    source_errors: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unhandled(&self) {
        self.unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
        }
    }
}
