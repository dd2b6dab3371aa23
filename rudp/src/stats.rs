//! Engine statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// ARQ engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Data frames handed to the lossy channel, first sends and resends
    pub transmissions: u64,
    /// Data frames resent after a timeout
    pub retransmissions: u64,
    /// Duplicate or out-of-order data frames received
    pub duplicates: u64,
    /// Payloads delivered to the caller
    pub delivered: u64,
}

/// Shared counters for engines with a background thread
#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    transmissions: AtomicU64,
    retransmissions: AtomicU64,
    duplicates: AtomicU64,
    delivered: AtomicU64,
}

impl EngineCounters {
    pub(crate) fn transmitted(&self, retransmission: bool) {
        self.transmissions.fetch_add(1, Ordering::Relaxed);
        if retransmission {
            self.retransmissions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        EngineStats {
            transmissions: self.transmissions.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}
