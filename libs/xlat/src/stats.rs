use std::sync::atomic::{AtomicU64, Ordering};

/// Data-path counters. Shared across workers; updates are relaxed since
/// nothing orders against them.
#[derive(Debug, Default)]
pub struct Stats {
    pub forwarded_4to6: AtomicU64,
    pub forwarded_6to4: AtomicU64,
    pub dropped: AtomicU64,
    pub rejected: AtomicU64,
    pub hairpinned: AtomicU64,
    pub host: AtomicU64,
}

impl Stats {
    pub(crate) fn count(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            forwarded_4to6: self.forwarded_4to6.load(Ordering::Relaxed),
            forwarded_6to4: self.forwarded_6to4.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            hairpinned: self.hairpinned.load(Ordering::Relaxed),
            host: self.host.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub forwarded_4to6: u64,
    pub forwarded_6to4: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub hairpinned: u64,
    pub host: u64,
}
