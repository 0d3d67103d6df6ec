//! Counters for queued and dropped items.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated on every fan-in push.
#[derive(Debug, Default)]
pub struct QueueStats {
    queued: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub queued: u64,
    pub dropped: u64,
}

impl QueueStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_queued(&self, n: usize) {
        self.queued.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Fraction of offered items that were dropped, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_rate(&self) -> f64 {
        let offered = self.queued.saturating_add(self.dropped);
        if offered == 0 {
            0.0
        } else {
            self.dropped as f64 / offered as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = QueueStats::new();
        stats.record_queued(3);
        stats.record_dropped(1);
        stats.record_queued(0);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                queued: 3,
                dropped: 1
            }
        );
        assert_eq!(stats.dropped(), 1);
        assert!((stats.snapshot().drop_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_drop_rate_of_nothing_is_zero() {
        assert!(StatsSnapshot::default().drop_rate().abs() < f64::EPSILON);
    }
}
