// crates/meshlora-rs/src/node/scheduler.rs

use crate::types::{ADVERT_MILESTONES, SEQUENCE_MODULUS};

/// Tracks the router advertisement interval.
///
/// The interval starts at the minimum and doubles each time the number of
/// sent advertisements reaches a milestone, never exceeding the maximum. A
/// routing improvement resets both interval and counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertScheduler {
    min_interval_ms: u32,
    max_interval_ms: u32,
    interval_ms: u32,
    sent: u32,
}

impl AdvertScheduler {
    pub fn new(min_interval_ms: u32, max_interval_ms: u32) -> Self {
        Self {
            min_interval_ms,
            max_interval_ms,
            interval_ms: min_interval_ms,
            sent: 0,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Advertisements sent since the last reset.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Sequence number for the next ROUTER frame.
    pub fn sequence(&self) -> u8 {
        (self.sent % SEQUENCE_MODULUS) as u8
    }

    /// Counts a completed advertisement. Returns true if the interval doubled.
    pub fn record_sent(&mut self) -> bool {
        self.sent = self.sent.saturating_add(1);
        if ADVERT_MILESTONES.contains(&self.sent) {
            let doubled = self.interval_ms.saturating_mul(2).min(self.max_interval_ms);
            let changed = doubled != self.interval_ms;
            self.interval_ms = doubled;
            return changed;
        }
        false
    }

    pub fn reset(&mut self) {
        self.interval_ms = self.min_interval_ms;
        self.sent = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_doubles_once_at_twentieth() {
        let mut scheduler = AdvertScheduler::new(8_000, 300_000);
        for n in 1..=19 {
            assert!(!scheduler.record_sent(), "doubled early at {n}");
            assert_eq!(scheduler.interval_ms(), 8_000);
        }
        assert!(scheduler.record_sent());
        assert_eq!(scheduler.interval_ms(), 16_000);
    }

    #[test]
    fn test_interval_is_capped() {
        let mut scheduler = AdvertScheduler::new(8_000, 300_000);
        for _ in 0..1000 {
            scheduler.record_sent();
        }
        // 8s doubled at 20, 50, 100, 500 and 1000.
        assert_eq!(scheduler.interval_ms(), 256_000);
        let mut scheduler = AdvertScheduler::new(100_000, 300_000);
        for _ in 0..100 {
            scheduler.record_sent();
        }
        assert_eq!(scheduler.interval_ms(), 300_000);
    }

    #[test]
    fn test_reset_restores_minimum() {
        let mut scheduler = AdvertScheduler::new(8_000, 300_000);
        for _ in 0..50 {
            scheduler.record_sent();
        }
        assert_eq!(scheduler.interval_ms(), 32_000);
        scheduler.reset();
        assert_eq!(scheduler.interval_ms(), 8_000);
        assert_eq!(scheduler.sent(), 0);
        assert_eq!(scheduler.sequence(), 0);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut scheduler = AdvertScheduler::new(1, u32::MAX);
        for _ in 0..256 {
            scheduler.record_sent();
        }
        assert_eq!(scheduler.sequence(), 1);
    }
}
