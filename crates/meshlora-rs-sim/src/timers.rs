// crates/meshlora-rs-sim/src/timers.rs

use meshlora_rs::{TimerId, TimerService};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
struct TimerSlot {
    period_ms: u32,
    deadline_ms: Option<u64>,
}

/// One-shot timers on the simulation clock.
///
/// Settling delays do not advance virtual time; they are only accumulated so
/// tests can see how much blocking the node asked for.
#[derive(Debug, Default)]
pub struct SimTimers {
    now_ms: u64,
    slots: BTreeMap<TimerId, TimerSlot>,
    delayed_ms: u64,
}

impl SimTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    /// Stops and returns every timer due at `now_ms`, in `TimerId` order.
    pub(crate) fn expire(&mut self, now_ms: u64) -> Vec<TimerId> {
        self.now_ms = now_ms;
        let mut fired = Vec::new();
        for (id, slot) in self.slots.iter_mut() {
            if slot.deadline_ms.is_some_and(|d| d <= now_ms) {
                slot.deadline_ms = None;
                fired.push(*id);
            }
        }
        fired
    }

    pub fn is_running(&self, timer: TimerId) -> bool {
        self.slots
            .get(&timer)
            .is_some_and(|slot| slot.deadline_ms.is_some())
    }

    pub fn period_ms(&self, timer: TimerId) -> Option<u32> {
        self.slots.get(&timer).map(|slot| slot.period_ms)
    }

    /// Time left until `timer` fires.
    pub fn remaining_ms(&self, timer: TimerId) -> Option<u64> {
        self.slots
            .get(&timer)
            .and_then(|slot| slot.deadline_ms)
            .map(|d| d.saturating_sub(self.now_ms))
    }

    pub fn delayed_ms(&self) -> u64 {
        self.delayed_ms
    }
}

impl TimerService for SimTimers {
    fn set_value(&mut self, timer: TimerId, duration_ms: u32) {
        self.slots.entry(timer).or_default().period_ms = duration_ms;
    }

    fn start(&mut self, timer: TimerId) {
        let now = self.now_ms;
        let slot = self.slots.entry(timer).or_default();
        // A zero period still fires on the next step.
        slot.deadline_ms = Some(now + u64::from(slot.period_ms.max(1)));
    }

    fn stop(&mut self, timer: TimerId) {
        if let Some(slot) = self.slots.get_mut(&timer) {
            slot.deadline_ms = None;
        }
    }

    fn delay_ms(&mut self, duration_ms: u32) {
        self.delayed_ms += u64::from(duration_ms);
    }

    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}
