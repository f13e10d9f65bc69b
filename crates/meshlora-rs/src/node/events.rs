// crates/meshlora-rs/src/node/events.rs

use crate::hal::TimerId;
use crate::types::MAX_FRAME_LEN;

/// A received radio payload, copied out of the driver buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
    pub rssi: i16,
    pub snr: i8,
}

impl RxFrame {
    /// Copies `payload`. Anything beyond the radio buffer size is cut off;
    /// the codec then rejects the frame on length.
    pub fn new(payload: &[u8], rssi: i16, snr: i8) -> Self {
        let len = payload.len().min(MAX_FRAME_LEN);
        let mut bytes = [0u8; MAX_FRAME_LEN];
        bytes[..len].copy_from_slice(&payload[..len]);
        Self {
            bytes,
            len,
            rssi,
            snr,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub(crate) fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }
}

/// Completion events reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    TxDone,
    RxDone(RxFrame),
    TxTimeout,
    RxTimeout,
    RxError,
    CadDone { activity: bool },
}

impl RadioEvent {
    /// The protocol state this event puts the dispatch loop in.
    pub fn protocol_state(&self) -> ProtocolState {
        match self {
            RadioEvent::TxDone => ProtocolState::Tx,
            RadioEvent::RxDone(_) => ProtocolState::Rx,
            RadioEvent::TxTimeout => ProtocolState::TxTimeout,
            RadioEvent::RxTimeout => ProtocolState::RxTimeout,
            RadioEvent::RxError => ProtocolState::RxError,
            RadioEvent::CadDone { .. } => ProtocolState::Cad,
        }
    }
}

/// What the dispatch loop has to handle next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    Rx,
    RxTimeout,
    RxError,
    Tx,
    TxTimeout,
    Cad,
}

/// Holds events between the interrupt callbacks and the dispatch loop.
///
/// The radio part has capacity one: a new radio event overwrites an
/// unconsumed one, since issuing a new radio command invalidates older
/// outcomes. Timer fires are recorded as bits, one per timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventSlot {
    radio: Option<RadioEvent>,
    timers: u8,
}

impl EventSlot {
    /// Stores a radio event, returning the one it replaced.
    pub fn put_radio(&mut self, event: RadioEvent) -> Option<RadioEvent> {
        self.radio.replace(event)
    }

    pub fn take_radio(&mut self) -> Option<RadioEvent> {
        self.radio.take()
    }

    pub fn put_timer(&mut self, timer: TimerId) {
        self.timers |= timer.bit();
    }

    /// Takes the next fired timer in `TimerId::ALL` order.
    pub fn take_timer(&mut self) -> Option<TimerId> {
        let timer = TimerId::ALL
            .into_iter()
            .find(|t| self.timers & t.bit() != 0)?;
        self.timers &= !timer.bit();
        Some(timer)
    }

    pub fn protocol_state(&self) -> ProtocolState {
        self.radio
            .as_ref()
            .map_or(ProtocolState::Idle, RadioEvent::protocol_state)
    }

    pub fn is_empty(&self) -> bool {
        self.radio.is_none() && self.timers == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_radio_event_wins() {
        let mut slot = EventSlot::default();
        assert_eq!(slot.protocol_state(), ProtocolState::Idle);
        assert_eq!(slot.put_radio(RadioEvent::RxTimeout), None);
        assert_eq!(
            slot.put_radio(RadioEvent::TxDone),
            Some(RadioEvent::RxTimeout)
        );
        assert_eq!(slot.protocol_state(), ProtocolState::Tx);
        assert_eq!(slot.take_radio(), Some(RadioEvent::TxDone));
        assert_eq!(slot.take_radio(), None);
    }

    #[test]
    fn test_timer_fires_are_kept_per_timer() {
        let mut slot = EventSlot::default();
        slot.put_timer(TimerId::DutyCycle);
        slot.put_timer(TimerId::Advertisement);
        slot.put_timer(TimerId::DutyCycle);
        assert_eq!(slot.take_timer(), Some(TimerId::Advertisement));
        assert_eq!(slot.take_timer(), Some(TimerId::DutyCycle));
        assert_eq!(slot.take_timer(), None);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_rx_frame_truncates_oversized_payload() {
        let payload = [0xAAu8; 80];
        let frame = RxFrame::new(&payload, -60, 7);
        assert_eq!(frame.payload().len(), MAX_FRAME_LEN);
    }
}
