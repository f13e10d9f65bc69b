// crates/meshlora-rs/src/node/state.rs

use crate::types::{APP_PAYLOAD_LEN, Address};
use alloc::collections::BTreeMap;

/// Kind of the frame most recently handed to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxKind {
    #[default]
    Nothing,
    Rts,
    Ack,
    Router,
    Data,
    Relay,
}

/// Receiver side of a reservation: after answering an RTS the node waits on
/// the negotiated channel for the announced frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckWait {
    #[default]
    None,
    /// ACK sent, announced frame not yet received.
    Waiting,
    /// A frame arrived; one more listen window is granted before dispatching.
    Retrying,
}

/// Position in the awake/asleep schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DutyState {
    #[default]
    Awake,
    /// The awake window ended; the node sleeps as soon as it is idle.
    MidSleep,
    Asleep,
}

/// A DATA frame that reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveredFrame {
    pub source: Address,
    pub sequence: u8,
    pub payload: [u8; APP_PAYLOAD_LEN],
    pub rssi: i16,
}

/// Counters kept by a running node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStatistics {
    pub adverts_sent: u32,
    pub data_sent: u32,
    /// Relayed frames sent, per origin.
    pub relays_sent: BTreeMap<Address, u32>,
    /// Frames received for relaying, per origin.
    pub relays_received: BTreeMap<Address, u32>,
    /// DATA frames received by the sink, per origin.
    pub delivered: BTreeMap<Address, u32>,
    pub tx_timeouts: u32,
    pub rx_errors: u32,
    pub unexpected_status: u32,
    pub handshakes_abandoned: u32,
    pub contention_backoffs: u32,
    pub relay_origin_mismatches: u32,
    /// Frames to relay that were dropped for lack of a route.
    pub unroutable_relays: u32,
    pub outgoing_lost: u32,
    pub relay_lost: u32,
    /// Delivered frames dropped because the application did not drain the inbox.
    pub inbox_overflow: u32,
}

impl NodeStatistics {
    pub(crate) fn bump(map: &mut BTreeMap<Address, u32>, origin: Address) {
        let counter = map.entry(origin).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    pub fn total_delivered(&self) -> u32 {
        self.delivered.values().sum()
    }

    pub fn total_relays_sent(&self) -> u32 {
        self.relays_sent.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_origin_counters() {
        let mut stats = NodeStatistics::default();
        NodeStatistics::bump(&mut stats.delivered, Address(3));
        NodeStatistics::bump(&mut stats.delivered, Address(3));
        NodeStatistics::bump(&mut stats.delivered, Address(4));
        assert_eq!(stats.delivered.get(&Address(3)), Some(&2));
        assert_eq!(stats.total_delivered(), 3);
        assert_eq!(stats.total_relays_sent(), 0);
    }
}
