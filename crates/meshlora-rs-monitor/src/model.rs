//! Defines the core data structures for diagnostic monitoring.
//!
//! These structs carry node state from the node loop to the monitor
//! thread and are serialized to JSON for the web frontend.

use meshlora_rs::{
    Address, MeshNode, NodeStatistics, RadioInterface, RandomSource, RouteEntry, TimerService,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// The route a node currently uses to reach the sink.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub next_hop: u16,
    pub cost: u8,
    pub rssi: i16,
}

impl From<&RouteEntry> for RouteInfo {
    fn from(entry: &RouteEntry) -> Self {
        Self {
            next_hop: entry.next_hop.0,
            cost: entry.cost,
            rssi: entry.rssi,
        }
    }
}

/// Scalar counters from `NodeStatistics`.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeCounters {
    pub adverts_sent: u32,
    pub data_sent: u32,
    pub relays_sent: u32,
    pub delivered: u32,
    pub tx_timeouts: u32,
    pub rx_errors: u32,
    pub unexpected_status: u32,
    pub handshakes_abandoned: u32,
    pub contention_backoffs: u32,
    pub relay_origin_mismatches: u32,
    pub unroutable_relays: u32,
    pub outgoing_lost: u32,
    pub relay_lost: u32,
    pub inbox_overflow: u32,
}

impl From<&NodeStatistics> for NodeCounters {
    fn from(stats: &NodeStatistics) -> Self {
        Self {
            adverts_sent: stats.adverts_sent,
            data_sent: stats.data_sent,
            relays_sent: stats.total_relays_sent(),
            delivered: stats.total_delivered(),
            tx_timeouts: stats.tx_timeouts,
            rx_errors: stats.rx_errors,
            unexpected_status: stats.unexpected_status,
            handshakes_abandoned: stats.handshakes_abandoned,
            contention_backoffs: stats.contention_backoffs,
            relay_origin_mismatches: stats.relay_origin_mismatches,
            unroutable_relays: stats.unroutable_relays,
            outgoing_lost: stats.outgoing_lost,
            relay_lost: stats.relay_lost,
            inbox_overflow: stats.inbox_overflow,
        }
    }
}

fn per_origin(map: &BTreeMap<Address, u32>) -> Value {
    let entries: Map<String, Value> = map
        .iter()
        .map(|(origin, count)| (origin.to_string(), Value::from(*count)))
        .collect();
    Value::Object(entries)
}

/// A serializable snapshot of a single node.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub address: u16,
    pub is_sink: bool,
    pub protocol_state: String,
    pub duty_state: String,
    pub last_tx: String,
    /// `None` while the sink is unreachable.
    pub route: Option<RouteInfo>,
    pub known_routes: usize,
    pub outgoing_queued: usize,
    pub relay_queued: usize,
    pub advert_interval_ms: u32,
    pub advert_pending: bool,
    pub counters: NodeCounters,
    /// Relays sent/received and deliveries, keyed by origin address.
    pub per_origin: Value,
}

impl NodeSnapshot {
    pub fn from_node<R, T, G>(node: &MeshNode<R, T, G>) -> Self
    where
        R: RadioInterface,
        T: TimerService,
        G: RandomSource,
    {
        let stats = node.statistics();
        Self {
            address: node.address().0,
            is_sink: node.is_sink(),
            protocol_state: format!("{:?}", node.protocol_state()),
            duty_state: format!("{:?}", node.duty_state()),
            last_tx: format!("{:?}", node.last_tx_kind()),
            route: node.routing_table().sink_route().map(RouteInfo::from),
            known_routes: node.routing_table().len(),
            outgoing_queued: node.queues().outgoing.len(),
            relay_queued: node.queues().relay.len(),
            advert_interval_ms: node.advert_scheduler().interval_ms(),
            advert_pending: node.is_advert_pending(),
            counters: NodeCounters::from(stats),
            per_origin: json!({
                "relays_sent": per_origin(&stats.relays_sent),
                "relays_received": per_origin(&stats.relays_received),
                "delivered": per_origin(&stats.delivered),
            }),
        }
    }
}

/// The data packet sent from the node loop to the monitor: every node at one
/// point in time.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DiagnosticSnapshot {
    /// Time of the snapshot on the node loop's clock.
    pub time_ms: u64,
    pub nodes: Vec<NodeSnapshot>,
}

impl DiagnosticSnapshot {
    pub fn from_nodes<'a, R, T, G, I>(time_ms: u64, nodes: I) -> Self
    where
        R: RadioInterface + 'a,
        T: TimerService + 'a,
        G: RandomSource + 'a,
        I: IntoIterator<Item = &'a MeshNode<R, T, G>>,
    {
        Self {
            time_ms,
            nodes: nodes.into_iter().map(NodeSnapshot::from_node).collect(),
        }
    }

    pub fn node(&self, address: u16) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlora_rs::{
        MeshError, NodeConfig, RadioEvent, RadioStatus, RxConfig, RxFrame, TimerId, TxConfig,
    };

    struct QuietRadio;

    impl RadioInterface for QuietRadio {
        fn set_channel(&mut self, _freq_hz: u32) {}
        fn set_tx_config(&mut self, _config: &TxConfig) {}
        fn set_rx_config(&mut self, _config: &RxConfig) {}
        fn send(&mut self, _frame: &[u8]) -> Result<(), MeshError> {
            Ok(())
        }
        fn receive(&mut self, _timeout_ms: u32) {}
        fn standby(&mut self) {}
        fn sleep(&mut self) {}
        fn start_cad(&mut self) {}
        fn status(&self) -> RadioStatus {
            RadioStatus::Idle
        }
        fn time_on_air(&self, _payload_len: usize) -> u32 {
            0
        }
    }

    struct FrozenTimers;

    impl TimerService for FrozenTimers {
        fn set_value(&mut self, _timer: TimerId, _duration_ms: u32) {}
        fn start(&mut self, _timer: TimerId) {}
        fn stop(&mut self, _timer: TimerId) {}
        fn delay_ms(&mut self, _duration_ms: u32) {}
        fn now_ms(&self) -> u64 {
            0
        }
    }

    struct LowRandom;

    impl RandomSource for LowRandom {
        fn random_range(&mut self, min: u32, _max: u32) -> u32 {
            min
        }
    }

    type TestNode = MeshNode<QuietRadio, FrozenTimers, LowRandom>;

    fn node(address: u16) -> TestNode {
        MeshNode::new(
            NodeConfig::new(Address(address), Address(1)),
            QuietRadio,
            FrozenTimers,
            LowRandom,
        )
        .unwrap()
    }

    /// A sink advertisement frame: `[hdr, 8, sink_flag, seq, len, src, n, dest, cost]`.
    const SINK_ADVERT: [u8; 11] = [0xE4, 0x08, 0x01, 0x00, 0x06, 0x01, 0x00, 0x01, 0x01, 0x00, 0x00];

    #[test]
    fn test_snapshot_of_fresh_router() {
        let mut router = node(2);
        router.start();
        let snap = NodeSnapshot::from_node(&router);

        assert_eq!(snap.address, 2);
        assert!(!snap.is_sink);
        assert_eq!(snap.route, None);
        assert_eq!(snap.known_routes, 0);
        assert_eq!(snap.duty_state, "Awake");
        assert_eq!(snap.advert_interval_ms, 8_000);
        assert_eq!(snap.counters, NodeCounters::default());
    }

    #[test]
    fn test_snapshot_reflects_learned_route() {
        let mut router = node(2);
        router.start();
        router.on_radio_event(RadioEvent::RxDone(RxFrame::new(&SINK_ADVERT, -48, 9)));
        router.poll();

        let snap = NodeSnapshot::from_node(&router);
        assert_eq!(
            snap.route,
            Some(RouteInfo {
                next_hop: 1,
                cost: 1,
                rssi: -48
            })
        );
        assert!(snap.advert_pending);
    }

    #[test]
    fn test_sink_snapshot_json_shape() {
        let sink = node(1);
        let snapshot = DiagnosticSnapshot::from_nodes(1_234, [&sink]);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["time_ms"], 1_234);
        let first = &json["nodes"][0];
        assert_eq!(first["address"], 1);
        assert_eq!(first["is_sink"], true);
        assert_eq!(first["route"]["cost"], 0);
        assert_eq!(first["counters"]["adverts_sent"], 0);
        assert!(first["per_origin"]["delivered"].as_object().unwrap().is_empty());
        assert!(snapshot.node(1).is_some());
        assert!(snapshot.node(9).is_none());
    }
}
