// crates/meshlora-rs/tests/harness/mod.rs
//
// Recording doubles for the radio, timer and random-number HALs, plus helpers
// that drive a single MeshNode through scripted events.
#![allow(dead_code)]

use meshlora_rs::frame::{
    Ack0Frame, Ack1Frame, AdvertisedRoute, Codec, DataFrame, RouterFrame, Rts0Frame, Rts1Frame,
};
use meshlora_rs::{
    Address, HopIndex, MeshError, MeshNode, NodeConfig, RadioEvent, RadioInterface, RadioStatus,
    RandomSource, RxConfig, RxFrame, TimerId, TimerService, TxConfig,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub const SINK: Address = Address(1);
pub const NODE_A: Address = Address(2);
pub const NODE_B: Address = Address(3);

pub type TestNode = MeshNode<MockRadio, MockTimers, ScriptedRandom>;

/// Every command the node issued to the radio, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    SetChannel(u32),
    SetTxConfig(TxConfig),
    SetRxConfig(RxConfig),
    Send(Vec<u8>),
    Receive(u32),
    Standby,
    Sleep,
    StartCad,
}

pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    /// Status returned to the node; tests set it directly.
    pub status: RadioStatus,
    pub refuse_send: bool,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            status: RadioStatus::Idle,
            refuse_send: false,
        }
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::Send(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.sent_frames().pop()
    }

    pub fn last_receive(&self) -> Option<u32> {
        self.calls.iter().rev().find_map(|c| match c {
            RadioCall::Receive(t) => Some(*t),
            _ => None,
        })
    }

    /// Channel the radio was tuned to when the last frame went out.
    pub fn channel_of_last_send(&self) -> Option<u32> {
        let send_pos = self
            .calls
            .iter()
            .rposition(|c| matches!(c, RadioCall::Send(_)))?;
        self.calls[..send_pos].iter().rev().find_map(|c| match c {
            RadioCall::SetChannel(f) => Some(*f),
            _ => None,
        })
    }

    /// Channel the radio was tuned to for the last receive.
    pub fn channel_of_last_receive(&self) -> Option<u32> {
        let rx_pos = self
            .calls
            .iter()
            .rposition(|c| matches!(c, RadioCall::Receive(_)))?;
        self.calls[..rx_pos].iter().rev().find_map(|c| match c {
            RadioCall::SetChannel(f) => Some(*f),
            _ => None,
        })
    }

    pub fn last_call(&self) -> Option<&RadioCall> {
        self.calls.last()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl RadioInterface for MockRadio {
    fn set_channel(&mut self, freq_hz: u32) {
        self.calls.push(RadioCall::SetChannel(freq_hz));
    }

    fn set_tx_config(&mut self, config: &TxConfig) {
        self.calls.push(RadioCall::SetTxConfig(*config));
    }

    fn set_rx_config(&mut self, config: &RxConfig) {
        self.calls.push(RadioCall::SetRxConfig(*config));
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), MeshError> {
        if self.refuse_send {
            return Err(MeshError::RadioError);
        }
        self.calls.push(RadioCall::Send(frame.to_vec()));
        Ok(())
    }

    fn receive(&mut self, timeout_ms: u32) {
        self.calls.push(RadioCall::Receive(timeout_ms));
    }

    fn standby(&mut self) {
        self.calls.push(RadioCall::Standby);
    }

    fn sleep(&mut self) {
        self.calls.push(RadioCall::Sleep);
    }

    fn start_cad(&mut self) {
        self.calls.push(RadioCall::StartCad);
    }

    fn status(&self) -> RadioStatus {
        self.status
    }

    fn time_on_air(&self, payload_len: usize) -> u32 {
        payload_len as u32
    }
}

#[derive(Default)]
pub struct MockTimers {
    pub values: BTreeMap<TimerId, u32>,
    pub running: BTreeSet<TimerId>,
    pub delays: Vec<u32>,
    pub now: u64,
}

impl MockTimers {
    pub fn is_running(&self, timer: TimerId) -> bool {
        self.running.contains(&timer)
    }

    pub fn value(&self, timer: TimerId) -> Option<u32> {
        self.values.get(&timer).copied()
    }
}

impl TimerService for MockTimers {
    fn set_value(&mut self, timer: TimerId, duration_ms: u32) {
        self.values.insert(timer, duration_ms);
    }

    fn start(&mut self, timer: TimerId) {
        self.running.insert(timer);
    }

    fn stop(&mut self, timer: TimerId) {
        self.running.remove(&timer);
    }

    fn delay_ms(&mut self, duration_ms: u32) {
        self.delays.push(duration_ms);
        self.now += duration_ms as u64;
    }

    fn now_ms(&self) -> u64 {
        self.now
    }
}

/// Returns scripted values (clamped to the requested range), then the range minimum.
#[derive(Default)]
pub struct ScriptedRandom {
    pub script: VecDeque<u32>,
    pub requests: Vec<(u32, u32)>,
}

impl ScriptedRandom {
    pub fn with_script(values: &[u32]) -> Self {
        Self {
            script: values.iter().copied().collect(),
            requests: Vec::new(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn random_range(&mut self, min: u32, max: u32) -> u32 {
        self.requests.push((min, max));
        self.script.pop_front().unwrap_or(min).clamp(min, max)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

pub fn build_node(config: NodeConfig, script: &[u32]) -> TestNode {
    init_logging();
    MeshNode::new(
        config,
        MockRadio::new(),
        MockTimers::default(),
        ScriptedRandom::with_script(script),
    )
    .expect("valid test configuration")
}

pub fn sink_node() -> TestNode {
    build_node(NodeConfig::new(SINK, SINK), &[])
}

pub fn router_node(address: Address) -> TestNode {
    build_node(NodeConfig::new(address, SINK), &[])
}

/// Records `event` and runs the dispatch loop.
pub fn deliver(node: &mut TestNode, event: RadioEvent) {
    node.on_radio_event(event);
    node.poll();
}

pub fn receive(node: &mut TestNode, bytes: &[u8]) {
    deliver(node, RadioEvent::RxDone(RxFrame::new(bytes, -60, 8)));
}

pub fn receive_with_rssi(node: &mut TestNode, bytes: &[u8], rssi: i16) {
    deliver(node, RadioEvent::RxDone(RxFrame::new(bytes, rssi, 8)));
}

pub fn fire(node: &mut TestNode, timer: TimerId) {
    node.on_timer_fired(timer);
    node.poll();
}

/// Runs two clear CAD rounds, which ends with the node sending its RTS.
pub fn clear_cad(node: &mut TestNode) {
    deliver(node, RadioEvent::CadDone { activity: false });
    fire(node, TimerId::CadRepeat);
    deliver(node, RadioEvent::CadDone { activity: false });
}

fn encode<C: Codec>(frame: &C) -> Vec<u8> {
    let mut buffer = [0u8; 64];
    let len = frame.serialize(&mut buffer).expect("encodable frame");
    buffer[..len].to_vec()
}

pub fn rts0(source: Address) -> Vec<u8> {
    encode(&Rts0Frame { source })
}

pub fn rts1(next_hop: Address, source: Address) -> Vec<u8> {
    encode(&Rts1Frame { next_hop, source })
}

pub fn ack0(target: Address) -> Vec<u8> {
    encode(&Ack0Frame { target })
}

pub fn ack1(target: Address, hop: u8) -> Vec<u8> {
    encode(&Ack1Frame {
        target,
        hop: HopIndex::try_from(hop).expect("hop in range"),
    })
}

pub fn router(source: Address, routes: &[(Address, u8)]) -> Vec<u8> {
    encode(&RouterFrame {
        from_sink: source == SINK,
        sequence: 0,
        source,
        routes: routes
            .iter()
            .map(|&(destination, cost)| AdvertisedRoute { destination, cost })
            .collect(),
    })
}

pub fn data(source: Address, next_hop: Address, sequence: u8) -> Vec<u8> {
    encode(&DataFrame {
        sequence,
        source,
        next_hop,
        payload: [1, 2, 3, 4, 5, 6, 7, 8],
    })
}

/// Hop channel frequency under the default radio settings.
pub fn hop_frequency(hop: u32) -> u32 {
    478_500_000 + (hop + 1) * 200_000
}

pub const CONTROL_FREQUENCY: u32 = 478_500_000;
