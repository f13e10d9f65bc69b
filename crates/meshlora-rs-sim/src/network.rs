// crates/meshlora-rs-sim/src/network.rs

use crate::air::VirtualAir;
use crate::radio::SimRadio;
use crate::rng::SimRandom;
use crate::timers::SimTimers;
use log::{debug, info};
use meshlora_rs::{Address, DeliveredFrame, MeshError, MeshNode, NodeConfig};

/// A mesh node wired to the simulated HAL.
pub type SimNode = MeshNode<SimRadio, SimTimers, SimRandom>;

/// Several nodes sharing one `VirtualAir`, advanced in 1 ms steps.
///
/// Each step, in order: frames whose airtime ended are handed to their
/// sender and receivers, elapsed radio deadlines and timers are raised, every
/// node polls once, and frames sent during the poll go on the air.
pub struct SimulatedMesh {
    nodes: Vec<SimNode>,
    air: VirtualAir,
    now_ms: u64,
    started: bool,
}

impl Default for SimulatedMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMesh {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            air: VirtualAir::new(),
            now_ms: 0,
            started: false,
        }
    }

    /// Adds a node; `seed` drives its backoffs and hop choices.
    pub fn add_node(&mut self, config: NodeConfig, seed: u64) -> Result<Address, MeshError> {
        let node = MeshNode::new(config, SimRadio::new(), SimTimers::new(), SimRandom::new(seed))?;
        let address = node.address();
        if self.index_of(address).is_some() {
            return Err(MeshError::InvalidConfig("duplicate node address"));
        }
        self.nodes.push(node);
        debug!("[sim] Node {} added.", address);
        Ok(address)
    }

    /// Lets `a` and `b` hear each other at `rssi` dBm.
    pub fn link(&mut self, a: Address, b: Address, rssi: i16) -> Result<(), MeshError> {
        let (ia, ib) = self.pair(a, b)?;
        self.air.connect(ia, ib, rssi);
        Ok(())
    }

    pub fn unlink(&mut self, a: Address, b: Address) -> Result<(), MeshError> {
        let (ia, ib) = self.pair(a, b)?;
        self.air.disconnect(ia, ib);
        Ok(())
    }

    /// Brings every node up at t = 0.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for node in &mut self.nodes {
            node.radio_mut().set_now(self.now_ms);
            node.timers_mut().set_now(self.now_ms);
            node.start();
        }
        self.launch_pending_frames();
        info!("[sim] {} nodes started.", self.nodes.len());
    }

    /// Advances virtual time by 1 ms.
    pub fn step(&mut self) {
        if !self.started {
            self.start();
        }
        self.now_ms += 1;
        let now = self.now_ms;
        for node in &mut self.nodes {
            node.radio_mut().set_now(now);
            node.timers_mut().set_now(now);
        }

        for tx in self.air.finish(now) {
            if let Some(sender) = self.nodes.get_mut(tx.sender) {
                if let Some(event) = sender.radio_mut().complete_transmission(tx.id) {
                    sender.on_radio_event(event);
                }
            }
            for (index, node) in self.nodes.iter_mut().enumerate() {
                if index == tx.sender {
                    continue;
                }
                let Some(link) = self.air.link(tx.sender, index) else {
                    continue;
                };
                if let Some(event) = node.radio_mut().frame_ended(&tx, link) {
                    node.on_radio_event(event);
                }
            }
        }

        for (index, node) in self.nodes.iter_mut().enumerate() {
            let air = &self.air;
            if let Some(event) = node
                .radio_mut()
                .expire(|channel| air.is_busy(index, channel, None))
            {
                node.on_radio_event(event);
            }
            for timer in node.timers_mut().expire(now) {
                node.on_timer_fired(timer);
            }
            node.poll();
        }

        self.launch_pending_frames();
    }

    pub fn run_for(&mut self, duration_ms: u64) {
        for _ in 0..duration_ms {
            self.step();
        }
    }

    /// Steps until `done` holds or `limit_ms` of virtual time has passed.
    /// Returns whether `done` was reached.
    pub fn run_until(&mut self, limit_ms: u64, mut done: impl FnMut(&Self) -> bool) -> bool {
        let deadline = self.now_ms + limit_ms;
        while self.now_ms < deadline {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    /// Drains the inbox of every sink.
    pub fn take_delivered(&mut self) -> Vec<DeliveredFrame> {
        self.nodes
            .iter_mut()
            .filter(|node| node.is_sink())
            .flat_map(|node| node.take_delivered())
            .collect()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn node(&self, address: Address) -> Option<&SimNode> {
        self.nodes.iter().find(|node| node.address() == address)
    }

    pub fn node_mut(&mut self, address: Address) -> Option<&mut SimNode> {
        self.nodes.iter_mut().find(|node| node.address() == address)
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn air(&self) -> &VirtualAir {
        &self.air
    }

    fn index_of(&self, address: Address) -> Option<usize> {
        self.nodes.iter().position(|node| node.address() == address)
    }

    fn pair(&self, a: Address, b: Address) -> Result<(usize, usize), MeshError> {
        match (self.index_of(a), self.index_of(b)) {
            (Some(ia), Some(ib)) if ia != ib => Ok((ia, ib)),
            (Some(_), Some(_)) => Err(MeshError::InvalidConfig("a node cannot link to itself")),
            _ => Err(MeshError::InvalidConfig("unknown node address")),
        }
    }

    /// Puts frames handed to the radios during the last poll on the air and
    /// lets receivers in range detect their preamble.
    fn launch_pending_frames(&mut self) {
        let now = self.now_ms;
        for sender in 0..self.nodes.len() {
            let Some(frame) = self.nodes[sender].radio_mut().take_outbox() else {
                continue;
            };
            let channel = frame.channel_hz;
            let end = now + u64::from(frame.airtime_ms.max(1));
            let id = self.air.begin(sender, channel, frame.bytes, now, end);
            self.nodes[sender].radio_mut().on_air(id);

            let Some(tx) = self.air.in_flight().iter().find(|t| t.id == id).cloned() else {
                continue;
            };
            for (index, node) in self.nodes.iter_mut().enumerate() {
                if index == sender {
                    continue;
                }
                let Some(link) = self.air.link(sender, index) else {
                    continue;
                };
                let interferer = self.air.strongest_interferer(index, channel, Some(id));
                node.radio_mut().preamble(&tx, link.rssi, interferer);
            }
        }
    }
}
