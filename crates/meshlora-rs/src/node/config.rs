// crates/meshlora-rs/src/node/config.rs

use crate::hal::{MeshError, RxConfig, TxConfig};
use crate::types::{
    APP_PAYLOAD_LEN, Address, HopIndex, MAX_HOP_CHANNELS, OUTGOING_QUEUE_CAPACITY,
    RELAY_QUEUE_CAPACITY, ROUTING_TABLE_CAPACITY,
};
use alloc::vec::Vec;

/// Control channel frequency (478.5 MHz).
pub const DEFAULT_CONTROL_FREQUENCY_HZ: u32 = 478_500_000;
/// Spacing between the control channel and consecutive hop channels.
pub const DEFAULT_HOP_SPACING_HZ: u32 = 200_000;
/// Number of hop channels configured by default.
pub const DEFAULT_HOP_COUNT: usize = 8;
/// Application payload sent when the application never sets one.
pub const DEFAULT_APP_PAYLOAD: [u8; APP_PAYLOAD_LEN] = [2, 0, 6, 0, 0, 2, 1, 0];

/// Every timing window of the protocol, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTimings {
    pub router_min_interval_ms: u32,
    pub router_max_interval_ms: u32,
    pub data_interval_ms: u32,
    /// How long an RTS sender listens for the ACK.
    pub rts_listen_ms: u32,
    /// How long an ACK sender listens for the announced frame.
    pub wait_for_data_ms: u32,
    pub backoff_min_ms: u32,
    pub backoff_max_ms: u32,
    /// Upper bound of the random listen after CAD saw activity.
    pub cad_backoff_max_ms: u32,
    /// Gap between the two clear CAD rounds.
    pub cad_repeat_ms: u32,
    pub awake_ms: u32,
    pub sleep_ms: u32,
    /// Settling delay between radio standby and reconfiguration.
    pub settle_ms: u32,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            router_min_interval_ms: 8_000,
            router_max_interval_ms: 300_000,
            data_interval_ms: 5_000,
            rts_listen_ms: 300,
            wait_for_data_ms: 300,
            backoff_min_ms: 56,
            backoff_max_ms: 150,
            cad_backoff_max_ms: 200,
            cad_repeat_ms: 10,
            awake_ms: 3_000,
            sleep_ms: 1_000,
            settle_ms: 1,
        }
    }
}

/// LoRa modulation and channel plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioSettings {
    pub control_frequency_hz: u32,
    /// Data channels addressed by `HopIndex`.
    pub hop_frequencies: Vec<u32>,
    pub tx_power_dbm: i8,
    pub bandwidth: u8,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub preamble_len: u16,
    pub symbol_timeout: u16,
    pub fixed_length: bool,
    pub iq_inverted: bool,
    pub tx_timeout_ms: u32,
}

impl Default for RadioSettings {
    fn default() -> Self {
        let hop_frequencies = (1..=DEFAULT_HOP_COUNT as u32)
            .map(|i| DEFAULT_CONTROL_FREQUENCY_HZ + i * DEFAULT_HOP_SPACING_HZ)
            .collect();
        Self {
            control_frequency_hz: DEFAULT_CONTROL_FREQUENCY_HZ,
            hop_frequencies,
            tx_power_dbm: 14,
            bandwidth: 0,
            spreading_factor: 7,
            coding_rate: 1,
            preamble_len: 8,
            symbol_timeout: 5,
            fixed_length: false,
            iq_inverted: false,
            tx_timeout_ms: 3_000,
        }
    }
}

impl RadioSettings {
    /// Frequency for `hop`, or the control channel when no hop is negotiated.
    pub fn frequency(&self, hop: Option<HopIndex>) -> u32 {
        hop.and_then(|h| self.hop_frequencies.get(h.as_usize()).copied())
            .unwrap_or(self.control_frequency_hz)
    }

    pub fn tx_config(&self) -> TxConfig {
        TxConfig {
            power_dbm: self.tx_power_dbm,
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
            preamble_len: self.preamble_len,
            fixed_length: self.fixed_length,
            crc_on: true,
            iq_inverted: self.iq_inverted,
            timeout_ms: self.tx_timeout_ms,
        }
    }

    pub fn rx_config(&self) -> RxConfig {
        RxConfig {
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
            preamble_len: self.preamble_len,
            symbol_timeout: self.symbol_timeout,
            fixed_length: self.fixed_length,
            crc_on: true,
            iq_inverted: self.iq_inverted,
            continuous: true,
        }
    }
}

/// Complete configuration of one mesh node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub address: Address,
    pub sink: Address,
    /// Hard-wired next hop to the sink; disables route discovery.
    pub fixed_relay: Option<Address>,
    pub timings: ProtocolTimings,
    pub radio: RadioSettings,
    /// Payload carried by periodic DATA frames.
    pub app_payload: [u8; APP_PAYLOAD_LEN],
    pub outgoing_capacity: usize,
    pub relay_capacity: usize,
    pub routing_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(Address(1), Address(1))
    }
}

impl NodeConfig {
    pub fn new(address: Address, sink: Address) -> Self {
        Self {
            address,
            sink,
            fixed_relay: None,
            timings: ProtocolTimings::default(),
            radio: RadioSettings::default(),
            app_payload: DEFAULT_APP_PAYLOAD,
            outgoing_capacity: OUTGOING_QUEUE_CAPACITY,
            relay_capacity: RELAY_QUEUE_CAPACITY,
            routing_capacity: ROUTING_TABLE_CAPACITY,
        }
    }

    pub fn with_fixed_relay(mut self, relay: Address) -> Self {
        self.fixed_relay = Some(relay);
        self
    }

    pub fn with_timings(mut self, timings: ProtocolTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_radio(mut self, radio: RadioSettings) -> Self {
        self.radio = radio;
        self
    }

    pub fn with_payload(mut self, payload: [u8; APP_PAYLOAD_LEN]) -> Self {
        self.app_payload = payload;
        self
    }

    pub fn with_queue_capacities(mut self, outgoing: usize, relay: usize) -> Self {
        self.outgoing_capacity = outgoing;
        self.relay_capacity = relay;
        self
    }

    pub fn with_routing_capacity(mut self, capacity: usize) -> Self {
        self.routing_capacity = capacity;
        self
    }

    pub fn is_sink(&self) -> bool {
        self.address == self.sink
    }

    /// Rejects configurations the state machine cannot run with.
    pub fn validate(&self) -> Result<(), MeshError> {
        if let Some(relay) = self.fixed_relay {
            if self.is_sink() {
                return Err(MeshError::InvalidConfig("the sink cannot use a fixed relay"));
            }
            if relay == self.address {
                return Err(MeshError::InvalidConfig("fixed relay cannot be the node itself"));
            }
        }

        let hops = self.radio.hop_frequencies.len();
        if hops == 0 || hops > MAX_HOP_CHANNELS {
            return Err(MeshError::InvalidConfig("hop list must hold 1 to 16 channels"));
        }

        let t = &self.timings;
        let windows = [
            t.router_min_interval_ms,
            t.data_interval_ms,
            t.rts_listen_ms,
            t.wait_for_data_ms,
            t.backoff_min_ms,
            t.cad_backoff_max_ms,
            t.cad_repeat_ms,
            t.awake_ms,
            t.sleep_ms,
        ];
        if windows.contains(&0) {
            return Err(MeshError::InvalidConfig("timing windows must be non-zero"));
        }
        if t.backoff_min_ms > t.backoff_max_ms || t.backoff_min_ms > t.cad_backoff_max_ms {
            return Err(MeshError::InvalidConfig("backoff minimum exceeds its maximum"));
        }
        if t.router_min_interval_ms > t.router_max_interval_ms {
            return Err(MeshError::InvalidConfig(
                "router minimum interval exceeds the maximum",
            ));
        }

        if self.outgoing_capacity == 0 || self.relay_capacity == 0 {
            return Err(MeshError::InvalidConfig("queue capacities must be non-zero"));
        }
        Ok(())
    }
}
