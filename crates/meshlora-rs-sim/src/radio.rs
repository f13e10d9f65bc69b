// crates/meshlora-rs-sim/src/radio.rs

use crate::air::{Link, Transmission};
use log::{debug, trace};
use meshlora_rs::{
    MeshError, RadioEvent, RadioInterface, RadioStatus, RxConfig, RxFrame, TxConfig,
};

/// Largest payload a LoRa packet can carry.
pub const MAX_LORA_PAYLOAD: usize = 255;

/// A frame survives overlap if it is at least this much stronger than every interferer.
pub const CAPTURE_THRESHOLD_DB: i16 = 6;

fn bandwidth_hz(index: u8) -> f64 {
    match index {
        1 => 250_000.0,
        2 => 500_000.0,
        _ => 125_000.0,
    }
}

fn symbol_time_ms(bandwidth: u8, spreading_factor: u8) -> f64 {
    f64::from(1u32 << spreading_factor) / bandwidth_hz(bandwidth) * 1000.0
}

/// Airtime of a LoRa packet in whole milliseconds (rounded up).
pub fn lora_time_on_air(config: &TxConfig, payload_len: usize) -> u32 {
    let sf = f64::from(config.spreading_factor);
    let t_sym = symbol_time_ms(config.bandwidth, config.spreading_factor);
    let low_rate = config.spreading_factor >= 11 && config.bandwidth == 0;
    let de = if low_rate { 1.0 } else { 0.0 };
    let ih = if config.fixed_length { 1.0 } else { 0.0 };
    let crc = if config.crc_on { 1.0 } else { 0.0 };

    let numerator = 8.0 * payload_len as f64 - 4.0 * sf + 28.0 + 16.0 * crc - 20.0 * ih;
    let blocks = (numerator / (4.0 * (sf - 2.0 * de))).ceil().max(0.0);
    let payload_symbols = 8.0 + blocks * (f64::from(config.coding_rate) + 4.0);
    let preamble = f64::from(config.preamble_len) + 4.25;

    ((preamble + payload_symbols) * t_sym).ceil() as u32
}

/// A receiver that has detected a preamble and follows one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxLock {
    pub transmission: u64,
    pub rssi: i16,
    pub collided: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Sleep,
    Standby,
    Receiving {
        channel_hz: u32,
        /// `None` for continuous reception.
        deadline_ms: Option<u64>,
        lock: Option<RxLock>,
    },
    Transmitting {
        end_ms: u64,
        /// `None` until the frame is put on the air; stays `None` for a frame
        /// that will never finish within the TX timeout.
        transmission: Option<u64>,
    },
    Cad {
        channel_hz: u32,
        end_ms: u64,
    },
}

/// A frame handed to the radio during the last poll, waiting to go on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub channel_hz: u32,
    pub bytes: Vec<u8>,
    pub airtime_ms: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioCounters {
    pub frames_sent: u32,
    pub frames_received: u32,
    pub collisions: u32,
    pub rx_timeouts: u32,
    pub tx_timeouts: u32,
    pub cad_runs: u32,
}

/// `RadioInterface` backed by the simulated medium.
///
/// The radio only records what the node asks for. `SimulatedMesh` moves
/// frames between radios and turns mode deadlines into radio events.
#[derive(Debug)]
pub struct SimRadio {
    channel_hz: u32,
    tx_config: Option<TxConfig>,
    rx_config: Option<RxConfig>,
    mode: RadioMode,
    now_ms: u64,
    outbox: Option<OutgoingFrame>,
    counters: RadioCounters,
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            channel_hz: 0,
            tx_config: None,
            rx_config: None,
            mode: RadioMode::Sleep,
            now_ms: 0,
            outbox: None,
            counters: RadioCounters::default(),
        }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn channel_hz(&self) -> u32 {
        self.channel_hz
    }

    pub fn counters(&self) -> &RadioCounters {
        &self.counters
    }

    pub fn rx_config(&self) -> Option<&RxConfig> {
        self.rx_config.as_ref()
    }

    pub(crate) fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub(crate) fn take_outbox(&mut self) -> Option<OutgoingFrame> {
        self.outbox.take()
    }

    /// Records the air id of the frame queued by the last `send`.
    pub(crate) fn on_air(&mut self, id: u64) {
        if let RadioMode::Transmitting { transmission, .. } = &mut self.mode {
            *transmission = Some(id);
        }
    }

    /// A frame started on the air within range. `interferer` is the RSSI of
    /// the strongest other frame already heard on the same channel.
    pub(crate) fn preamble(&mut self, tx: &Transmission, rssi: i16, interferer: Option<i16>) {
        let RadioMode::Receiving {
            channel_hz, lock, ..
        } = &mut self.mode
        else {
            return;
        };
        if *channel_hz != tx.channel_hz {
            return;
        }
        match lock {
            None => {
                *lock = Some(RxLock {
                    transmission: tx.id,
                    rssi,
                    collided: interferer.is_some_and(|i| rssi - i < CAPTURE_THRESHOLD_DB),
                });
            }
            Some(current) => {
                if current.rssi - rssi < CAPTURE_THRESHOLD_DB {
                    debug!(
                        "[sim] Frame #{} collides with #{} on {} Hz.",
                        tx.id, current.transmission, tx.channel_hz
                    );
                    current.collided = true;
                }
            }
        }
    }

    /// The sender's frame left the air.
    pub(crate) fn complete_transmission(&mut self, id: u64) -> Option<RadioEvent> {
        match self.mode {
            RadioMode::Transmitting {
                transmission: Some(current),
                ..
            } if current == id => {
                self.mode = RadioMode::Standby;
                self.counters.frames_sent += 1;
                Some(RadioEvent::TxDone)
            }
            _ => None,
        }
    }

    /// A frame within range ended. Produces RX done or RX error if this radio
    /// was following it.
    pub(crate) fn frame_ended(&mut self, tx: &Transmission, link: Link) -> Option<RadioEvent> {
        let RadioMode::Receiving {
            lock: Some(lock), ..
        } = self.mode
        else {
            return None;
        };
        if lock.transmission != tx.id {
            return None;
        }
        self.mode = RadioMode::Standby;
        if lock.collided {
            self.counters.collisions += 1;
            return Some(RadioEvent::RxError);
        }
        self.counters.frames_received += 1;
        trace!(
            "[sim] Frame #{} received, RSSI {} SNR {}.",
            tx.id,
            link.rssi,
            link.snr
        );
        Some(RadioEvent::RxDone(RxFrame::new(&tx.bytes, link.rssi, link.snr)))
    }

    /// Turns an elapsed deadline into its radio event. `busy` reports
    /// activity on a channel for CAD.
    pub(crate) fn expire(&mut self, busy: impl Fn(u32) -> bool) -> Option<RadioEvent> {
        let now = self.now_ms;
        match self.mode {
            RadioMode::Receiving {
                deadline_ms: Some(deadline),
                lock: None,
                ..
            } if now >= deadline => {
                self.mode = RadioMode::Standby;
                self.counters.rx_timeouts += 1;
                Some(RadioEvent::RxTimeout)
            }
            RadioMode::Transmitting {
                end_ms,
                transmission: None,
            } if now >= end_ms => {
                self.mode = RadioMode::Standby;
                self.counters.tx_timeouts += 1;
                Some(RadioEvent::TxTimeout)
            }
            RadioMode::Cad { channel_hz, end_ms } if now >= end_ms => {
                self.mode = RadioMode::Standby;
                Some(RadioEvent::CadDone {
                    activity: busy(channel_hz),
                })
            }
            _ => None,
        }
    }

    fn cad_duration_ms(&self) -> u64 {
        let (bandwidth, sf) = self
            .rx_config
            .map(|c| (c.bandwidth, c.spreading_factor))
            .unwrap_or((0, 7));
        ((2.0 * symbol_time_ms(bandwidth, sf)).ceil() as u64).max(1)
    }
}

impl RadioInterface for SimRadio {
    fn set_channel(&mut self, freq_hz: u32) {
        self.channel_hz = freq_hz;
    }

    fn set_tx_config(&mut self, config: &TxConfig) {
        self.tx_config = Some(*config);
    }

    fn set_rx_config(&mut self, config: &RxConfig) {
        self.rx_config = Some(*config);
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), MeshError> {
        let Some(config) = self.tx_config else {
            return Err(MeshError::InvalidConfig("TX configuration not set"));
        };
        if frame.len() > MAX_LORA_PAYLOAD {
            return Err(MeshError::FrameTooLarge);
        }
        if matches!(self.mode, RadioMode::Transmitting { .. }) {
            return Err(MeshError::RadioError);
        }

        let airtime_ms = lora_time_on_air(&config, frame.len());
        if airtime_ms > config.timeout_ms {
            self.mode = RadioMode::Transmitting {
                end_ms: self.now_ms + u64::from(config.timeout_ms),
                transmission: None,
            };
            return Ok(());
        }
        self.mode = RadioMode::Transmitting {
            end_ms: self.now_ms + u64::from(airtime_ms),
            transmission: None,
        };
        self.outbox = Some(OutgoingFrame {
            channel_hz: self.channel_hz,
            bytes: frame.to_vec(),
            airtime_ms,
        });
        Ok(())
    }

    fn receive(&mut self, timeout_ms: u32) {
        self.mode = RadioMode::Receiving {
            channel_hz: self.channel_hz,
            deadline_ms: (timeout_ms > 0).then(|| self.now_ms + u64::from(timeout_ms)),
            lock: None,
        };
    }

    fn standby(&mut self) {
        self.mode = RadioMode::Standby;
    }

    fn sleep(&mut self) {
        self.mode = RadioMode::Sleep;
    }

    fn start_cad(&mut self) {
        self.counters.cad_runs += 1;
        self.mode = RadioMode::Cad {
            channel_hz: self.channel_hz,
            end_ms: self.now_ms + self.cad_duration_ms(),
        };
    }

    fn status(&self) -> RadioStatus {
        match self.mode {
            RadioMode::Sleep | RadioMode::Standby => RadioStatus::Idle,
            RadioMode::Receiving { .. } => RadioStatus::RxRunning,
            RadioMode::Transmitting { .. } => RadioStatus::TxRunning,
            RadioMode::Cad { .. } => RadioStatus::Cad,
        }
    }

    fn time_on_air(&self, payload_len: usize) -> u32 {
        match &self.tx_config {
            Some(config) => lora_time_on_air(config, payload_len),
            None => 0,
        }
    }
}
