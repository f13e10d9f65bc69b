use crate::types::HopIndexError;
use core::array::TryFromSliceError;
use core::fmt;

/// Defines a portable, descriptive Error type for the MeshLoRa stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshError {
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// The first byte is not the mesh header; the frame belongs to another protocol.
    ForeignFrame,
    /// A mesh frame has a length that does not match its sub-type.
    InvalidFrameLength { expected: usize, actual: usize },
    /// The sub-type byte does not name a known mesh frame.
    UnknownFrameType(u8),
    /// A hop index does not fit the wire field or the configured hop table.
    InvalidHopIndex(u8),
    /// A ROUTER frame would carry more destinations than fit a radio buffer.
    TooManyDestinations(usize),
    /// The transmit queue is full; the frame was dropped and counted.
    QueueFull,
    /// The routing table has no free slot left.
    RoutingTableFull,
    /// The frame exceeds the radio buffer size.
    FrameTooLarge,
    /// The node configuration is inconsistent.
    InvalidConfig(&'static str),
    /// The radio driver refused a command.
    RadioError,
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "Buffer is too short for the frame"),
            Self::ForeignFrame => write!(f, "Frame does not carry the mesh header"),
            Self::InvalidFrameLength { expected, actual } => write!(
                f,
                "Invalid frame length: expected {expected} bytes, got {actual}"
            ),
            Self::UnknownFrameType(v) => write!(f, "Unknown mesh frame type: {v:#04x}"),
            Self::InvalidHopIndex(v) => write!(f, "Invalid frequency hop index: {v}"),
            Self::TooManyDestinations(n) => {
                write!(f, "ROUTER frame cannot carry {n} destinations")
            }
            Self::QueueFull => write!(f, "Transmit queue is full"),
            Self::RoutingTableFull => write!(f, "Routing table capacity exhausted"),
            Self::FrameTooLarge => write!(f, "Frame size exceeds the radio buffer"),
            Self::InvalidConfig(s) => write!(f, "Invalid node configuration: {s}"),
            Self::RadioError => write!(f, "Radio driver error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MeshError {}

// --- From Implementations for Error Conversion ---

impl From<TryFromSliceError> for MeshError {
    fn from(_: TryFromSliceError) -> Self {
        MeshError::BufferTooShort
    }
}

impl From<HopIndexError> for MeshError {
    fn from(err: HopIndexError) -> Self {
        match err {
            HopIndexError::OutOfRange(val) => MeshError::InvalidHopIndex(val),
        }
    }
}

/// Coarse radio status as reported by the transceiver driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    /// Standby or sleep; ready for a new command.
    Idle,
    /// Receiving.
    RxRunning,
    /// Transmitting.
    TxRunning,
    /// Channel activity detection in progress.
    Cad,
}

/// LoRa transmit parameters handed to the driver at bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfig {
    pub power_dbm: i8,
    /// Bandwidth index: 0 = 125 kHz, 1 = 250 kHz, 2 = 500 kHz.
    pub bandwidth: u8,
    pub spreading_factor: u8,
    /// Coding rate index: 1 = 4/5 .. 4 = 4/8.
    pub coding_rate: u8,
    pub preamble_len: u16,
    pub fixed_length: bool,
    pub crc_on: bool,
    pub iq_inverted: bool,
    pub timeout_ms: u32,
}

/// LoRa receive parameters handed to the driver at bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxConfig {
    pub bandwidth: u8,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub preamble_len: u16,
    pub symbol_timeout: u16,
    pub fixed_length: bool,
    pub crc_on: bool,
    pub iq_inverted: bool,
    pub continuous: bool,
}

/// Hardware Abstraction Layer (HAL) for the LoRa transceiver.
///
/// Commands return immediately; completion is reported asynchronously through
/// `MeshNode::on_radio_event`, which the driver calls from its interrupt
/// handlers.
pub trait RadioInterface {
    /// Tunes the transceiver to `freq_hz`.
    fn set_channel(&mut self, freq_hz: u32);

    /// Applies the transmit modulation parameters.
    fn set_tx_config(&mut self, config: &TxConfig);

    /// Applies the receive modulation parameters.
    fn set_rx_config(&mut self, config: &RxConfig);

    /// Starts transmitting `frame`. Completion arrives as tx-done or tx-timeout.
    fn send(&mut self, frame: &[u8]) -> Result<(), MeshError>;

    /// Starts receiving. A `timeout_ms` of 0 receives continuously.
    fn receive(&mut self, timeout_ms: u32);

    /// Puts the transceiver in standby.
    fn standby(&mut self);

    /// Puts the transceiver in low-power sleep.
    fn sleep(&mut self);

    /// Starts a channel activity detection cycle. Completion arrives as cad-done.
    fn start_cad(&mut self);

    /// Returns the current driver status.
    fn status(&self) -> RadioStatus;

    /// Returns the on-air duration of a `payload_len` byte frame in milliseconds.
    fn time_on_air(&self, payload_len: usize) -> u32;
}

/// Identifies one of the node's one-shot software timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerId {
    /// Periodic router advertisement.
    Advertisement,
    /// Periodic sensor reading.
    SensorData,
    /// Random backoff after contention or a transmit timeout.
    Backoff,
    /// Awake/asleep window boundaries.
    DutyCycle,
    /// Gap between the two clear CAD rounds.
    CadRepeat,
}

impl TimerId {
    /// All timers, in the order their fire events are consumed.
    pub const ALL: [TimerId; 5] = [
        TimerId::Advertisement,
        TimerId::SensorData,
        TimerId::Backoff,
        TimerId::DutyCycle,
        TimerId::CadRepeat,
    ];

    /// Bit used to record a pending fire event in a single word.
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Hardware Abstraction Layer (HAL) for the board's one-shot timers.
///
/// Fire events are delivered to `MeshNode::on_timer_fired` by the
/// application's timer interrupt handler.
pub trait TimerService {
    /// Sets the duration of `timer` without starting it.
    fn set_value(&mut self, timer: TimerId, duration_ms: u32);

    /// Starts (or restarts) `timer` with its last configured duration.
    fn start(&mut self, timer: TimerId);

    /// Stops `timer`; a stopped timer never fires.
    fn stop(&mut self, timer: TimerId);

    /// Busy-waits for `duration_ms`.
    fn delay_ms(&mut self, duration_ms: u32);

    /// Returns a monotonic millisecond clock, used for log context.
    fn now_ms(&self) -> u64;
}

/// Source of pseudo-random numbers for backoff intervals and hop selection.
pub trait RandomSource {
    /// Returns a value in the inclusive range `min..=max`.
    fn random_range(&mut self, min: u32, max: u32) -> u32;
}
