use core::fmt;

/// Represents a MeshLoRa node address, wrapping a `u16` to ensure type safety.
///
/// Addresses travel little-endian on the wire. Two addresses are well known to
/// every node: its own and the sink's. Neither is special at the type level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub u16);

impl Address {
    /// Encodes the address in wire order.
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Decodes an address from two wire-order bytes.
    pub const fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Address(u16::from_le_bytes(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u16> for Address {
    fn from(value: u16) -> Self {
        Address(value)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.0
    }
}

// --- Protocol Constants ---

/// Major version carried in bits 0-1 of the mesh header byte.
pub const MESH_HEADER_VERSION: u8 = 0;
/// Reserved field value carried in bits 2-4 of the mesh header byte.
pub const MESH_HEADER_RESERVED: u8 = 1;
/// Message type carried in bits 5-7 of the mesh header byte.
pub const MESH_HEADER_TYPE: u8 = 7;

/// Largest frame the radio buffers hold (64 bytes).
pub const MAX_FRAME_LEN: usize = 64;

/// Length of RTS0, ACK0 and ACK1 frames.
pub const RTS0_ACK_LEN: usize = 4;
/// Length of an RTS1 frame.
pub const RTS1_LEN: usize = 6;

/// Length of the application payload carried by DATA frames.
pub const APP_PAYLOAD_LEN: usize = 8;
/// Length of the DATA frame header (mesh header, frame type, sequence, payload length).
pub const FRAME_HEADER_LEN: usize = 5;
/// Total length of a DATA/RELAY frame.
pub const DATA_FRAME_LEN: usize = FRAME_HEADER_LEN + 4 + APP_PAYLOAD_LEN;
/// Fixed part of a ROUTER frame: frame header, sender address and destination count.
pub const ROUTER_FIXED_LEN: usize = FRAME_HEADER_LEN + 3;
/// Largest destination list that still fits a ROUTER frame in `MAX_FRAME_LEN`.
pub const MAX_ROUTER_DESTINATIONS: usize = (MAX_FRAME_LEN - ROUTER_FIXED_LEN) / 3;

/// Sequence numbers carried in ROUTER and DATA frames wrap at this modulus.
pub const SEQUENCE_MODULUS: u32 = 255;

/// Default capacity of the queue holding locally originated frames.
pub const OUTGOING_QUEUE_CAPACITY: usize = 6;
/// Default capacity of the queue holding frames relayed for other nodes.
pub const RELAY_QUEUE_CAPACITY: usize = 4;
/// Default number of routing table slots.
pub const ROUTING_TABLE_CAPACITY: usize = 100;

/// Delivered frames the sink buffers until the application drains them.
pub const DELIVERED_INBOX_CAPACITY: usize = 16;

/// Number of sent advertisements at which the advertisement interval doubles.
pub const ADVERT_MILESTONES: [u32; 5] = [20, 50, 100, 500, 1000];

/// Additional listen attempts granted to a peer after an ACK1 before the reservation is released.
pub const MAX_MISSED_DATA: u8 = 2;

/// Consecutive activity-free CAD results required before an RTS goes out.
pub const CAD_CLEAR_ROUNDS: u8 = 2;

/// Number of hop channels a 4-bit hop index can address.
pub const MAX_HOP_CHANNELS: usize = 16;

/// Index into the configured list of auxiliary hop frequencies.
///
/// The index travels in the upper nibble of the ACK1 sub-type byte, so values
/// are limited to `0..MAX_HOP_CHANNELS`. Whether the index fits the node's
/// actual hop table is checked where the table is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HopIndex(u8);

/// Error type for invalid hop index creation.
#[derive(Debug, PartialEq, Eq)]
pub enum HopIndexError {
    /// Hop index does not fit the 4-bit wire field.
    OutOfRange(u8),
}

impl fmt::Display for HopIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopIndexError::OutOfRange(value) => write!(
                f,
                "Invalid hop index {}. Valid range is 0-{}.",
                value,
                MAX_HOP_CHANNELS - 1
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HopIndexError {}

impl HopIndex {
    /// Returns the raw index.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the index as a `usize` for table lookups.
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for HopIndex {
    type Error = HopIndexError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (value as usize) < MAX_HOP_CHANNELS {
            Ok(HopIndex(value))
        } else {
            Err(HopIndexError::OutOfRange(value))
        }
    }
}

impl From<HopIndex> for u8 {
    fn from(hop: HopIndex) -> Self {
        hop.0
    }
}
