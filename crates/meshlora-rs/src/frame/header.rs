// crates/meshlora-rs/src/frame/header.rs

use crate::hal::MeshError;
use crate::types::{MESH_HEADER_RESERVED, MESH_HEADER_TYPE, MESH_HEADER_VERSION};

const VERSION_SHIFT: u8 = 0;
const VERSION_MASK: u8 = 0b0000_0011;
const RESERVED_SHIFT: u8 = 2;
const RESERVED_MASK: u8 = 0b0001_1100;
const TYPE_SHIFT: u8 = 5;
const TYPE_MASK: u8 = 0b1110_0000;

/// The fields packed into the first byte of every mesh frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshHeader {
    pub version: u8,
    pub reserved: u8,
    pub message_type: u8,
}

impl MeshHeader {
    /// The only header the mesh accepts.
    pub const MESH: MeshHeader = MeshHeader {
        version: MESH_HEADER_VERSION,
        reserved: MESH_HEADER_RESERVED,
        message_type: MESH_HEADER_TYPE,
    };

    /// Packs the three fields into one byte (version in the low bits).
    pub const fn encode(self) -> u8 {
        ((self.version << VERSION_SHIFT) & VERSION_MASK)
            | ((self.reserved << RESERVED_SHIFT) & RESERVED_MASK)
            | ((self.message_type << TYPE_SHIFT) & TYPE_MASK)
    }

    /// Unpacks a header byte. Every byte decodes; use `is_mesh` to classify it.
    pub const fn decode(byte: u8) -> Self {
        MeshHeader {
            version: (byte & VERSION_MASK) >> VERSION_SHIFT,
            reserved: (byte & RESERVED_MASK) >> RESERVED_SHIFT,
            message_type: (byte & TYPE_MASK) >> TYPE_SHIFT,
        }
    }

    pub const fn is_mesh(self) -> bool {
        self.version == MESH_HEADER_VERSION
            && self.reserved == MESH_HEADER_RESERVED
            && self.message_type == MESH_HEADER_TYPE
    }
}

/// The encoded mesh header byte.
pub const MESH_HEADER_BYTE: u8 = MeshHeader::MESH.encode();

/// Returns true if `buffer` starts with the mesh header byte.
pub fn is_mesh_frame(buffer: &[u8]) -> bool {
    buffer
        .first()
        .is_some_and(|&b| MeshHeader::decode(b).is_mesh())
}

/// Sub-type selector carried in the second byte of every mesh frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Rts0,
    Rts1,
    Ack0,
    /// Carries the raw hop index found in the upper nibble.
    Ack1(u8),
    Router,
    Data,
}

impl FrameType {
    pub const RTS0: u8 = 0;
    pub const RTS1: u8 = 1;
    pub const ACK0: u8 = 2;
    pub const ACK1: u8 = 3;
    pub const ROUTER: u8 = 8;
    pub const DATA: u8 = 10;

    /// Returns the sub-type byte as it goes on the wire.
    pub const fn to_byte(self) -> u8 {
        match self {
            FrameType::Rts0 => Self::RTS0,
            FrameType::Rts1 => Self::RTS1,
            FrameType::Ack0 => Self::ACK0,
            FrameType::Ack1(hop) => Self::ACK1 | (hop << 4),
            FrameType::Router => Self::ROUTER,
            FrameType::Data => Self::DATA,
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = MeshError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        // ACKs are matched on the low nibble only; ACK1 reuses the high nibble.
        match value & 0x0F {
            Self::ACK0 => return Ok(FrameType::Ack0),
            Self::ACK1 => return Ok(FrameType::Ack1(value >> 4)),
            _ => {}
        }
        match value {
            Self::RTS0 => Ok(FrameType::Rts0),
            Self::RTS1 => Ok(FrameType::Rts1),
            Self::ROUTER => Ok(FrameType::Router),
            Self::DATA => Ok(FrameType::Data),
            _ => Err(MeshError::UnknownFrameType(value)),
        }
    }
}
