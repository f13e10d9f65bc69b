// crates/meshlora-rs/src/frame/control.rs

use crate::frame::codec::{Codec, CodecHelpers};
use crate::frame::header::FrameType;
use crate::hal::MeshError;
use crate::types::{Address, HopIndex, RTS0_ACK_LEN, RTS1_LEN};

/// Request-to-send announcing a pending router advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rts0Frame {
    pub source: Address,
}

/// Request-to-send addressed to the next hop, announcing a pending DATA/RELAY frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rts1Frame {
    pub next_hop: Address,
    pub source: Address,
}

/// Clear-to-send reply to an RTS0. `target` is the RTS0 sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack0Frame {
    pub target: Address,
}

/// Clear-to-send reply to an RTS1, naming the hop channel the payload must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack1Frame {
    pub target: Address,
    pub hop: HopIndex,
}

impl Codec for Rts0Frame {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        CodecHelpers::ensure_capacity(buffer, RTS0_ACK_LEN)?;
        CodecHelpers::write_prefix(FrameType::Rts0, buffer);
        CodecHelpers::write_address(self.source, buffer, 2);
        Ok(RTS0_ACK_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError> {
        CodecHelpers::expect_len(buffer, RTS0_ACK_LEN)?;
        Ok(Self {
            source: CodecHelpers::read_address(buffer, 2)?,
        })
    }
}

impl Codec for Rts1Frame {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        CodecHelpers::ensure_capacity(buffer, RTS1_LEN)?;
        CodecHelpers::write_prefix(FrameType::Rts1, buffer);
        CodecHelpers::write_address(self.next_hop, buffer, 2);
        CodecHelpers::write_address(self.source, buffer, 4);
        Ok(RTS1_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError> {
        CodecHelpers::expect_len(buffer, RTS1_LEN)?;
        Ok(Self {
            next_hop: CodecHelpers::read_address(buffer, 2)?,
            source: CodecHelpers::read_address(buffer, 4)?,
        })
    }
}

impl Codec for Ack0Frame {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        CodecHelpers::ensure_capacity(buffer, RTS0_ACK_LEN)?;
        CodecHelpers::write_prefix(FrameType::Ack0, buffer);
        CodecHelpers::write_address(self.target, buffer, 2);
        Ok(RTS0_ACK_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError> {
        CodecHelpers::expect_len(buffer, RTS0_ACK_LEN)?;
        Ok(Self {
            target: CodecHelpers::read_address(buffer, 2)?,
        })
    }
}

impl Codec for Ack1Frame {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        CodecHelpers::ensure_capacity(buffer, RTS0_ACK_LEN)?;
        CodecHelpers::write_prefix(FrameType::Ack1(self.hop.get()), buffer);
        CodecHelpers::write_address(self.target, buffer, 2);
        Ok(RTS0_ACK_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError> {
        CodecHelpers::expect_len(buffer, RTS0_ACK_LEN)?;
        // Hop index lives in the upper nibble, so it always fits the 4-bit range.
        let hop = HopIndex::try_from(buffer[1] >> 4)?;
        Ok(Self {
            target: CodecHelpers::read_address(buffer, 2)?,
            hop,
        })
    }
}
