// crates/meshlora-rs/src/frame/data.rs

use crate::frame::codec::{Codec, CodecHelpers};
use crate::frame::header::FrameType;
use crate::hal::MeshError;
use crate::types::{APP_PAYLOAD_LEN, Address, DATA_FRAME_LEN};

/// Offset of the next-hop address; relays rewrite it in place.
pub const NEXT_HOP_OFFSET: usize = 7;
/// Offset of the originating node's address.
pub const SOURCE_OFFSET: usize = 5;

/// Sensor reading travelling toward the sink. A relayed DATA frame is a RELAY frame;
/// only the next-hop field changes along the path.
///
/// Layout: `[hdr, 10, 0, seq, 12, src(2), next_hop(2), payload(8)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame {
    pub sequence: u8,
    /// The originating node.
    pub source: Address,
    pub next_hop: Address,
    pub payload: [u8; APP_PAYLOAD_LEN],
}

impl DataFrame {
    /// Overwrites the next-hop field of an encoded DATA frame.
    pub fn rewrite_next_hop(buffer: &mut [u8], next_hop: Address) -> Result<(), MeshError> {
        if buffer.len() < NEXT_HOP_OFFSET + 2 {
            return Err(MeshError::BufferTooShort);
        }
        CodecHelpers::write_address(next_hop, buffer, NEXT_HOP_OFFSET);
        Ok(())
    }

    /// Reads the origin of an encoded DATA frame without decoding the rest.
    pub fn peek_source(buffer: &[u8]) -> Result<Address, MeshError> {
        CodecHelpers::read_address(buffer, SOURCE_OFFSET)
    }
}

impl Codec for DataFrame {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        CodecHelpers::ensure_capacity(buffer, DATA_FRAME_LEN)?;
        CodecHelpers::write_prefix(FrameType::Data, buffer);
        buffer[2] = 0;
        buffer[3] = self.sequence;
        buffer[4] = (4 + APP_PAYLOAD_LEN) as u8;
        CodecHelpers::write_address(self.source, buffer, SOURCE_OFFSET);
        CodecHelpers::write_address(self.next_hop, buffer, NEXT_HOP_OFFSET);
        buffer[9..DATA_FRAME_LEN].copy_from_slice(&self.payload);
        Ok(DATA_FRAME_LEN)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError> {
        CodecHelpers::expect_len(buffer, DATA_FRAME_LEN)?;
        Ok(Self {
            sequence: buffer[3],
            source: CodecHelpers::read_address(buffer, SOURCE_OFFSET)?,
            next_hop: CodecHelpers::read_address(buffer, NEXT_HOP_OFFSET)?,
            payload: buffer[9..DATA_FRAME_LEN].try_into()?,
        })
    }
}
