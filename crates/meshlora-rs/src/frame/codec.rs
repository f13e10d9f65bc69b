use crate::frame::header::{FrameType, MESH_HEADER_BYTE, is_mesh_frame};
use crate::frame::{Ack0Frame, Ack1Frame, DataFrame, MeshFrame, RouterFrame, Rts0Frame, Rts1Frame};
use crate::hal::MeshError;
use crate::types::{Address, MAX_FRAME_LEN};
use log::trace;

/// A trait for objects that can be serialized into and deserialized from a byte buffer.
pub trait Codec: Sized {
    /// Serializes the object into the provided buffer, starting at the mesh header byte.
    /// Returns the number of bytes written.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError>;

    /// Deserializes an object from a received frame, starting at the mesh header byte.
    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError>;
}

/// Contains helper functions for common serialization/deserialization tasks.
pub struct CodecHelpers;
impl CodecHelpers {
    /// Writes the mesh header and sub-type byte. Caller has checked the length.
    pub fn write_prefix(frame_type: FrameType, buffer: &mut [u8]) {
        buffer[0] = MESH_HEADER_BYTE;
        buffer[1] = frame_type.to_byte();
    }

    /// Checks the mesh header and returns the decoded sub-type.
    pub fn read_prefix(buffer: &[u8]) -> Result<FrameType, MeshError> {
        if !is_mesh_frame(buffer) {
            return Err(if buffer.is_empty() {
                MeshError::BufferTooShort
            } else {
                MeshError::ForeignFrame
            });
        }
        let subtype = *buffer.get(1).ok_or(MeshError::BufferTooShort)?;
        FrameType::try_from(subtype)
    }

    /// Ensures an output buffer can hold `needed` bytes.
    pub fn ensure_capacity(buffer: &[u8], needed: usize) -> Result<(), MeshError> {
        if needed > MAX_FRAME_LEN {
            return Err(MeshError::FrameTooLarge);
        }
        if buffer.len() < needed {
            return Err(MeshError::BufferTooShort);
        }
        Ok(())
    }

    /// Ensures a received fixed-size frame has exactly the expected length.
    pub fn expect_len(buffer: &[u8], expected: usize) -> Result<(), MeshError> {
        if buffer.len() != expected {
            return Err(MeshError::InvalidFrameLength {
                expected,
                actual: buffer.len(),
            });
        }
        Ok(())
    }

    pub fn read_address(buffer: &[u8], offset: usize) -> Result<Address, MeshError> {
        let bytes = buffer
            .get(offset..offset + 2)
            .ok_or(MeshError::BufferTooShort)?;
        Ok(Address::from_le_bytes(bytes.try_into()?))
    }

    pub fn write_address(address: Address, buffer: &mut [u8], offset: usize) {
        buffer[offset..offset + 2].copy_from_slice(&address.to_le_bytes());
    }
}

/// Parses a received radio payload into a `MeshFrame`.
///
/// Returns `MeshError::ForeignFrame` when the first byte is not the mesh
/// header. Callers treat that as "not for this protocol" and drop the frame
/// without touching any state.
pub fn deserialize_frame(buffer: &[u8]) -> Result<MeshFrame, MeshError> {
    let frame_type = CodecHelpers::read_prefix(buffer)?;

    let result = match frame_type {
        FrameType::Rts0 => Rts0Frame::deserialize(buffer).map(MeshFrame::Rts0),
        FrameType::Rts1 => Rts1Frame::deserialize(buffer).map(MeshFrame::Rts1),
        FrameType::Ack0 => Ack0Frame::deserialize(buffer).map(MeshFrame::Ack0),
        FrameType::Ack1(_) => Ack1Frame::deserialize(buffer).map(MeshFrame::Ack1),
        FrameType::Router => RouterFrame::deserialize(buffer).map(MeshFrame::Router),
        FrameType::Data => DataFrame::deserialize(buffer).map(MeshFrame::Data),
    };

    if let Ok(frame) = &result {
        trace!("Deserialized mesh frame: {:?}", frame);
    }

    result
}
