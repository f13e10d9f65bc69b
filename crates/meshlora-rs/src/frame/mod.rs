//! Wire encoding of the mesh frames.

pub mod codec;
pub mod control;
pub mod data;
pub mod header;
pub mod router;

pub use codec::{Codec, deserialize_frame};
pub use control::{Ack0Frame, Ack1Frame, Rts0Frame, Rts1Frame};
pub use data::DataFrame;
pub use header::{FrameType, MESH_HEADER_BYTE, MeshHeader, is_mesh_frame};
pub use router::{AdvertisedRoute, RouterFrame};

use crate::hal::MeshError;

/// Represents any mesh frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshFrame {
    Rts0(Rts0Frame),
    Rts1(Rts1Frame),
    Ack0(Ack0Frame),
    Ack1(Ack1Frame),
    Router(RouterFrame),
    Data(DataFrame),
}

impl MeshFrame {
    /// Returns the sub-type this frame is sent with.
    pub fn frame_type(&self) -> FrameType {
        match self {
            MeshFrame::Rts0(_) => FrameType::Rts0,
            MeshFrame::Rts1(_) => FrameType::Rts1,
            MeshFrame::Ack0(_) => FrameType::Ack0,
            MeshFrame::Ack1(f) => FrameType::Ack1(f.hop.get()),
            MeshFrame::Router(_) => FrameType::Router,
            MeshFrame::Data(_) => FrameType::Data,
        }
    }

    /// True for the handshake frames (RTS and ACK of both kinds).
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            MeshFrame::Rts0(_) | MeshFrame::Rts1(_) | MeshFrame::Ack0(_) | MeshFrame::Ack1(_)
        )
    }

    /// Serializes whichever frame this is.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        match self {
            MeshFrame::Rts0(f) => f.serialize(buffer),
            MeshFrame::Rts1(f) => f.serialize(buffer),
            MeshFrame::Ack0(f) => f.serialize(buffer),
            MeshFrame::Ack1(f) => f.serialize(buffer),
            MeshFrame::Router(f) => f.serialize(buffer),
            MeshFrame::Data(f) => f.serialize(buffer),
        }
    }
}
