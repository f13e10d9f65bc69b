// crates/meshlora-rs/src/frame/router.rs

use crate::frame::codec::{Codec, CodecHelpers};
use crate::frame::header::FrameType;
use crate::hal::MeshError;
use crate::types::{Address, MAX_ROUTER_DESTINATIONS, ROUTER_FIXED_LEN};
use alloc::vec::Vec;

/// One advertised route: destination and the sender's cost to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisedRoute {
    pub destination: Address,
    pub cost: u8,
}

/// Distance-vector advertisement.
///
/// Layout: `[hdr, 8, sink_flag, seq, len, src(2), n, dest(2) * n, cost * n]`
/// where `len = 3n + 3` counts the sender, the count and the lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterFrame {
    /// Set when the sender is the sink itself.
    pub from_sink: bool,
    /// Advertisement sequence number, already reduced mod 255.
    pub sequence: u8,
    pub source: Address,
    pub routes: Vec<AdvertisedRoute>,
}

impl RouterFrame {
    /// Total encoded size for `count` destinations.
    pub const fn encoded_len(count: usize) -> usize {
        ROUTER_FIXED_LEN + 3 * count
    }
}

impl Codec for RouterFrame {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, MeshError> {
        let count = self.routes.len();
        if count > MAX_ROUTER_DESTINATIONS {
            return Err(MeshError::TooManyDestinations(count));
        }
        let total = Self::encoded_len(count);
        CodecHelpers::ensure_capacity(buffer, total)?;

        CodecHelpers::write_prefix(FrameType::Router, buffer);
        buffer[2] = self.from_sink as u8;
        buffer[3] = self.sequence;
        buffer[4] = (3 * count + 3) as u8;
        CodecHelpers::write_address(self.source, buffer, 5);
        buffer[7] = count as u8;

        let costs_offset = ROUTER_FIXED_LEN + 2 * count;
        for (i, route) in self.routes.iter().enumerate() {
            CodecHelpers::write_address(route.destination, buffer, ROUTER_FIXED_LEN + 2 * i);
            buffer[costs_offset + i] = route.cost;
        }
        Ok(total)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, MeshError> {
        if buffer.len() < ROUTER_FIXED_LEN {
            return Err(MeshError::BufferTooShort);
        }
        let count = buffer[7] as usize;
        if count > MAX_ROUTER_DESTINATIONS {
            return Err(MeshError::TooManyDestinations(count));
        }
        let total = Self::encoded_len(count);
        if buffer.len() < total {
            return Err(MeshError::InvalidFrameLength {
                expected: total,
                actual: buffer.len(),
            });
        }

        let costs_offset = ROUTER_FIXED_LEN + 2 * count;
        let mut routes = Vec::with_capacity(count);
        for i in 0..count {
            routes.push(AdvertisedRoute {
                destination: CodecHelpers::read_address(buffer, ROUTER_FIXED_LEN + 2 * i)?,
                cost: buffer[costs_offset + i],
            });
        }

        Ok(Self {
            from_sink: buffer[2] != 0,
            sequence: buffer[3],
            source: CodecHelpers::read_address(buffer, 5)?,
            routes,
        })
    }
}
