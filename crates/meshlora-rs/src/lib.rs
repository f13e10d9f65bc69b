#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' backs the routing table map, the queue slot storage and ROUTER destination lists.
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod hal;

// --- Frame Codec ---
pub mod frame;

// --- Routing and Queueing ---
pub mod routing;
pub mod queue;

// --- Protocol State Machine ---
pub mod node;

// --- Top-level Exports ---
pub use types::{Address, HopIndex};
pub use hal::{
    MeshError, RadioInterface, RadioStatus, RandomSource, RxConfig, TimerId, TimerService,
    TxConfig,
};
pub use frame::codec::{Codec, deserialize_frame};
pub use frame::MeshFrame;
pub use routing::{RouteEntry, RouteUpdate, RoutingTable};
pub use queue::{FrameQueue, QueueEntry, TransmitQueues};
pub use node::{
    DeliveredFrame, DutyState, MeshNode, NodeConfig, NodeStatistics, ProtocolState,
    ProtocolTimings, RadioEvent, RadioSettings, RxFrame,
};
