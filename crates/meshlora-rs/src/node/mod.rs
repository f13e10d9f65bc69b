//! The mesh protocol state machine.

pub mod config;
pub mod events;
pub mod scheduler;
pub mod state;

mod dispatch;
mod mesh;
mod radio;
mod receive;
mod tick;

pub use config::{NodeConfig, ProtocolTimings, RadioSettings};
pub use events::{ProtocolState, RadioEvent, RxFrame};
pub use mesh::MeshNode;
pub use scheduler::AdvertScheduler;
pub use state::{AckWait, DeliveredFrame, DutyState, NodeStatistics, TxKind};
