// crates/meshlora-rs-sim/src/lib.rs

//! Host-side simulation of a MeshLoRa network.
//!
//! Every node runs the unmodified `meshlora-rs` state machine against a
//! simulated HAL: `SimRadio` for the transceiver, `SimTimers` for the timer
//! service and `SimRandom` for backoffs and hop selection. `SimulatedMesh`
//! owns the nodes and a `VirtualAir` medium and advances them together in
//! 1 ms steps of virtual time, so multi-hop scenarios run deterministically
//! for a given set of seeds.

pub mod air;
pub mod network;
pub mod radio;
pub mod rng;
pub mod timers;

pub use air::{Link, Transmission, VirtualAir};
pub use network::{SimNode, SimulatedMesh};
pub use radio::{RadioCounters, RadioMode, SimRadio, lora_time_on_air};
pub use rng::SimRandom;
pub use timers::SimTimers;
