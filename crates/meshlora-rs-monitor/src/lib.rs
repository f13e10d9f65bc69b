// crates/meshlora-rs-monitor/src/lib.rs

// This crate requires std for the web server and tokio
pub mod model;
mod server;

pub use model::{DiagnosticSnapshot, NodeCounters, NodeSnapshot, RouteInfo};
pub use server::{MonitorState, router, start_web_server};

// Imports for 'in-process' mode
#[cfg(feature = "in-process")]
use crossbeam_channel::Receiver;
#[cfg(feature = "in-process")]
use log::info;
#[cfg(feature = "in-process")]
use std::net::SocketAddr;

/// Snapshots a lagging WebSocket client may fall behind before skipping.
pub const SNAPSHOT_BACKLOG: usize = 16;

/// Starts the web monitor in "in-process" mode.
///
/// The node loop runs in its own thread and pushes `DiagnosticSnapshot`s
/// into a bounded crossbeam channel with `try_send`, so it never blocks on
/// the monitor. This function bridges that channel into the web server and
/// serves `addr` until the server fails.
#[cfg(feature = "in-process")]
pub async fn start_in_process_monitor(
    addr: SocketAddr,
    receiver: Receiver<DiagnosticSnapshot>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = MonitorState::new(SNAPSHOT_BACKLOG);

    let bridge_state = state.clone();
    tokio::task::spawn_blocking(move || {
        while let Ok(snapshot) = receiver.recv() {
            bridge_state.publish(snapshot);
        }
        info!("Snapshot channel closed; the monitor keeps serving the last state.");
    });

    start_web_server(addr, state).await?;
    Ok(())
}
