//! Runs a small simulated mesh and a live web monitor in parallel.
//!
//! The simulation runs in its own thread, paced to real time, and pushes a
//! snapshot of every node into a bounded channel once per simulated second.
//! The web monitor runs on the tokio runtime in the main thread.
//!
//! Run with `cargo run -p meshlora-rs-sim --example mesh_demo`, then open
//! http://127.0.0.1:8080. Set `MESH_MONITOR_ADDR` to bind elsewhere and
//! `MESH_SPEEDUP` to run faster than real time.

use crossbeam_channel::{self, Sender};
use log::{error, info, warn};
use meshlora_rs::{Address, NodeConfig};
use meshlora_rs_monitor::{DiagnosticSnapshot, start_in_process_monitor};
use meshlora_rs_sim::SimulatedMesh;
use std::{
    env,
    net::SocketAddr,
    process, thread,
    time::{Duration, Instant},
};

const SINK: Address = Address(0x0001);

#[tokio::main]
async fn main() {
    env_logger::try_init().ok();

    // Capacity 1: the simulation never blocks, it just drops a snapshot if
    // the web server is behind.
    let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(1);

    let speedup = env::var("MESH_SPEEDUP")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1)
        .max(1);

    thread::spawn(move || {
        if let Err(e) = run_simulation(snapshot_tx, speedup) {
            error!("[sim] Simulation failed: {}", e);
            process::exit(1);
        }
    });

    let addr: SocketAddr = match env::var("MESH_MONITOR_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid MESH_MONITOR_ADDR: {}", e);
            process::exit(1);
        }
    };

    info!("Starting web monitor on {}...", addr);
    if let Err(e) = start_in_process_monitor(addr, snapshot_rx).await {
        error!("Web monitor failed: {}", e);
        process::exit(1);
    }
}

/// Builds a five-node tree:
///
/// ```text
///   sink --- 0x0002 --- 0x0004
///     \         |
///      \--- 0x0003 --- 0x0005
/// ```
fn build_mesh() -> Result<SimulatedMesh, String> {
    let mut mesh = SimulatedMesh::new();
    let add = |mesh: &mut SimulatedMesh, address: u16, seed: u64| {
        mesh.add_node(NodeConfig::new(Address(address), SINK), seed)
            .map_err(|e| format!("node {:#06x}: {}", address, e))
    };
    add(&mut mesh, 0x0001, 1)?;
    add(&mut mesh, 0x0002, 2)?;
    add(&mut mesh, 0x0003, 3)?;
    add(&mut mesh, 0x0004, 4)?;
    add(&mut mesh, 0x0005, 5)?;

    let links = [
        (0x0001, 0x0002, -62),
        (0x0001, 0x0003, -70),
        (0x0002, 0x0003, -78),
        (0x0002, 0x0004, -74),
        (0x0003, 0x0005, -81),
    ];
    for (a, b, rssi) in links {
        mesh.link(Address(a), Address(b), rssi)
            .map_err(|e| format!("link {:#06x}-{:#06x}: {}", a, b, e))?;
    }
    Ok(mesh)
}

fn run_simulation(snapshot_tx: Sender<DiagnosticSnapshot>, speedup: u32) -> Result<(), String> {
    let mut mesh = build_mesh()?;
    mesh.start();
    info!("[sim] Running at {}x real time.", speedup);

    let wall_start = Instant::now();
    loop {
        mesh.step();

        for frame in mesh.take_delivered() {
            info!(
                "[sim] t={} ms: sink got seq {} from {} ({:02X?}, RSSI {})",
                mesh.now_ms(),
                frame.sequence,
                frame.source,
                frame.payload,
                frame.rssi
            );
        }

        if mesh.now_ms() % 1_000 == 0 {
            let snapshot = DiagnosticSnapshot::from_nodes(mesh.now_ms(), mesh.nodes());
            // Ignore a full channel; the next second brings a fresh snapshot.
            let _ = snapshot_tx.try_send(snapshot);
        }

        // Keep virtual time from running ahead of the wall clock.
        let target = Duration::from_millis(mesh.now_ms() / u64::from(speedup));
        let elapsed = wall_start.elapsed();
        if target > elapsed {
            thread::sleep(target - elapsed);
        } else if mesh.now_ms() % 1_000 == 0 && elapsed - target > Duration::from_secs(1) {
            warn!("[sim] Falling behind real time by {:?}.", elapsed - target);
        }
    }
}
