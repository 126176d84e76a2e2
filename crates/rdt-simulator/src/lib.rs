//! Deterministic, socket-free runs of the RDT engines.
//!
//! Tests and `rdt-sim` drive a sender and a receiver over a
//! [`MemoryNetwork`]; with tokio's paused clock every timeout is simulated.

use std::future::Future;

pub mod network;
pub mod scenario_runner;
pub mod trace;

pub use network::{LinkEvent, MemoryNetwork, MemorySocket};
pub use scenario_runner::{check_assertions, load_scenario, run_scenario, run_scenario_file};
pub use trace::SimulationReport;

/// Drive `future` to completion on a fresh runtime whose clock is paused, so
/// retransmission timers fire as soon as every task is idle.
pub fn block_on_simulated<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()?;
    Ok(runtime.block_on(future))
}
