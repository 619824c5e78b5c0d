//! `Simulator` construction helpers shared across the integration suite.

use x86sim_core::config::{Backend, Config};
use x86sim_core::core::context::TestContext;
use x86sim_core::core::memory_hierarchy::SimpleMemoryHierarchy;
use x86sim_core::sim::simulator::Simulator;

/// Builds a single-core, single-thread `Simulator` running `program` from
/// RIP 0, with the given backend and a fixed-latency memory stand-in.
#[must_use]
pub fn simulator_for(backend: Backend, program: &[u8]) -> Simulator<TestContext> {
    let mut config = Config::default();
    config.machine.backend = backend;

    let mut ctx = TestContext::new();
    ctx.load_bytes(0, program);

    let mem = Box::new(SimpleMemoryHierarchy::new(2));
    Simulator::new(&config, ctx, mem)
}

/// Runs `sim` for up to `max_cycles`, stopping early once every thread's
/// RIP reaches `stop_rip`.
pub fn run_until(sim: &mut Simulator<TestContext>, stop_rip: u64, max_cycles: u64) {
    for _ in 0..max_cycles {
        if sim
            .machine
            .cores
            .iter()
            .all(|core| core.threads.iter().all(|t| t.rip() == stop_rip))
        {
            return;
        }
        sim.tick();
    }
}
