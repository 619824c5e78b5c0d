//! Machine/Core/Thread topology construction and independent per-thread
//! cycle accounting (spec §3 "Machine topology").
//!
//! `Context` exposes a single shared `RegisterFile` (spec §6), so this
//! deliberately does not assert independent architectural state across
//! threads — only that the topology is built to the configured shape and
//! that every thread ticks once per `Machine::tick`.

use x86sim_core::config::Config;
use x86sim_core::core::context::TestContext;
use x86sim_core::core::memory_hierarchy::SimpleMemoryHierarchy;
use x86sim_core::sim::simulator::Simulator;

#[test]
fn machine_builds_configured_cores_and_threads() {
    let mut config = Config::default();
    config.machine.num_cores = 2;
    config.machine.threads_per_core = 2;

    let ctx = TestContext::new();
    let mem = Box::new(SimpleMemoryHierarchy::new(2));
    let mut sim = Simulator::new(&config, ctx, mem);

    assert_eq!(sim.machine.cores.len(), 2);
    for core in &sim.machine.cores {
        assert_eq!(core.threads.len(), 2);
    }

    let total_threads: usize = sim.machine.cores.iter().map(|c| c.threads.len()).sum();
    for _ in 0..5 {
        sim.tick();
    }
    assert_eq!(sim.stats.cycles, 5 * total_threads as u64);
}
