//! `Simulator`: owns a `Machine` alongside the external `Context`/
//! `MemoryHierarchy` it runs against, and the stop-condition loop the CLI
//! drives (spec §6 "Configuration surface": start/stop RIPs, iteration cap).

use crate::config::Config;
use crate::core::context::Context;
use crate::core::machine::Machine;
use crate::core::memory_hierarchy::MemoryHierarchy;
use crate::stats::SimStats;

/// Top-level simulator: a `Machine` plus the collaborators it ticks against.
pub struct Simulator<C: Context> {
    pub machine: Machine,
    pub ctx: C,
    pub mem: Box<dyn MemoryHierarchy>,
    pub stats: SimStats,
    stop_rip: Option<u64>,
    stop_after_iterations: u64,
}

impl<C: Context> Simulator<C> {
    #[must_use]
    pub fn new(config: &Config, ctx: C, mem: Box<dyn MemoryHierarchy>) -> Self {
        Self {
            machine: Machine::new(config),
            ctx,
            mem,
            stats: SimStats::default(),
            stop_rip: config.run.stop_rip,
            stop_after_iterations: config.run.stop_after_iterations,
        }
    }

    /// Advances the simulator by one clock cycle.
    pub fn tick(&mut self) {
        self.machine.tick(&mut self.ctx, self.mem.as_mut(), &mut self.stats);
    }

    /// Runs until every thread's RIP matches `stop_rip` (if configured) or
    /// the iteration cap is hit (0 means unbounded), whichever comes first.
    /// Returns the number of cycles actually run.
    pub fn run(&mut self) -> u64 {
        let mut iterations = 0u64;
        loop {
            if self.stop_after_iterations != 0 && iterations >= self.stop_after_iterations {
                break;
            }
            if self.at_stop_rip() {
                break;
            }
            self.tick();
            iterations += 1;
        }
        iterations
    }

    fn at_stop_rip(&self) -> bool {
        let Some(stop) = self.stop_rip else {
            return false;
        };
        self.machine
            .cores
            .iter()
            .all(|core| core.threads.iter().all(|t| t.rip() == stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::TestContext;
    use crate::core::memory_hierarchy::SimpleMemoryHierarchy;

    #[test]
    fn run_stops_at_configured_iteration_cap() {
        let mut config = Config::default();
        config.run.stop_after_iterations = 10;
        let mut ctx = TestContext::new();
        ctx.load_bytes(0, &[0x90]); // NOP, so the thread never traps
        let mem = Box::new(SimpleMemoryHierarchy::new(1));
        let mut sim = Simulator::new(&config, ctx, mem);

        let ran = sim.run();

        assert_eq!(ran, 10);
        assert_eq!(sim.stats.cycles, 10);
    }

    #[test]
    fn run_stops_when_every_thread_reaches_stop_rip() {
        let mut config = Config::default();
        config.run.stop_rip = Some(0);
        config.run.stop_after_iterations = 0;
        let ctx = TestContext::new();
        let mem = Box::new(SimpleMemoryHierarchy::new(1));
        let mut sim = Simulator::new(&config, ctx, mem);

        // start_rip defaults to 0, so the loop should never tick at all.
        let ran = sim.run();

        assert_eq!(ran, 0);
    }
}
