//! Simulation statistics.
//!
//! Tracked per-[`Machine`](crate::core::machine::Machine) and dumped as YAML
//! at the CLI boundary, the way the examples this crate is grounded on dump
//! an optional machine-config/stats YAML at the end of a run.

use std::time::Instant;

use serde::Serialize;

/// Aggregate counters for one simulation run.
#[derive(Clone, Debug, Serialize)]
pub struct SimStats {
    #[serde(skip)]
    start_time: Instant,

    /// Total simulated cycles elapsed.
    pub cycles: u64,
    /// x86 macro-instructions committed.
    pub macro_ops_committed: u64,
    /// Micro-ops (`TransOp`s) committed.
    pub uops_committed: u64,

    /// Branch mispredictions recovered via annul+redispatch.
    pub branch_mispredicts: u64,
    /// Value mispredictions (load-store alias, mis-speculated producer).
    pub value_mispredicts: u64,
    /// Non-fatal issue-queue replays.
    pub replays: u64,
    /// ROBs annulled (mispredict or exception recovery).
    pub annuls: u64,
    /// ROBs redispatched due to a tainted producer.
    pub redispatches: u64,
    /// Load-store aliasing recoveries detected at store address generation.
    pub lsq_alias_recoveries: u64,

    /// TLB walks initiated (data + instruction).
    pub tlb_walks: u64,
    /// Page faults surfaced to the host context.
    pub page_faults: u64,

    /// Basic-block cache lookups that hit an existing block.
    pub bb_cache_hits: u64,
    /// Basic-block cache lookups that required a fresh decode.
    pub bb_cache_misses: u64,
    /// Basic blocks evicted by the reclaim pass.
    pub bb_cache_evictions: u64,
    /// Basic blocks invalidated by a self-modifying-code write.
    pub bb_cache_smc_invalidations: u64,

    /// L1 instruction cache hits/misses.
    pub icache_hits: u64,
    pub icache_misses: u64,
    /// L1 data cache hits/misses.
    pub dcache_hits: u64,
    pub dcache_misses: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            macro_ops_committed: 0,
            uops_committed: 0,
            branch_mispredicts: 0,
            value_mispredicts: 0,
            replays: 0,
            annuls: 0,
            redispatches: 0,
            lsq_alias_recoveries: 0,
            tlb_walks: 0,
            page_faults: 0,
            bb_cache_hits: 0,
            bb_cache_misses: 0,
            bb_cache_evictions: 0,
            bb_cache_smc_invalidations: 0,
            icache_hits: 0,
            icache_misses: 0,
            dcache_hits: 0,
            dcache_misses: 0,
        }
    }
}

impl SimStats {
    /// Instructions-per-cycle, with cycles floored at 1 to avoid division by zero.
    #[must_use]
    pub fn ipc(&self) -> f64 {
        let cyc = self.cycles.max(1);
        self.macro_ops_committed as f64 / cyc as f64
    }

    /// Serializes the stats as YAML, for the optional end-of-run dump.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen for this type).
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Prints a human-readable summary to stdout.
    pub fn print(&self) {
        let seconds = self.start_time.elapsed().as_secs_f64();
        println!("==========================================================");
        println!("X86SIM STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {seconds:.4} s");
        println!("sim_cycles               {}", self.cycles);
        println!("sim_macro_ops            {}", self.macro_ops_committed);
        println!("sim_uops                 {}", self.uops_committed);
        println!("sim_ipc                  {:.4}", self.ipc());
        println!("----------------------------------------------------------");
        println!(
            "branch_mispredicts       {}  value_mispredicts  {}",
            self.branch_mispredicts, self.value_mispredicts
        );
        println!(
            "replays                  {}  annuls             {}  redispatches  {}",
            self.replays, self.annuls, self.redispatches
        );
        println!("lsq_alias_recoveries     {}", self.lsq_alias_recoveries);
        println!(
            "tlb_walks                {}  page_faults        {}",
            self.tlb_walks, self.page_faults
        );
        println!(
            "bb_cache hits/misses     {}/{}  evictions/smc  {}/{}",
            self.bb_cache_hits,
            self.bb_cache_misses,
            self.bb_cache_evictions,
            self.bb_cache_smc_invalidations
        );
        println!(
            "icache hits/misses       {}/{}  dcache hits/misses  {}/{}",
            self.icache_hits, self.icache_misses, self.dcache_hits, self.dcache_misses
        );
        println!("==========================================================");
    }
}
