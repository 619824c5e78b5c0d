//! Configuration surface for the simulator.
//!
//! Mirrors the distilled-JSON configuration pattern of the examples this
//! crate is grounded on: a `mod defaults` of named baseline constants, and
//! a hierarchical `serde::Deserialize` tree of structs with per-field
//! `#[serde(default = ...)]` fallbacks so a caller only needs to specify
//! what they want to override.

use serde::Deserialize;

/// Baseline hardware constants, used when a config field is not overridden.
mod defaults {
    /// Cores per machine.
    pub const NUM_CORES: usize = 1;
    /// Hardware threads (SMT contexts) per core.
    pub const THREADS_PER_CORE: usize = 1;

    /// Reorder-buffer entries per thread.
    pub const ROB_SIZE: usize = 128;
    /// Load-store-queue entries per thread.
    pub const LSQ_SIZE: usize = 48;
    /// Issue-queue slots per cluster.
    pub const ISSUE_QUEUE_SIZE: usize = 32;
    /// Physical registers per register file (integer or flags).
    pub const PHYS_REGS: usize = 256;
    /// Max uops dispatched per cycle.
    pub const MAX_ISSUE_WIDTH: usize = 4;
    /// Max uops committed per cycle.
    pub const COMMIT_WIDTH: usize = 4;

    /// Max TransOps a single basic block may hold.
    pub const MAX_BB_UOPS: usize = 64;
    /// Max x86 instruction bytes consumed before forcing a BB boundary.
    pub const MAX_BB_BYTES: usize = 15 * 64;
    /// Basic-block cache size above which the reclaim pass runs (spec §4.1
    /// "Reclaim": "when memory is tight").
    pub const BB_CACHE_CAPACITY: usize = 4096;

    /// Page-table walk depth (x86-64 4-level paging).
    pub const WALK_LEVELS: u8 = 4;
    /// Data TLB entry count.
    pub const DTLB_SIZE: usize = 64;
    /// Instruction TLB entry count.
    pub const ITLB_SIZE: usize = 64;

    /// Default cache size in bytes (32 KiB).
    pub const CACHE_SIZE: usize = 32 * 1024;
    /// Default cache line size in bytes.
    pub const CACHE_LINE: usize = 64;
    /// Default cache associativity.
    pub const CACHE_WAYS: usize = 4;
    /// Default cache access latency in cycles.
    pub const CACHE_LATENCY: u64 = 1;

    /// Atom pipeline: max atom-ops fetched per cycle.
    pub const MAX_FETCH_WIDTH: usize = 4;
    /// Atom pipeline: max atom-ops issued per cycle.
    pub const MAX_ISSUE_PER_CYCLE: usize = 4;
    /// Atom pipeline: frontend stage depth.
    pub const NUM_FRONTEND_STAGES: usize = 2;
    /// Atom pipeline: minimum uniform pipeline depth before writeback.
    pub const MIN_PIPELINE_CYCLES: u64 = 5;
    /// Max uops per atom-op bundle.
    pub const MAX_UOPS_PER_ATOMOP: usize = 4;

    /// Max in-flight branches before fetch stalls (OoO).
    pub const MAX_BRANCH_IN_FLIGHT: usize = 24;
    /// Load-store-alias predictor (LSAP) table entries.
    pub const LSAP_ENTRIES: usize = 256;

    /// Default iteration cap; 0 means unbounded.
    pub const STOP_AFTER_ITERATIONS: u64 = 0;
}

/// Which pipeline engine a core runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Backend {
    /// In-order "Atom" pipeline.
    #[default]
    Atom,
    /// Out-of-order pipeline with ROB/rename/LSQ.
    OutOfOrder,
}

/// Cache replacement policy, reused from the cache-unit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Plru,
    Fifo,
    Random,
    Mru,
}

/// Root configuration tree.
///
/// # Examples
///
/// ```
/// use x86sim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.queues.rob_size, 128);
/// assert_eq!(config.cache.l1_d.size_bytes, 32 * 1024);
/// ```
///
/// ```
/// use x86sim_core::config::{Backend, Config};
///
/// let json = r#"{
///     "machine": { "num_cores": 2, "threads_per_core": 2, "backend": "OutOfOrder" },
///     "queues": { "rob_size": 192, "lsq_size": 64, "issue_queue_size": 48 },
///     "decode": {},
///     "mmu": {},
///     "cache": {
///         "l1_i": {}, "l1_d": {}, "l2": {}, "l3": { "enabled": false }
///     },
///     "atom": {},
///     "run": { "stop_after_iterations": 1000000 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.machine.num_cores, 2);
/// assert_eq!(config.machine.backend, Backend::OutOfOrder);
/// assert_eq!(config.queues.rob_size, 192);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub mmu: MmuConfig,
    #[serde(default)]
    pub cache: CacheHierarchyConfig,
    #[serde(default)]
    pub atom: AtomConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Machine topology: cores, SMT threads, and which engine each core runs.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    #[serde(default = "MachineConfig::default_cores")]
    pub num_cores: usize,
    #[serde(default = "MachineConfig::default_threads")]
    pub threads_per_core: usize,
    #[serde(default)]
    pub backend: Backend,
}

impl MachineConfig {
    fn default_cores() -> usize {
        defaults::NUM_CORES
    }
    fn default_threads() -> usize {
        defaults::THREADS_PER_CORE
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            num_cores: defaults::NUM_CORES,
            threads_per_core: defaults::THREADS_PER_CORE,
            backend: Backend::default(),
        }
    }
}

/// Out-of-order structural sizes: ROB, LSQ, issue queue, physical registers.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "QueueConfig::default_rob")]
    pub rob_size: usize,
    #[serde(default = "QueueConfig::default_lsq")]
    pub lsq_size: usize,
    #[serde(default = "QueueConfig::default_iq")]
    pub issue_queue_size: usize,
    #[serde(default = "QueueConfig::default_physregs")]
    pub phys_regs: usize,
    #[serde(default = "QueueConfig::default_issue_width")]
    pub max_issue_width: usize,
    #[serde(default = "QueueConfig::default_commit_width")]
    pub commit_width: usize,
    #[serde(default = "QueueConfig::default_branch_in_flight")]
    pub max_branch_in_flight: usize,
    #[serde(default = "QueueConfig::default_lsap_entries")]
    pub lsap_entries: usize,
}

impl QueueConfig {
    fn default_rob() -> usize {
        defaults::ROB_SIZE
    }
    fn default_lsq() -> usize {
        defaults::LSQ_SIZE
    }
    fn default_iq() -> usize {
        defaults::ISSUE_QUEUE_SIZE
    }
    fn default_physregs() -> usize {
        defaults::PHYS_REGS
    }
    fn default_issue_width() -> usize {
        defaults::MAX_ISSUE_WIDTH
    }
    fn default_commit_width() -> usize {
        defaults::COMMIT_WIDTH
    }
    fn default_branch_in_flight() -> usize {
        defaults::MAX_BRANCH_IN_FLIGHT
    }
    fn default_lsap_entries() -> usize {
        defaults::LSAP_ENTRIES
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rob_size: defaults::ROB_SIZE,
            lsq_size: defaults::LSQ_SIZE,
            issue_queue_size: defaults::ISSUE_QUEUE_SIZE,
            phys_regs: defaults::PHYS_REGS,
            max_issue_width: defaults::MAX_ISSUE_WIDTH,
            commit_width: defaults::COMMIT_WIDTH,
            max_branch_in_flight: defaults::MAX_BRANCH_IN_FLIGHT,
            lsap_entries: defaults::LSAP_ENTRIES,
        }
    }
}

/// Decoder / basic-block-cache limits.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodeConfig {
    #[serde(default = "DecodeConfig::default_max_uops")]
    pub max_bb_uops: usize,
    #[serde(default = "DecodeConfig::default_max_bytes")]
    pub max_bb_bytes: usize,
    #[serde(default = "DecodeConfig::default_bb_cache_capacity")]
    pub bb_cache_capacity: usize,
}

impl DecodeConfig {
    fn default_max_uops() -> usize {
        defaults::MAX_BB_UOPS
    }
    fn default_max_bytes() -> usize {
        defaults::MAX_BB_BYTES
    }
    fn default_bb_cache_capacity() -> usize {
        defaults::BB_CACHE_CAPACITY
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_bb_uops: defaults::MAX_BB_UOPS,
            max_bb_bytes: defaults::MAX_BB_BYTES,
            bb_cache_capacity: defaults::BB_CACHE_CAPACITY,
        }
    }
}

/// TLB sizes and page-walk depth.
#[derive(Debug, Clone, Deserialize)]
pub struct MmuConfig {
    #[serde(default = "MmuConfig::default_walk_levels")]
    pub walk_levels: u8,
    #[serde(default = "MmuConfig::default_dtlb")]
    pub dtlb_size: usize,
    #[serde(default = "MmuConfig::default_itlb")]
    pub itlb_size: usize,
}

impl MmuConfig {
    fn default_walk_levels() -> u8 {
        defaults::WALK_LEVELS
    }
    fn default_dtlb() -> usize {
        defaults::DTLB_SIZE
    }
    fn default_itlb() -> usize {
        defaults::ITLB_SIZE
    }
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self {
            walk_levels: defaults::WALK_LEVELS,
            dtlb_size: defaults::DTLB_SIZE,
            itlb_size: defaults::ITLB_SIZE,
        }
    }
}

/// Cache hierarchy: one `CacheConfig` per level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheHierarchyConfig {
    #[serde(default = "CacheHierarchyConfig::default_l1i")]
    pub l1_i: CacheConfig,
    #[serde(default = "CacheHierarchyConfig::default_l1d")]
    pub l1_d: CacheConfig,
    #[serde(default)]
    pub l2: CacheConfig,
    #[serde(default)]
    pub l3: CacheConfig,
}

impl CacheHierarchyConfig {
    fn default_l1i() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        }
    }
    fn default_l1d() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        }
    }
}

/// A single cache level's geometry, timing, and policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "CacheConfig::default_size")]
    pub size_bytes: usize,
    #[serde(default = "CacheConfig::default_line")]
    pub line_bytes: usize,
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: usize,
    #[serde(default)]
    pub policy: ReplacementPolicy,
    #[serde(default = "CacheConfig::default_latency")]
    pub latency: u64,
}

impl CacheConfig {
    fn default_size() -> usize {
        defaults::CACHE_SIZE
    }
    fn default_line() -> usize {
        defaults::CACHE_LINE
    }
    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }
    fn default_latency() -> u64 {
        defaults::CACHE_LATENCY
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_bytes: defaults::CACHE_SIZE,
            line_bytes: defaults::CACHE_LINE,
            ways: defaults::CACHE_WAYS,
            policy: ReplacementPolicy::default(),
            latency: defaults::CACHE_LATENCY,
        }
    }
}

/// In-order atom-pipeline widths and depths.
#[derive(Debug, Clone, Deserialize)]
pub struct AtomConfig {
    #[serde(default = "AtomConfig::default_fetch_width")]
    pub max_fetch_width: usize,
    #[serde(default = "AtomConfig::default_issue_per_cycle")]
    pub max_issue_per_cycle: usize,
    #[serde(default = "AtomConfig::default_frontend_stages")]
    pub num_frontend_stages: usize,
    #[serde(default = "AtomConfig::default_min_pipeline_cycles")]
    pub min_pipeline_cycles: u64,
    #[serde(default = "AtomConfig::default_max_uops_per_atomop")]
    pub max_uops_per_atomop: usize,
}

impl AtomConfig {
    fn default_fetch_width() -> usize {
        defaults::MAX_FETCH_WIDTH
    }
    fn default_issue_per_cycle() -> usize {
        defaults::MAX_ISSUE_PER_CYCLE
    }
    fn default_frontend_stages() -> usize {
        defaults::NUM_FRONTEND_STAGES
    }
    fn default_min_pipeline_cycles() -> u64 {
        defaults::MIN_PIPELINE_CYCLES
    }
    fn default_max_uops_per_atomop() -> usize {
        defaults::MAX_UOPS_PER_ATOMOP
    }
}

impl Default for AtomConfig {
    fn default() -> Self {
        Self {
            max_fetch_width: defaults::MAX_FETCH_WIDTH,
            max_issue_per_cycle: defaults::MAX_ISSUE_PER_CYCLE,
            num_frontend_stages: defaults::NUM_FRONTEND_STAGES,
            min_pipeline_cycles: defaults::MIN_PIPELINE_CYCLES,
            max_uops_per_atomop: defaults::MAX_UOPS_PER_ATOMOP,
        }
    }
}

/// Run-control: start/stop RIPs, iteration bounds, and the checker flag.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub start_rip: u64,
    #[serde(default)]
    pub stop_rip: Option<u64>,
    #[serde(default = "RunConfig::default_stop_iterations")]
    pub stop_after_iterations: u64,
    /// Re-check each committed uop against an architectural reference model.
    #[serde(default)]
    pub checker_enabled: bool,
}

impl RunConfig {
    fn default_stop_iterations() -> u64 {
        defaults::STOP_AFTER_ITERATIONS
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_rip: 0,
            stop_rip: None,
            stop_after_iterations: defaults::STOP_AFTER_ITERATIONS,
            checker_enabled: false,
        }
    }
}
