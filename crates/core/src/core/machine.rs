//! Per-thread/core/machine driver (spec §5/§6).
//!
//! Neither backend owns fetch, branch prediction, or SMC invalidation —
//! those are collaborators a driver wires together once per cycle. `Thread`
//! is that wiring for one hardware thread: a `Frontend` (decode + basic-block
//! cache), a `ThreadBackend` (Atom or out-of-order), a `BranchPredictor`, and
//! a `PendingBlock` buffer holding whatever's left of the block currently
//! being drained into the backend. `Core`/`Machine` just fan `Thread::tick`
//! out across the configured topology (spec §5 "Machine topology").

use crate::common::addr::PhysAddr;
use crate::common::error::Trap;
use crate::common::rip::{Mode, RipVirtPhys};
use crate::config::{Backend, Config, DecodeConfig};
use crate::core::atom::AtomThread;
use crate::core::branch_predictor::{BranchPredictor, StaticBranchPredictor};
use crate::core::context::Context;
use crate::core::memory_hierarchy::MemoryHierarchy;
use crate::core::ooo::annul::annul_after;
use crate::core::ooo::OooThread;
use crate::core::units::cache::CacheSim;
use crate::core::units::mmu::Mmu;
use crate::isa::basicblock::BasicBlock;
use crate::isa::bbcache::{BasicBlockCache, InvalidationReason};
use crate::isa::decode::decode_block;
use crate::isa::transop::TransOp;
use crate::stats::SimStats;

/// A block just fetched (cache hit or fresh decode), ready to drain into the backend.
pub struct FetchedBlock {
    pub identity: RipVirtPhys,
    pub uops: Vec<TransOp>,
    /// RIP immediately following this block, assuming no branch in it is taken.
    pub next_rip: u64,
}

/// Decode + basic-block cache, owned per thread (spec §4.1).
pub struct Frontend {
    cache: BasicBlockCache,
}

impl Default for Frontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: BasicBlockCache::new(),
        }
    }

    /// Looks up the block starting at `rip`, decoding and caching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns the translation fault if `rip` itself doesn't map to a
    /// physical page; a fault discovered mid-decode instead rides along as
    /// the block's own terminating `InvalidOpcodeFault`/`ExecFault` uop,
    /// which the backend handles the same way it handles any other trap.
    pub fn fetch<C: Context>(
        &mut self,
        ctx: &C,
        rip: u64,
        mode: Mode,
        decode_cfg: &DecodeConfig,
        cycle: u64,
        stats: &mut SimStats,
    ) -> Result<FetchedBlock, Trap> {
        use crate::common::addr::VirtAddr;

        let vaddr = VirtAddr(rip);
        let paddr = ctx.translate(vaddr, false, true)?;
        let lookup_identity = RipVirtPhys::new(vaddr, paddr, mode);

        if let Some(block) = self.cache.lookup(&lookup_identity) {
            stats.bb_cache_hits += 1;
            let identity = block.identity;
            let uops = block.uops.clone();
            let next_rip = rip + u64::from(block.byte_length);
            self.cache.touch(&identity, cycle);
            self.cache.add_ref(&identity);
            return Ok(FetchedBlock {
                identity,
                uops,
                next_rip,
            });
        }

        stats.bb_cache_misses += 1;
        let bytes = ctx.fetch_bytes(vaddr, decode_cfg.max_bb_bytes);
        let decoded = decode_block(&bytes, rip, decode_cfg);
        let next_rip = rip + decoded.byte_length as u64;

        // A block whose bytes cross a page boundary needs the second
        // frame's number to be indexed for SMC on that page too. The cache
        // key this produces (frame_hi: Some(..)) will never match a bare
        // lookup_identity built before decoding, so cross-page blocks are
        // always redecoded rather than cache-hit; see DESIGN.md.
        let identity = if vaddr.crosses_page(decoded.byte_length as u64) && decoded.byte_length > 0
        {
            let hi_vaddr = VirtAddr(rip + decoded.byte_length as u64 - 1).page();
            match ctx.translate(hi_vaddr, false, true) {
                Ok(hi_paddr) => lookup_identity.with_high_frame(hi_paddr.frame()),
                Err(_) => lookup_identity,
            }
        } else {
            lookup_identity
        };

        let mut block = BasicBlock::new(identity, decoded.uops.clone(), decoded.branch_type);
        block.lastused_cycle = cycle;
        block.add_ref();
        let uops = block.uops.clone();
        self.cache.insert(block);

        if self.cache.len() > decode_cfg.bb_cache_capacity {
            let evicted = self.cache.reclaim();
            tracing::trace!(evicted, reason = ?InvalidationReason::Reclaim, "basic block cache reclaim");
            stats.bb_cache_evictions += evicted as u64;
        }

        Ok(FetchedBlock {
            identity,
            uops,
            next_rip,
        })
    }

    /// A store committed at `paddr`: invalidate every cached block covering
    /// its frame (spec §4.1 SMC).
    pub fn invalidate_store(&mut self, paddr: u64, stats: &mut SimStats) {
        let frame = PhysAddr(paddr).frame();
        let reason = self.cache.classify_invalidation(frame);
        let freed = self.cache.invalidate_page(frame) + self.cache.retry_pending_frees();
        tracing::trace!(frame, freed, ?reason, "basic block cache invalidation");
        stats.bb_cache_smc_invalidations += freed as u64;
    }

    pub fn drop_ref(&mut self, identity: &RipVirtPhys) {
        self.cache.drop_ref(identity);
    }
}

/// Whatever of a fetched block hasn't been drained into the backend yet.
struct PendingBlock {
    identity: RipVirtPhys,
    uops: Vec<TransOp>,
    next: usize,
    next_rip: u64,
}

/// Which pipeline engine a thread runs (spec §4.9 vs §4.2-§4.8).
enum ThreadBackend {
    Atom(AtomThread),
    Ooo(OooThread),
}

/// One hardware thread: frontend, backend, predictor, and the speculative
/// fetch cursor (`rip`/`pending`) the driver itself owns.
pub struct Thread {
    backend: ThreadBackend,
    frontend: Frontend,
    predictor: Box<dyn BranchPredictor>,
    rip: u64,
    mode: Mode,
    cycle: u64,
    pending: Option<PendingBlock>,
    decode_cfg: DecodeConfig,
    fetch_width: usize,
    issue_width: usize,
    commit_width: usize,
}

impl Thread {
    #[must_use]
    pub fn new(cfg: &Config, core_id: u8, _thread_id: u8) -> Self {
        let dcache = CacheSim::new(&cfg.cache.l1_d);
        let backend = match cfg.machine.backend {
            Backend::Atom => {
                let capacity = cfg.atom.max_fetch_width * (cfg.atom.min_pipeline_cycles as usize + 1);
                ThreadBackend::Atom(AtomThread::new(&cfg.atom, capacity.max(1), dcache))
            }
            Backend::OutOfOrder => {
                let mmu = Mmu::new(&cfg.mmu);
                ThreadBackend::Ooo(OooThread::new(&cfg.queues, mmu, dcache, core_id))
            }
        };
        let fetch_width = match cfg.machine.backend {
            Backend::Atom => cfg.atom.max_fetch_width,
            Backend::OutOfOrder => cfg.queues.max_issue_width,
        };
        Self {
            backend,
            frontend: Frontend::new(),
            predictor: Box::new(StaticBranchPredictor),
            rip: cfg.run.start_rip,
            mode: Mode::default(),
            cycle: 0,
            pending: None,
            decode_cfg: cfg.decode.clone(),
            fetch_width,
            issue_width: cfg.queues.max_issue_width,
            commit_width: cfg.queues.commit_width,
        }
    }

    #[must_use]
    pub fn rip(&self) -> u64 {
        self.rip
    }

    /// Whether this thread is stalled on a cache miss (spec §4.9 SMT
    /// switch signal). Out-of-order threads never report stalled here:
    /// their ROB absorbs a miss without blocking fetch of other uops.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        match &self.backend {
            ThreadBackend::Atom(atom) => atom.is_stalled(),
            ThreadBackend::Ooo(_) => false,
        }
    }

    /// Runs one simulated cycle: commit, advance in-flight countdowns,
    /// issue/execute, then fetch+dispatch (spec §5 "tick order").
    pub fn tick<C: Context>(
        &mut self,
        ctx: &mut C,
        mem: &mut dyn MemoryHierarchy,
        stats: &mut SimStats,
    ) {
        self.cycle += 1;
        stats.cycles += 1;
        self.commit(ctx, mem, stats);
        self.advance();
        self.issue(ctx, stats);
        self.dispatch(ctx, stats);
    }

    fn commit<C: Context>(&mut self, ctx: &mut C, mem: &mut dyn MemoryHierarchy, stats: &mut SimStats) {
        let mut trapped = false;
        match &mut self.backend {
            ThreadBackend::Atom(atom) => {
                if let Some(retired) = atom.commit(ctx) {
                    stats.uops_committed += 1;
                    if retired.uop.eom {
                        stats.macro_ops_committed += 1;
                    }
                    trapped = retired.trap.is_some();
                    if let Some(paddr) = retired.store_paddr {
                        self.frontend.invalidate_store(paddr, stats);
                    }
                }
            }
            ThreadBackend::Ooo(ooo) => {
                for retired in ooo.commit(self.commit_width, ctx, mem) {
                    stats.uops_committed += 1;
                    if retired.uop.eom {
                        stats.macro_ops_committed += 1;
                    }
                    trapped = trapped || retired.trap.is_some();
                    if let Some(paddr) = retired.store_paddr {
                        self.frontend.invalidate_store(paddr, stats);
                    }
                }
            }
        }
        if trapped {
            self.recover_from_trap(ctx);
        }
    }

    /// A committed trap squashes everything in flight and resumes fetch
    /// from wherever the host's trap delivery left RIP (a handler entry, or
    /// unchanged if the host has none).
    fn recover_from_trap<C: Context>(&mut self, ctx: &mut C) {
        match &mut self.backend {
            ThreadBackend::Atom(atom) => atom.flush_all(),
            ThreadBackend::Ooo(ooo) => ooo.flush_all(),
        }
        if let Some(pending) = self.pending.take() {
            self.frontend.drop_ref(&pending.identity);
        }
        self.rip = ctx.registers().rip();
    }

    fn advance(&mut self) {
        match &mut self.backend {
            ThreadBackend::Atom(atom) => atom.tick(),
            ThreadBackend::Ooo(ooo) => ooo.tick(),
        }
    }

    fn issue<C: Context>(&mut self, ctx: &mut C, stats: &mut SimStats) {
        match &mut self.backend {
            ThreadBackend::Atom(atom) => {
                if let Some(target) = atom.issue(ctx) {
                    self.maybe_redirect_atom(target, stats);
                }
            }
            ThreadBackend::Ooo(ooo) => {
                if let Some((tag, target)) = ooo.issue(self.issue_width, ctx, self.predictor.as_mut()) {
                    stats.branch_mispredicts += 1;
                    stats.annuls += 1;
                    annul_after(
                        &mut ooo.rob,
                        &mut ooo.lsq,
                        &mut ooo.issue_queue,
                        &mut ooo.phys_regs,
                        &mut ooo.spec_rrt,
                        &ooo.commit_rrt,
                        tag,
                    );
                    self.redirect(target);
                }
                if ooo.alias_recoveries > 0 {
                    stats.lsq_alias_recoveries += ooo.alias_recoveries;
                    stats.redispatches += ooo.alias_recoveries;
                    ooo.alias_recoveries = 0;
                }
            }
        }
    }

    /// The Atom backend has no ROB to selectively annul, so it can only
    /// compare the branch's resolved target against what the driver had
    /// already speculatively fetched past it: whatever `rip` a decoded
    /// block always terminates at a branch (spec §4.1), so the currently
    /// pending block's own starting RIP (or `self.rip` if nothing has been
    /// fetched yet) *is* the not-taken prediction the static predictor made.
    fn maybe_redirect_atom(&mut self, target: u64, stats: &mut SimStats) {
        let speculated = self
            .pending
            .as_ref()
            .map_or(self.rip, |p| p.identity.rip.val());
        if speculated != target {
            stats.branch_mispredicts += 1;
            if let ThreadBackend::Atom(atom) = &mut self.backend {
                atom.flush_all();
            }
            self.redirect(target);
        }
    }

    fn redirect(&mut self, target: u64) {
        if let Some(pending) = self.pending.take() {
            self.frontend.drop_ref(&pending.identity);
        }
        self.rip = target;
    }

    /// Fetches (on a cache miss, decodes) and dispatches up to `fetch_width`
    /// uops into the backend, draining `pending` across as many cycles as it
    /// takes and fetching the next block once it's exhausted.
    fn dispatch<C: Context>(&mut self, ctx: &mut C, stats: &mut SimStats) {
        for _ in 0..self.fetch_width {
            if self.pending.is_none() {
                match self
                    .frontend
                    .fetch(ctx, self.rip, self.mode, &self.decode_cfg, self.cycle, stats)
                {
                    Ok(fetched) => {
                        self.pending = Some(PendingBlock {
                            identity: fetched.identity,
                            uops: fetched.uops,
                            next: 0,
                            next_rip: fetched.next_rip,
                        });
                    }
                    Err(trap) => {
                        ctx.deliver_trap(trap);
                        return;
                    }
                }
            }

            let Some(pending) = self.pending.as_ref() else {
                return;
            };
            let uop = pending.uops[pending.next].clone();
            let accepted = match &mut self.backend {
                ThreadBackend::Atom(atom) => atom.fetch(uop),
                ThreadBackend::Ooo(ooo) => ooo.dispatch(uop).is_ok(),
            };
            if !accepted {
                return; // backend has no free slot; stall fetch this cycle.
            }

            let pending = self.pending.as_mut().expect("checked above");
            pending.next += 1;
            if pending.next >= pending.uops.len() {
                let done = self.pending.take().expect("just matched Some");
                self.frontend.drop_ref(&done.identity);
                self.rip = done.next_rip;
            }
        }
    }
}

/// One core's hardware threads (spec §5 "SMT topology").
pub struct Core {
    pub threads: Vec<Thread>,
}

impl Core {
    fn new(cfg: &Config, core_id: u8) -> Self {
        let threads = (0..cfg.machine.threads_per_core as u8)
            .map(|thread_id| Thread::new(cfg, core_id, thread_id))
            .collect();
        Self { threads }
    }

    fn tick<C: Context>(&mut self, ctx: &mut C, mem: &mut dyn MemoryHierarchy, stats: &mut SimStats) {
        for thread in &mut self.threads {
            thread.tick(ctx, mem, stats);
        }
    }
}

/// The whole simulated machine: every core, ticked once per simulated cycle.
///
/// SMT threads within a core are each given a full independent pipeline
/// rather than arbitrating over shared issue/execute resources; real SMT
/// contends for those, but modeling that contention is out of scope here
/// (see DESIGN.md) and this still exercises the per-thread `is_stalled`
/// signal spec §4.9 describes.
pub struct Machine {
    pub cores: Vec<Core>,
}

impl Machine {
    #[must_use]
    pub fn new(cfg: &Config) -> Self {
        let cores = (0..cfg.machine.num_cores as u8)
            .map(|id| Core::new(cfg, id))
            .collect();
        Self { cores }
    }

    pub fn tick<C: Context>(&mut self, ctx: &mut C, mem: &mut dyn MemoryHierarchy, stats: &mut SimStats) {
        for core in &mut self.cores {
            core.tick(ctx, mem, stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::context::TestContext;
    use crate::core::memory_hierarchy::SimpleMemoryHierarchy;
    use crate::isa::transop::{ArchReg, Opcode};

    fn encode_mov_imm32(reg: u8, imm: i32, rip: u64, ctx: &mut TestContext) -> u64 {
        // `0xB8 + reg`, then a little-endian 32-bit immediate: matches
        // `fast::decode`'s MOV-immediate shape used across the decoder tests.
        let mut bytes = vec![0xB8 + reg];
        bytes.extend_from_slice(&imm.to_le_bytes());
        ctx.load_bytes(rip, &bytes);
        bytes.len() as u64
    }

    #[test]
    fn atom_thread_fetches_decodes_and_commits_across_cycles() {
        let cfg = Config::default();
        let mut thread = Thread::new(&cfg, 0, 0);
        let mut ctx = TestContext::new();
        let mut mem = SimpleMemoryHierarchy::new(1);
        let mut stats = SimStats::default();

        encode_mov_imm32(1, 42, 0, &mut ctx);
        // A trailing NOP keeps the block from running off the end of mapped
        // memory into a synthetic exec-page-fault before the MOV commits.
        ctx.load_bytes(5, &[0x90]);

        for _ in 0..32 {
            thread.tick(&mut ctx, &mut mem, &mut stats);
        }

        assert_eq!(ctx.registers().read(1), 42);
        assert!(stats.uops_committed > 0);
    }

    #[test]
    fn ooo_thread_fetches_decodes_and_commits_across_cycles() {
        let mut cfg = Config::default();
        cfg.machine.backend = Backend::OutOfOrder;
        let mut thread = Thread::new(&cfg, 0, 0);
        let mut ctx = TestContext::new();
        let mut mem = SimpleMemoryHierarchy::new(1);
        let mut stats = SimStats::default();

        encode_mov_imm32(2, 7, 0, &mut ctx);
        ctx.load_bytes(5, &[0x90]);

        for _ in 0..32 {
            thread.tick(&mut ctx, &mut mem, &mut stats);
        }

        assert_eq!(ctx.registers().read(2), 7);
    }

    #[test]
    fn store_commit_invalidates_frontend_cache_entry() {
        let cfg = Config::default();
        let mut frontend = Frontend::new();
        let mut ctx = TestContext::new();
        let mut stats = SimStats::default();
        ctx.load_bytes(0x1000, &[0x90]); // NOP, decodes to a single uop block

        let fetched = frontend
            .fetch(&ctx, 0x1000, Mode::default(), &cfg.decode, 0, &mut stats)
            .unwrap();
        assert_eq!(stats.bb_cache_misses, 1);
        frontend.drop_ref(&fetched.identity);

        frontend.invalidate_store(0x1000, &mut stats);
        assert_eq!(stats.bb_cache_smc_invalidations, 1);

        let refetched = frontend
            .fetch(&ctx, 0x1000, Mode::default(), &cfg.decode, 1, &mut stats)
            .unwrap();
        assert_eq!(stats.bb_cache_misses, 2);
        frontend.drop_ref(&refetched.identity);
    }

    #[test]
    fn atom_flushes_wrong_path_on_taken_branch() {
        let cfg = Config::default();
        let mut thread = Thread::new(&cfg, 0, 0);
        let mut ctx = TestContext::new();
        let mut mem = SimpleMemoryHierarchy::new(1);
        let mut stats = SimStats::default();

        // An always-taken relative jump at rip 0 to rip 0x40, followed by a
        // MOV at the fallthrough (never reached) and another at the target.
        let jmp = TransOp {
            imm: 0x40,
            insn_bytes: 1,
            ..TransOp::new(Opcode::Branch(crate::isa::transop::ConditionCode::Always), 0)
        };
        // Hand-construct the blocks directly in the cache so this test
        // doesn't depend on the byte-level jump encoding.
        let identity_at_0 = {
            let paddr = ctx.translate(crate::common::addr::VirtAddr(0), false, true).unwrap();
            RipVirtPhys::new(crate::common::addr::VirtAddr(0), paddr, Mode::default())
        };
        let mut block0 = BasicBlock::new(identity_at_0, vec![jmp], crate::isa::basicblock::BranchType::Unconditional);
        block0.add_ref();
        thread.frontend.cache.insert(block0);

        let fallthrough_mov = TransOp {
            rd: Some(ArchReg::Gpr(3)),
            imm: 99,
            ..TransOp::new(Opcode::Mov, 1)
        };
        let identity_at_1 = {
            let paddr = ctx.translate(crate::common::addr::VirtAddr(1), false, true).unwrap();
            RipVirtPhys::new(crate::common::addr::VirtAddr(1), paddr, Mode::default())
        };
        let mut block1 = BasicBlock::new(identity_at_1, vec![fallthrough_mov], crate::isa::basicblock::BranchType::Unconditional);
        block1.add_ref();
        thread.frontend.cache.insert(block1);

        let target_mov = TransOp {
            rd: Some(ArchReg::Gpr(4)),
            imm: 55,
            ..TransOp::new(Opcode::Mov, 0x40)
        };
        let identity_at_target = {
            let paddr = ctx.translate(crate::common::addr::VirtAddr(0x40), false, true).unwrap();
            RipVirtPhys::new(crate::common::addr::VirtAddr(0x40), paddr, Mode::default())
        };
        let mut block_target = BasicBlock::new(identity_at_target, vec![target_mov], crate::isa::basicblock::BranchType::Unconditional);
        block_target.add_ref();
        thread.frontend.cache.insert(block_target);

        for _ in 0..64 {
            thread.tick(&mut ctx, &mut mem, &mut stats);
        }

        assert_eq!(ctx.registers().read(4), 55);
        assert_eq!(ctx.registers().read(3), 0);
        assert!(stats.branch_mispredicts > 0);
    }
}
