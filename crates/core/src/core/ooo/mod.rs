//! Out-of-order pipeline backend: rename/dispatch, tag-broadcast issue,
//! execute, writeback, and in-order commit, built on the ROB, LSQ, issue
//! queue, and physical-register file (spec §4.2-§4.8).
//!
//! `OooThread` owns exactly the per-thread structures the spec lists as
//! private to a thread (store buffer/LSQ, dispatch structures, rename
//! tables) plus the MMU and data cache it needs to time loads and stores;
//! the host `Context` and `MemoryHierarchy`/`BranchPredictor` collaborators
//! are passed in per call rather than owned, matching the external-
//! collaborator boundary spec §6 draws.

pub mod annul;

use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::error::{ReplayReason, Trap};
use crate::config::QueueConfig;
use crate::core::branch_predictor::BranchPredictor;
use crate::core::context::Context;
use crate::core::issuequeue::IssueQueue;
use crate::core::memory_hierarchy::MemoryHierarchy;
use crate::core::ooo::annul::redispatch;
use crate::core::physreg::{CommitRrt, PhysRegFile, PhysRegId, SpecRrt};
use crate::core::pipeline::lsq::{ForwardResult, Lsap, Lsq, LsqKind};
use crate::core::pipeline::rob::{Rob, RobState, RobTag};
use crate::core::units::cache::CacheSim;
use crate::core::units::mmu::{Mmu, WalkOutcome};
use crate::isa::transop::{ConditionCode, Opcode, TransOp};

/// Fixed next-level latency charged on a data-cache miss.
const MEMORY_LATENCY_CYCLES: u64 = 40;

/// Why dispatch of a single uop could not proceed this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStall {
    RobFull,
    IssueQueueFull,
    LsqFull,
    PhysRegFull,
}

/// One committed uop's effect, reported back to the driver so it can update
/// RIP/branch-predictor/stats bookkeeping it owns.
#[derive(Clone, Debug, PartialEq)]
pub struct Retired {
    pub tag: RobTag,
    pub uop: TransOp,
    pub trap: Option<Trap>,
    /// Physical address a committing store just wrote, if any — lets the
    /// driver invalidate any cached basic block covering that frame (spec
    /// §4.1 SMC) without re-translating after the fact.
    pub store_paddr: Option<u64>,
}

/// Per-thread out-of-order execution state.
pub struct OooThread {
    pub rob: Rob,
    pub lsq: Lsq,
    pub issue_queue: IssueQueue,
    pub phys_regs: PhysRegFile,
    pub spec_rrt: SpecRrt,
    pub commit_rrt: CommitRrt,
    pub mmu: Mmu,
    pub dcache: CacheSim,
    /// Load-store-alias predictor, consulted by load issue and updated by
    /// store-address resolution (spec §4.5).
    pub lsap: Lsap,
    /// Speculative RFLAGS-equivalent value as of the most recently issued
    /// flag-writing uop. A full per-uop flags rename would need a second
    /// destination slot on every `RobEntry`; this single scalar is a
    /// documented simplification (see DESIGN.md) since ALU semantic
    /// fidelity is not one of the tested invariants (spec §8).
    pub spec_flags: u64,
    /// Load-store aliasing recoveries detected at store-address generation
    /// since the driver last drained this counter into `SimStats`.
    pub alias_recoveries: u64,
    core_id: u8,
}

impl OooThread {
    #[must_use]
    pub fn new(cfg: &QueueConfig, mmu: Mmu, dcache: CacheSim, core_id: u8) -> Self {
        let phys_regs = PhysRegFile::new(cfg.phys_regs);
        let zero = phys_regs.zero();
        Self {
            rob: Rob::new(cfg.rob_size),
            lsq: Lsq::new(cfg.lsq_size),
            issue_queue: IssueQueue::new(cfg.issue_queue_size),
            phys_regs,
            spec_rrt: SpecRrt::new(zero),
            commit_rrt: CommitRrt::new(zero),
            mmu,
            dcache,
            lsap: Lsap::new(cfg.lsap_entries),
            spec_flags: 0,
            alias_recoveries: 0,
            core_id,
        }
    }

    /// Renames operands, allocates a destination physreg, and dispatches a
    /// decoded uop into the ROB and issue queue (spec §4.2 "renaming at
    /// dispatch").
    pub fn dispatch(&mut self, uop: TransOp) -> Result<RobTag, DispatchStall> {
        if self.rob.is_full() {
            return Err(DispatchStall::RobFull);
        }
        if !self.issue_queue.has_free_slot() {
            return Err(DispatchStall::IssueQueueFull);
        }
        let is_mem = uop.is_load() || uop.is_store();
        if is_mem && self.lsq.is_full() {
            return Err(DispatchStall::LsqFull);
        }
        if uop.rd.is_some() && self.phys_regs.free_count() == 0 {
            return Err(DispatchStall::PhysRegFull);
        }

        let mut src_physregs = [None; 3];
        let mut sources = [None; 3];
        for (i, arch) in [uop.ra, uop.rb, uop.rc].into_iter().enumerate() {
            if let Some(arch) = arch {
                let id = self.spec_rrt.lookup(arch);
                self.phys_regs.add_ref(id);
                src_physregs[i] = Some(id);
                sources[i] = Some((id, self.phys_regs.is_ready(id)));
            }
        }

        let dest_physreg = if let Some(arch) = uop.rd {
            let id = self
                .phys_regs
                .allocate(arch)
                .expect("free_count checked above");
            self.phys_regs.add_ref(id);
            self.spec_rrt.rename(arch, id);
            Some(id)
        } else {
            None
        };

        let tag = self
            .rob
            .allocate(uop.clone(), src_physregs, dest_physreg)
            .ok_or(DispatchStall::RobFull)?;

        self.issue_queue
            .dispatch(tag, sources)
            .expect("issue-queue slot checked free above");

        if is_mem {
            let kind = if uop.is_load() {
                LsqKind::Load
            } else {
                LsqKind::Store
            };
            self.lsq.allocate(tag, kind, uop.size);
        }

        tracing::trace!(tag = tag.0, opcode = ?uop.opcode, "ooo dispatch");
        Ok(tag)
    }

    /// Selects up to `width` ready uops and executes them (spec §4.4). Loads
    /// and stores drive the LSQ/MMU/cache; a mispredicted branch returns its
    /// ROB tag and the corrected RIP so the caller can annul everything
    /// younger than the branch and redirect fetch.
    pub fn issue<C: Context>(
        &mut self,
        width: usize,
        ctx: &mut C,
        predictor: &mut dyn BranchPredictor,
    ) -> Option<(RobTag, u64)> {
        let mut mispredict = None;
        for tag in self.issue_queue.select(width) {
            let Some(entry) = self.rob.find_entry(tag).cloned() else {
                continue;
            };
            let uop = entry.uop.clone();
            let a = entry.src_physregs[0].map_or(0, |id| self.phys_regs.get(id).value);
            let b = entry.src_physregs[1].map_or(uop.imm as u64, |id| self.phys_regs.get(id).value);

            match uop.opcode {
                Opcode::Nop => {
                    self.rob.mark_issued(tag, 0, 0);
                    self.rob.complete(tag);
                }
                // Parked with an effectively infinite countdown so the generic
                // `Rob::tick` never auto-completes it; only `tick`'s head check
                // below does, once this fence reaches the ROB head (spec §4.5
                // "on ROB head, they awaken").
                Opcode::Fence(_) => {
                    self.rob.mark_issued(tag, 0, u32::MAX);
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::Shr
                | Opcode::Sar
                | Opcode::Mul
                | Opcode::Imul
                | Opcode::Div
                | Opcode::Idiv
                | Opcode::Mov
                | Opcode::Movsx
                | Opcode::Movzx
                | Opcode::Lea => {
                    let result = alu_compute(uop.opcode, a, b);
                    self.rob.mark_issued(tag, 0, 1);
                    if let Some(dest) = entry.dest_physreg {
                        self.phys_regs.write_back(dest, result);
                        self.writeback(dest);
                    }
                    if uop.writes_flags {
                        self.spec_flags = flags_from_result(result);
                    }
                    self.rob.complete(tag);
                }
                Opcode::Cmov(cond) => {
                    self.rob.mark_issued(tag, 0, 1);
                    if let Some(dest) = entry.dest_physreg {
                        let value = if eval_condition(self.spec_flags, cond) { a } else { b };
                        self.phys_regs.write_back(dest, value);
                        self.writeback(dest);
                    }
                    self.rob.complete(tag);
                }
                Opcode::Cmp | Opcode::Test => {
                    let result = alu_compute(Opcode::Sub, a, b);
                    self.spec_flags = flags_from_result(result);
                    self.rob.mark_issued(tag, 0, 1);
                    self.rob.complete(tag);
                }
                Opcode::Branch(cond) => {
                    let taken = eval_condition(self.spec_flags, cond);
                    let target = (uop.rip as i64 + uop.imm) as u64;
                    let fallthrough = uop.rip + u64::from(uop.insn_bytes.max(1));
                    let prediction = predictor.predict(uop.rip, fallthrough);
                    let real_target = if taken { target } else { fallthrough };
                    predictor.resolve(uop.rip, taken, real_target);
                    self.rob.mark_issued(tag, 0, 1);
                    self.rob.complete(tag);
                    if prediction.taken != taken || (taken && prediction.target != target) {
                        mispredict = Some((tag, real_target));
                    }
                }
                Opcode::BranchIndirect | Opcode::Call | Opcode::Ret => {
                    let real_target = if uop.imm != 0 {
                        (uop.rip as i64 + uop.imm) as u64
                    } else {
                        a
                    };
                    let fallthrough = uop.rip + u64::from(uop.insn_bytes.max(1));
                    let prediction = predictor.predict(uop.rip, fallthrough);
                    predictor.resolve(uop.rip, true, real_target);
                    self.rob.mark_issued(tag, 0, 1);
                    self.rob.complete(tag);
                    if prediction.target != real_target {
                        mispredict = Some((tag, real_target));
                    }
                }
                Opcode::Load => {
                    self.issue_load(tag, a, uop, ctx);
                }
                Opcode::Store => {
                    self.issue_store(tag, a, b);
                }
                Opcode::Assist(_) | Opcode::LightAssist(_) | Opcode::FpAssist => {
                    self.rob.mark_issued(tag, 0, 1);
                    self.rob.complete(tag);
                }
                Opcode::InvalidOpcodeFault => {
                    self.rob.fault(tag, Trap::InvalidOpcode(VirtAddr(uop.rip)));
                }
                Opcode::ExecFault => {
                    self.rob.fault(tag, Trap::ExecPageFault(VirtAddr(uop.rip)));
                }
            }
        }
        mispredict
    }

    fn issue_load<C: Context>(&mut self, tag: RobTag, vaddr: u64, uop: TransOp, ctx: &mut C) {
        let translation = self.translate(VirtAddr(vaddr), false, false);
        let paddr = match translation {
            Ok(p) => p,
            Err(trap) => {
                self.rob.fault(tag, trap);
                return;
            }
        };
        self.lsq.resolve_address(tag, vaddr, paddr.val());

        match self.lsq.forward_load(tag, uop.rip, paddr.val(), uop.size, &self.lsap) {
            ForwardResult::Hit(value) => {
                self.rob.mark_issued(tag, 0, 1);
                self.complete_load(tag, value);
            }
            ForwardResult::Stall => {
                // Re-enter the issue queue rather than complete: the aliasing
                // store hasn't resolved yet. The entry stays `Dispatched`
                // (mark_issued was never called), matching how a freshly
                // dispatched uop looks.
                let _ = self.issue_queue.dispatch(tag, [None; 3]);
            }
            ForwardResult::Miss => {
                let (_hit, penalty) = self.dcache.access(paddr.val(), false, MEMORY_LATENCY_CYCLES);
                let value = ctx.read_memory(paddr, uop.size.bytes() as usize);
                self.rob.mark_issued(tag, 0, penalty.max(1));
                self.complete_load(tag, value);
            }
        }
    }

    fn complete_load(&mut self, tag: RobTag, value: u64) {
        if let Some(entry) = self.rob.find_entry(tag) {
            if let Some(dest) = entry.dest_physreg {
                self.phys_regs.write_back(dest, value);
                self.writeback(dest);
            }
        }
        self.rob.complete(tag);
    }

    fn issue_store(&mut self, tag: RobTag, vaddr: u64, data: u64) {
        let translation = self.translate(VirtAddr(vaddr), true, false);
        let paddr = match translation {
            Ok(p) => p,
            Err(trap) => {
                self.rob.fault(tag, trap);
                return;
            }
        };
        self.lsq.resolve_address(tag, vaddr, paddr.val());
        self.lsq.resolve_data(tag, data);

        let size = self.rob.find_entry(tag).map(|e| e.uop.size);
        if let Some(size) = size
            && let Some(load_tag) = self.lsq.find_aliasing_load(tag, paddr.val(), size)
        {
            let load_rip = self.rob.find_entry(load_tag).map(|e| e.uop.rip);
            if let Some(load_rip) = load_rip {
                self.lsap.record_alias(load_rip);
            }
            tracing::trace!(
                store_tag = tag.0,
                load_tag = load_tag.0,
                reason = ?ReplayReason::LoadStoreAlias,
                "store-address resolution found an aliasing earlier-issued load"
            );
            self.alias_recoveries += 1;
            redispatch(&mut self.rob, &mut self.issue_queue, load_tag);
        }

        self.rob.mark_issued(tag, 0, 1);
        self.rob.complete(tag);
    }

    /// Probes the appropriate TLB; on miss, synchronously drives the
    /// page-table walk to completion (spec §4.6). A real multi-cycle
    /// per-level cache wakeup is the memory hierarchy's concern (§6); here
    /// the walk's cost is folded into the caller's `cycles_left` instead of
    /// parking the ROB across cycles.
    fn translate(&mut self, vaddr: VirtAddr, is_write: bool, is_exec: bool) -> Result<PhysAddr, Trap> {
        let hit = if is_exec {
            self.mmu.probe_insn(vaddr)
        } else {
            self.mmu.probe_data(vaddr).map(|(paddr, _, _)| paddr)
        };
        if let Some(paddr) = hit {
            return Ok(paddr);
        }

        let mut walker = if is_exec {
            self.mmu.start_insn_walk(vaddr)
        } else {
            self.mmu.start_data_walk(vaddr, is_write)
        };
        // No guest page tables are modeled: every walk identity-maps the
        // faulting page's frame number, matching `TestContext::translate`'s
        // identity mapping. `PageWalker`/`Mmu` are still exercised for their
        // walk-depth countdown and TLB insertion structure.
        let frame = vaddr.page().val() >> 12;
        loop {
            if let Some(outcome) = walker.advance(true, frame) {
                return match outcome {
                    WalkOutcome::Mapped(paddr) => {
                        if is_exec {
                            self.mmu.insert_insn(vaddr, frame, 0);
                        } else {
                            self.mmu.insert_data(vaddr, frame, 0);
                        }
                        Ok(paddr)
                    }
                    WalkOutcome::NotPresent => Err(walker.to_trap(outcome).unwrap()),
                };
            }
        }
    }

    fn writeback(&mut self, physreg: PhysRegId) {
        self.issue_queue.wakeup(physreg);
    }

    /// Advances in-flight cache-miss countdowns and lets a fence at the ROB
    /// head complete (spec §4.5 "on ROB head, they awaken").
    pub fn tick(&mut self) {
        if let Some(head) = self.rob.peek_head()
            && head.state == RobState::Issued
            && head.uop.is_fence()
        {
            let tag = head.tag;
            self.rob.complete(tag);
        }
        self.rob.tick();
    }

    /// Commits up to `commit_width` ready ROB entries in program order
    /// (spec §4.8). Stops at the first entry carrying a trap, after
    /// reporting it, so faults are delivered precisely.
    pub fn commit<C: Context>(
        &mut self,
        width: usize,
        ctx: &mut C,
        mem: &mut dyn MemoryHierarchy,
    ) -> Vec<Retired> {
        let mut retired = Vec::new();
        for _ in 0..width {
            let Some(head) = self.rob.peek_head() else {
                break;
            };
            if !matches!(head.state, RobState::Completed | RobState::ReadyToCommit) {
                break;
            }

            let Some(entry) = self.rob.commit_head() else {
                break;
            };

            if let Some(trap) = entry.trap.clone() {
                ctx.deliver_trap(trap.clone());
                retired.push(Retired {
                    tag: entry.tag,
                    uop: entry.uop,
                    trap: Some(trap),
                    store_paddr: None,
                });
                break;
            }

            if let Some(arch) = entry.uop.rd
                && let Some(dest) = entry.dest_physreg
            {
                let old = self.commit_rrt.lookup(arch);
                self.commit_rrt.commit(arch, dest);
                self.phys_regs.mark_committed(dest);
                self.phys_regs.release(old);
            }
            for src in entry.src_physregs.into_iter().flatten() {
                self.phys_regs.release(src);
            }

            let mut store_paddr = None;
            if entry.uop.is_store() {
                self.lsq.mark_committed(entry.tag);
                if let Some(drained) = self.lsq.drain_one() {
                    if let Some(paddr) = drained.paddr {
                        ctx.write_memory(PhysAddr(paddr), drained.data, drained.size.bytes() as usize);
                        store_paddr = Some(paddr);
                    }
                }
            }
            if entry.uop.is_load() {
                self.lsq.retire_load(entry.tag);
            }
            if entry.uop.eom && entry.lock_acquired {
                mem.invalidate_lock(entry.uop.rip, self.core_id);
            }

            tracing::trace!(tag = entry.tag.0, "committed");
            retired.push(Retired {
                tag: entry.tag,
                uop: entry.uop,
                trap: None,
                store_paddr,
            });
        }
        retired
    }

    pub fn flush_all(&mut self) {
        self.rob.flush_all();
        self.lsq.flush_all();
        self.issue_queue.flush_all();
        self.spec_rrt = self.commit_rrt.to_spec();
    }
}

fn alu_compute(opcode: Opcode, a: u64, b: u64) -> u64 {
    match opcode {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        Opcode::Shl => a.wrapping_shl(b as u32),
        Opcode::Shr => a.wrapping_shr(b as u32),
        Opcode::Sar => ((a as i64).wrapping_shr(b as u32)) as u64,
        Opcode::Mul | Opcode::Imul => a.wrapping_mul(b),
        Opcode::Div => {
            if b == 0 {
                0
            } else {
                a / b
            }
        }
        Opcode::Idiv => {
            if b == 0 {
                0
            } else {
                ((a as i64) / (b as i64)) as u64
            }
        }
        Opcode::Mov | Opcode::Movzx => b,
        Opcode::Movsx => b,
        Opcode::Lea => a.wrapping_add(b),
        _ => b,
    }
}

/// Packs ZF (bit 6) and SF (bit 7) from a result, matching the x86 EFLAGS
/// bit positions. Carry/overflow/parity are not modeled (spec §1: ALU
/// semantic fidelity beyond decoding shape is out of scope).
fn flags_from_result(result: u64) -> u64 {
    let mut flags = 0u64;
    if result == 0 {
        flags |= 1 << 6;
    }
    if (result as i64) < 0 {
        flags |= 1 << 7;
    }
    flags
}

/// Evaluates a condition code against the simplified `spec_flags` scalar
/// (ZF/SF only, see `OooThread::spec_flags`). Unsigned comparisons collapse
/// onto the signed ones since carry/overflow aren't tracked; this is a
/// deliberate fidelity cut, not an attempt at correct x86 flag semantics.
fn eval_condition(flags: u64, cond: ConditionCode) -> bool {
    let zf = flags & (1 << 6) != 0;
    let sf = flags & (1 << 7) != 0;
    match cond {
        ConditionCode::Always => true,
        ConditionCode::Equal => zf,
        ConditionCode::NotEqual => !zf,
        ConditionCode::Sign => sf,
        ConditionCode::NotSign => !sf,
        ConditionCode::Less | ConditionCode::Below => sf,
        ConditionCode::GreaterEqual | ConditionCode::AboveEqual => !sf,
        ConditionCode::Greater | ConditionCode::Above => !zf && !sf,
        ConditionCode::LessEqual | ConditionCode::BelowEqual => zf || sf,
        ConditionCode::Overflow | ConditionCode::Parity => false,
        ConditionCode::NotOverflow | ConditionCode::NotParity => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, MmuConfig, QueueConfig};
    use crate::core::branch_predictor::StaticBranchPredictor;
    use crate::core::context::TestContext;
    use crate::core::memory_hierarchy::SimpleMemoryHierarchy;
    use crate::isa::transop::ArchReg;

    fn thread() -> OooThread {
        OooThread::new(
            &QueueConfig::default(),
            Mmu::new(&MmuConfig::default()),
            CacheSim::new(&CacheConfig {
                enabled: true,
                ..CacheConfig::default()
            }),
            0,
        )
    }

    fn mov_imm(rd: ArchReg, imm: i64, rip: u64) -> TransOp {
        TransOp {
            rd: Some(rd),
            imm,
            ..TransOp::new(Opcode::Mov, rip)
        }
    }

    #[test]
    fn dispatch_issue_commit_roundtrips_a_mov() {
        let mut thread = thread();
        let mut ctx = TestContext::new();
        let mut predictor = StaticBranchPredictor;
        let mut mem = SimpleMemoryHierarchy::new(1);

        let tag = thread.dispatch(mov_imm(ArchReg::Gpr(1), 42, 0x1000)).unwrap();
        thread.issue(4, &mut ctx, &mut predictor);
        let retired = thread.commit(4, &mut ctx, &mut mem);

        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].tag, tag);
        let physreg = thread.commit_rrt.lookup(ArchReg::Gpr(1));
        assert_eq!(thread.phys_regs.get(physreg).value, 42);
    }

    #[test]
    fn store_then_load_forwards_before_commit() {
        let mut thread = thread();
        let mut ctx = TestContext::new();
        let mut predictor = StaticBranchPredictor;
        let mut mem = SimpleMemoryHierarchy::new(1);

        thread.dispatch(mov_imm(ArchReg::Gpr(1), 0x2000, 0x1000)).unwrap();
        thread.dispatch(mov_imm(ArchReg::Gpr(2), 0xAB, 0x1001)).unwrap();
        thread.issue(4, &mut ctx, &mut predictor);
        thread.commit(4, &mut ctx, &mut mem);

        // Dispatch the store and the load in the same batch, and issue them
        // in the same cycle, so the load's forward probe sees the store's
        // resolved address/data while it is still in flight (not yet
        // committed to memory).
        let store = TransOp {
            ra: Some(ArchReg::Gpr(1)),
            rb: Some(ArchReg::Gpr(2)),
            size: crate::isa::transop::SizeShift::BYTE,
            ..TransOp::new(Opcode::Store, 0x1002)
        };
        thread.dispatch(store).unwrap();

        let load = TransOp {
            rd: Some(ArchReg::Gpr(3)),
            ra: Some(ArchReg::Gpr(1)),
            size: crate::isa::transop::SizeShift::BYTE,
            ..TransOp::new(Opcode::Load, 0x1003)
        };
        let load_tag = thread.dispatch(load).unwrap();
        thread.issue(4, &mut ctx, &mut predictor);

        let entry = thread.rob.find_entry(load_tag).unwrap();
        assert_eq!(entry.state, RobState::Completed);
        let dest = entry.dest_physreg.unwrap();
        assert_eq!(thread.phys_regs.get(dest).value, 0xAB);

        thread.commit(4, &mut ctx, &mut mem);
        thread.commit(4, &mut ctx, &mut mem);
    }

    #[test]
    fn mispredicted_branch_is_reported() {
        let mut thread = thread();
        let mut ctx = TestContext::new();
        let mut predictor = StaticBranchPredictor;

        let branch = TransOp {
            imm: 0x100,
            insn_bytes: 2,
            ..TransOp::new(Opcode::Branch(ConditionCode::Always), 0x1000)
        };
        let tag = thread.dispatch(branch).unwrap();
        let mispredict = thread.issue(4, &mut ctx, &mut predictor);
        assert_eq!(mispredict, Some((tag, 0x1100)));
    }
}
