//! In-order "Atom" pipeline backend (spec §4.9).
//!
//! A single bundle of `AtomOp`s moves through fetch, issue/execute, and
//! writeback as one FIFO per thread, using `StateLists` the same way the
//! ROB uses program-order links, but with a single forward path instead of
//! the ROB's out-of-order completion: an `AtomOp` only advances once the
//! one ahead of it has, so commit is just "pop the writeback list's head".
//! `forward`/`transfer` are spec-named sub-steps of moving a result from
//! the functional unit to a dependent's operand latch; this backend folds
//! them into the `Execute` → `Writeback` transition rather than giving them
//! their own stage list, since the in-order issue queue never looks more
//! than one op ahead for the forwarding data it needs.

use crate::common::addr::VirtAddr;
use crate::common::error::Trap;
use crate::config::AtomConfig;
use crate::core::context::Context;
use crate::core::statelist::StateLists;
use crate::core::units::cache::CacheSim;
use crate::isa::transop::{ArchReg, ConditionCode, Opcode, TransOp};

const STAGE_FETCHED: u32 = 0;
const STAGE_EXECUTING: u32 = 1;
const STAGE_WRITEBACK: u32 = 2;
const NUM_STAGES: usize = 3;

/// One in-flight atom-op: the decoded uop plus the cycle countdown before it
/// may advance to the next stage (spec §4.9 "minimum uniform pipeline
/// depth").
#[derive(Clone, Debug)]
struct AtomOp {
    uop: TransOp,
    cycles_left: u64,
    result: u64,
    trap: Option<Trap>,
    /// Physical address a committing store wrote, if `uop` is a store that
    /// translated cleanly (spec §4.1 SMC: lets the driver invalidate any
    /// basic block covering that frame without re-translating after commit).
    store_paddr: Option<u64>,
}

impl Default for AtomOp {
    fn default() -> Self {
        Self {
            uop: TransOp::new(Opcode::Nop, 0),
            cycles_left: 0,
            result: 0,
            trap: None,
            store_paddr: None,
        }
    }
}

/// Per-thread in-order pipeline. SMT thread switching on a cache miss is
/// modeled by `is_stalled`: the caller (the core driver) checks it each
/// cycle and picks a different thread's `tick`/`commit` to run instead, the
/// same frontend-stall signal spec §4.9 drives the switch decision from.
pub struct AtomThread {
    ops: Vec<AtomOp>,
    lists: StateLists,
    free_ids: Vec<u32>,
    dcache: CacheSim,
    min_pipeline_cycles: u64,
    max_uops_per_atomop: usize,
    is_stalled: bool,
    spec_flags: u64,
}

impl AtomThread {
    #[must_use]
    pub fn new(cfg: &AtomConfig, capacity: usize, dcache: CacheSim) -> Self {
        Self {
            ops: vec![AtomOp::default(); capacity],
            lists: StateLists::new(capacity, NUM_STAGES),
            free_ids: (0..capacity as u32).rev().collect(),
            dcache,
            min_pipeline_cycles: cfg.min_pipeline_cycles,
            max_uops_per_atomop: cfg.max_uops_per_atomop,
            is_stalled: false,
            spec_flags: 0,
        }
    }

    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.is_stalled
    }

    #[must_use]
    pub fn max_uops_per_atomop(&self) -> usize {
        self.max_uops_per_atomop
    }

    /// Fetches a single decoded uop into the pipeline (spec §4.9 "fetch").
    /// Returns `false` if the pipeline has no free slot (the caller should
    /// stall fetch this cycle).
    pub fn fetch(&mut self, uop: TransOp) -> bool {
        let Some(id) = self.free_ids.pop() else {
            return false;
        };
        self.ops[id as usize] = AtomOp {
            uop,
            cycles_left: self.min_pipeline_cycles,
            result: 0,
            trap: None,
            store_paddr: None,
        };
        self.lists.push_back(STAGE_FETCHED, id);
        true
    }

    /// Issues the oldest fetched op into execute (spec §4.9 "issue"). At
    /// most one op executes at a time, matching the Atom's single-issue
    /// design. Returns the resolved target whenever a branch/call/ret just
    /// executed, so the driver can tell whether its speculatively-fetched
    /// fallthrough uops need flushing (this backend has no ROB to annul,
    /// so the driver is the one that owns that decision).
    pub fn issue<C: Context>(&mut self, ctx: &mut C) -> Option<u64> {
        let Some(id) = self.lists.head(STAGE_FETCHED) else {
            return None;
        };
        if self.lists.head(STAGE_EXECUTING).is_some() {
            return None; // execute stage occupied; in-order, can't pass it.
        }

        let op = &mut self.ops[id as usize];
        let uop = op.uop.clone();
        let a = read_operand(ctx, uop.ra);
        let b = uop.rb.map_or(uop.imm as u64, |r| read_operand(ctx, Some(r)));

        let outcome = execute(&uop, a, b, ctx, &mut self.dcache, &mut self.spec_flags);
        op.result = outcome.result;
        op.trap = outcome.trap;
        op.store_paddr = outcome.store_paddr;
        op.cycles_left = op.cycles_left.max(outcome.extra_cycles);
        self.lists.push_back(STAGE_EXECUTING, id);
        self.is_stalled = outcome.extra_cycles > self.min_pipeline_cycles;
        outcome.branch_target
    }

    /// Advances the execute-stage op's countdown; once it reaches zero the
    /// op moves to writeback (spec §4.9 "forward"/"transfer" folded into
    /// this transition, see module docs).
    pub fn tick(&mut self) {
        if let Some(id) = self.lists.head(STAGE_EXECUTING) {
            let op = &mut self.ops[id as usize];
            if op.cycles_left > 0 {
                op.cycles_left -= 1;
            }
            if op.cycles_left == 0 {
                self.is_stalled = false;
                self.lists.push_back(STAGE_WRITEBACK, id);
            }
        }
    }

    /// Commits the head of the writeback list, if any, writing its result
    /// back to architectural state (spec §4.9 "writeback"/"commit" are
    /// adjacent for the in-order backend: nothing can be squashed once it
    /// reaches writeback since there is no speculation past a stalled op).
    pub fn commit<C: Context>(&mut self, ctx: &mut C) -> Option<AtomRetired> {
        let id = self.lists.head(STAGE_WRITEBACK)?;
        let op = self.ops[id as usize].clone();
        self.lists.unlink(id);
        self.free_ids.push(id);

        if let Some(trap) = op.trap.clone() {
            ctx.deliver_trap(trap.clone());
            return Some(AtomRetired {
                uop: op.uop,
                trap: Some(trap),
                store_paddr: None,
            });
        }

        if let Some(ArchReg::Gpr(i)) = op.uop.rd {
            ctx.registers_mut().write(i as usize, op.result);
        }
        if op.uop.writes_flags {
            ctx.registers_mut().set_rflags(self.spec_flags);
        }

        Some(AtomRetired {
            uop: op.uop,
            trap: None,
            store_paddr: op.store_paddr,
        })
    }

    pub fn flush_all(&mut self) {
        for list in [STAGE_FETCHED, STAGE_EXECUTING, STAGE_WRITEBACK] {
            while let Some(id) = self.lists.head(list) {
                self.lists.unlink(id);
                self.free_ids.push(id);
            }
        }
        self.is_stalled = false;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AtomRetired {
    pub uop: TransOp,
    pub trap: Option<Trap>,
    /// Physical address a committing store just wrote, if any (spec §4.1 SMC).
    pub store_paddr: Option<u64>,
}

fn read_operand<C: Context>(ctx: &C, reg: Option<ArchReg>) -> u64 {
    match reg {
        Some(ArchReg::Gpr(i)) => ctx.registers().read(i as usize),
        Some(ArchReg::Flags) => ctx.registers().rflags(),
        Some(ArchReg::Zero) | None => 0,
    }
}

/// Result of executing one uop: its value, any trap, how many cycles it
/// should occupy execute for, the physical address a store wrote (if any),
/// and the resolved target of a branch/call/ret (if any).
struct ExecOutcome {
    result: u64,
    trap: Option<Trap>,
    extra_cycles: u64,
    store_paddr: Option<u64>,
    branch_target: Option<u64>,
}

fn alu_outcome(result: u64) -> ExecOutcome {
    ExecOutcome {
        result,
        trap: None,
        extra_cycles: 1,
        store_paddr: None,
        branch_target: None,
    }
}

/// Executes one uop against architectural state directly (no rename: the
/// Atom pipeline is in-order single-issue, spec §4.9). Branches write the
/// resolved target straight into `ctx`'s rip as well as reporting it, since
/// this backend has no deferred-commit point to write architectural state
/// from later.
fn execute<C: Context>(
    uop: &TransOp,
    a: u64,
    b: u64,
    ctx: &mut C,
    dcache: &mut CacheSim,
    spec_flags: &mut u64,
) -> ExecOutcome {
    match uop.opcode {
        Opcode::Add => alu_outcome(a.wrapping_add(b)),
        Opcode::Sub => alu_outcome(a.wrapping_sub(b)),
        Opcode::And => alu_outcome(a & b),
        Opcode::Or => alu_outcome(a | b),
        Opcode::Xor => alu_outcome(a ^ b),
        Opcode::Shl => alu_outcome(a.wrapping_shl(b as u32)),
        Opcode::Shr => alu_outcome(a.wrapping_shr(b as u32)),
        Opcode::Sar => alu_outcome(((a as i64).wrapping_shr(b as u32)) as u64),
        Opcode::Mul | Opcode::Imul => alu_outcome(a.wrapping_mul(b)),
        Opcode::Div => alu_outcome(if b == 0 { 0 } else { a / b }),
        Opcode::Idiv => alu_outcome(if b == 0 { 0 } else { ((a as i64) / (b as i64)) as u64 }),
        Opcode::Mov | Opcode::Movzx | Opcode::Movsx | Opcode::Lea => alu_outcome(b),
        Opcode::Cmov(cond) => alu_outcome(if eval_condition(*spec_flags, cond) { a } else { b }),
        Opcode::Cmp | Opcode::Test => {
            let result = a.wrapping_sub(b);
            *spec_flags = flags_from_result(result);
            alu_outcome(0)
        }
        Opcode::Nop | Opcode::Fence(_) => alu_outcome(0),
        Opcode::Branch(cond) => {
            let taken = eval_condition(*spec_flags, cond);
            let target = if taken { (uop.rip as i64 + uop.imm) as u64 } else { uop.rip + u64::from(uop.insn_bytes.max(1)) };
            ctx.registers_mut().set_rip(target);
            ExecOutcome {
                branch_target: Some(target),
                ..alu_outcome(0)
            }
        }
        Opcode::BranchIndirect | Opcode::Call | Opcode::Ret => {
            let target = if uop.imm != 0 { (uop.rip as i64 + uop.imm) as u64 } else { a };
            ctx.registers_mut().set_rip(target);
            ExecOutcome {
                branch_target: Some(target),
                ..alu_outcome(0)
            }
        }
        Opcode::Load => {
            let vaddr = VirtAddr(a);
            match ctx.translate(vaddr, false, false) {
                Ok(paddr) => {
                    let (hit, penalty) = dcache.access(paddr.val(), false, 40);
                    let value = ctx.read_memory(paddr, uop.size.bytes() as usize);
                    ExecOutcome {
                        extra_cycles: if hit { 1 } else { penalty.max(1) },
                        ..alu_outcome(value)
                    }
                }
                Err(trap) => ExecOutcome {
                    trap: Some(trap),
                    ..alu_outcome(0)
                },
            }
        }
        Opcode::Store => {
            let vaddr = VirtAddr(a);
            match ctx.translate(vaddr, true, false) {
                Ok(paddr) => {
                    let (hit, penalty) = dcache.access(paddr.val(), true, 40);
                    ctx.write_memory(paddr, b, uop.size.bytes() as usize);
                    ExecOutcome {
                        extra_cycles: if hit { 1 } else { penalty.max(1) },
                        store_paddr: Some(paddr.val()),
                        ..alu_outcome(0)
                    }
                }
                Err(trap) => ExecOutcome {
                    trap: Some(trap),
                    ..alu_outcome(0)
                },
            }
        }
        Opcode::Assist(_) | Opcode::LightAssist(_) | Opcode::FpAssist => alu_outcome(0),
        Opcode::InvalidOpcodeFault => ExecOutcome {
            trap: Some(Trap::InvalidOpcode(VirtAddr(uop.rip))),
            ..alu_outcome(0)
        },
        Opcode::ExecFault => ExecOutcome {
            trap: Some(Trap::ExecPageFault(VirtAddr(uop.rip))),
            ..alu_outcome(0)
        },
    }
}

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
    use crate::config::{AtomConfig, CacheConfig};
    use crate::core::context::TestContext;

    fn pipeline() -> AtomThread {
        AtomThread::new(
            &AtomConfig::default(),
            8,
            CacheSim::new(&CacheConfig {
                enabled: true,
                ..CacheConfig::default()
            }),
        )
    }

    #[test]
    fn fetch_issue_tick_commit_roundtrips_a_mov() {
        let mut atom = pipeline();
        let mut ctx = TestContext::new();
        let uop = TransOp {
            rd: Some(ArchReg::Gpr(1)),
            imm: 7,
            ..TransOp::new(Opcode::Mov, 0x1000)
        };
        assert!(atom.fetch(uop));
        atom.issue(&mut ctx);
        for _ in 0..8 {
            atom.tick();
        }
        let retired = atom.commit(&mut ctx).unwrap();
        assert!(retired.trap.is_none());
        assert_eq!(ctx.registers().read(1), 7);
    }

    #[test]
    fn pipeline_is_fifo_single_issue() {
        let mut atom = pipeline();
        let first = TransOp::new(Opcode::Nop, 0x1000);
        let second = TransOp::new(Opcode::Nop, 0x1001);
        assert!(atom.fetch(first));
        assert!(atom.fetch(second));
        atom.issue(&mut TestContext::new());
        // Second op can't issue while the first occupies execute.
        atom.issue(&mut TestContext::new());
        assert!(atom.lists.head(STAGE_FETCHED).is_some());
    }
}
