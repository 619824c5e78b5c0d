//! `BasicBlock`: an ordered run of `TransOp`s ending in a single branch/assist.

use crate::common::RipVirtPhys;
use crate::isa::transop::TransOp;

/// How a basic block's final control-transfer uop behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchType {
    Conditional,
    Unconditional,
    Indirect,
    /// Ends in a microcode assist rather than a branch.
    Assist,
    /// Ends because a resource limit (uop/byte budget) was hit mid-block,
    /// with a synthetic unconditional fallthrough to the next block.
    Split,
    /// Ends in a fence/barrier that the decoder chose to block-terminate on.
    Barrier,
}

/// A decoded, cacheable run of micro-ops.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub identity: RipVirtPhys,
    pub uops: Vec<TransOp>,
    pub branch_type: BranchType,
    /// Predicted RIP if the terminating branch is taken.
    pub predicted_taken_rip: Option<u64>,
    /// Predicted RIP if the terminating branch falls through / is not taken.
    pub predicted_seq_rip: Option<u64>,
    /// Total x86 byte length of the block.
    pub byte_length: u32,
    pub tag_count: u32,
    pub mem_count: u32,
    pub store_count: u32,
    /// Bitmap of architectural GPRs (bit i = `ArchReg::Gpr(i)`) referenced
    /// anywhere in the block, used for fast rename-dependency pre-checks.
    pub used_regs: u32,
    pub refcount: u32,
    pub lastused_cycle: u64,
}

impl BasicBlock {
    #[must_use]
    pub fn new(identity: RipVirtPhys, uops: Vec<TransOp>, branch_type: BranchType) -> Self {
        let byte_length = uops.iter().map(|u| u64::from(u.insn_bytes)).sum::<u64>() as u32;
        let mem_count = uops.iter().filter(|u| u.is_load() || u.is_store()).count() as u32;
        let store_count = uops.iter().filter(|u| u.is_store()).count() as u32;
        let mut used_regs = 0u32;
        for u in &uops {
            for r in [u.rd, u.ra, u.rb, u.rc].into_iter().flatten() {
                if let crate::isa::transop::ArchReg::Gpr(i) = r {
                    used_regs |= 1 << (i & 31);
                }
            }
        }
        Self {
            identity,
            tag_count: uops.len() as u32,
            uops,
            branch_type,
            predicted_taken_rip: None,
            predicted_seq_rip: None,
            byte_length,
            mem_count,
            store_count,
            used_regs,
            refcount: 0,
            lastused_cycle: 0,
        }
    }

    #[must_use]
    pub fn with_predictions(mut self, taken: Option<u64>, seq: Option<u64>) -> Self {
        self.predicted_taken_rip = taken;
        self.predicted_seq_rip = seq;
        self
    }

    pub fn add_ref(&mut self) {
        self.refcount += 1;
    }

    /// Returns `true` if the block is now unreferenced and may be freed.
    pub fn drop_ref(&mut self) -> bool {
        self.refcount = self.refcount.saturating_sub(1);
        self.refcount == 0
    }

    #[must_use]
    pub fn touches_frame(&self, frame: u64) -> bool {
        self.identity.touches_frame(frame)
    }
}
