//! Annul-on-mispredict and redispatch-of-dependents (spec §4.7).
//!
//! Annul squashes everything younger than a kept tag: issue-queue slots,
//! LSQ entries, and never-committed physical registers are all dropped, and
//! `SpecRrt` is rebuilt from `CommitRrt` plus a pseudo-commit replay of the
//! surviving in-flight entries. Redispatch is cheaper and narrower: the
//! trigger uop and everything after it keep their ROB entries and renames,
//! they just re-enter the issue queue to re-read (now-corrected) operands.

use crate::core::issuequeue::IssueQueue;
use crate::core::physreg::{CommitRrt, PhysRegFile, SpecRrt};
use crate::core::pipeline::lsq::Lsq;
use crate::core::pipeline::rob::{Rob, RobTag};

/// Squashes every ROB entry dispatched after `keep_tag`, releasing their
/// physical registers and LSQ/issue-queue slots, then rebuilds `SpecRrt`
/// from `CommitRrt` plus a pseudo-commit of everything still in flight up
/// to `keep_tag`.
pub fn annul_after(
    rob: &mut Rob,
    lsq: &mut Lsq,
    issue_queue: &mut IssueQueue,
    phys_regs: &mut PhysRegFile,
    spec_rrt: &mut SpecRrt,
    commit_rrt: &CommitRrt,
    keep_tag: RobTag,
) {
    let mut squashed_dest = Vec::new();
    let mut squashed_src = Vec::new();
    rob.for_each_valid(|entry| {
        if entry.tag.0 > keep_tag.0 {
            if let Some(dest) = entry.dest_physreg {
                squashed_dest.push(dest);
            }
            for src in entry.src_physregs.into_iter().flatten() {
                squashed_src.push(src);
            }
        }
    });

    for src in squashed_src {
        phys_regs.release(src);
    }
    for dest in squashed_dest {
        phys_regs.free_speculative(dest);
    }

    rob.flush_after(keep_tag);
    lsq.flush_after(keep_tag);
    issue_queue.flush_after(keep_tag);

    *spec_rrt = commit_rrt.to_spec();
    rob.for_each_valid(|entry| {
        if entry.tag.0 <= keep_tag.0
            && let (Some(arch), Some(dest)) = (entry.uop.rd, entry.dest_physreg)
        {
            spec_rrt.rename(arch, dest);
        }
    });
}

/// Re-dispatches `trigger` and every younger ROB entry back through the
/// issue queue without disturbing their ROB entries or renames (spec §4.7
/// "Redispatch of dependents" — reserved for value-mispredictions, cheaper
/// than a full annul since nothing needs refetching).
///
/// This crate's conservative approximation taints everything from `trigger`
/// onward rather than computing the precise producer-taint bitvector the
/// spec describes; correctness only requires redispatching a superset of
/// the truly-tainted set.
pub fn redispatch(rob: &mut Rob, issue_queue: &mut IssueQueue, trigger: RobTag) {
    issue_queue.flush_from(trigger);
    let reset_tags = rob.redispatch_from(trigger);
    for tag in reset_tags {
        let Some(entry) = rob.find_entry(tag) else {
            continue;
        };
        let mut sources = [None; 3];
        for (i, src) in entry.src_physregs.into_iter().enumerate() {
            if let Some(id) = src {
                sources[i] = Some(id);
            }
        }
        issue_queue.dispatch(tag, sources.map(|s| s.map(|id| (id, false))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::transop::{ArchReg, Opcode, TransOp};

    fn uop(rd: Option<ArchReg>) -> TransOp {
        TransOp {
            rd,
            ..TransOp::new(Opcode::Add, 0x1000)
        }
    }

    #[test]
    fn annul_frees_squashed_registers_and_rewinds_spec_rrt() {
        let mut rob = Rob::new(8);
        let mut lsq = Lsq::new(8);
        let mut iq = IssueQueue::new(8);
        let mut phys_regs = PhysRegFile::new(8);
        let zero = phys_regs.zero();
        let mut spec_rrt = SpecRrt::new(zero);
        let commit_rrt = CommitRrt::new(zero);

        let keep_dest = phys_regs.allocate(ArchReg::Gpr(1)).unwrap();
        phys_regs.add_ref(keep_dest);
        spec_rrt.rename(ArchReg::Gpr(1), keep_dest);
        let keep_tag = rob
            .allocate(uop(Some(ArchReg::Gpr(1))), [None; 3], Some(keep_dest))
            .unwrap();

        let squash_dest = phys_regs.allocate(ArchReg::Gpr(2)).unwrap();
        phys_regs.add_ref(squash_dest);
        spec_rrt.rename(ArchReg::Gpr(2), squash_dest);
        rob.allocate(uop(Some(ArchReg::Gpr(2))), [None; 3], Some(squash_dest))
            .unwrap();

        let before_free = phys_regs.free_count();
        annul_after(
            &mut rob,
            &mut lsq,
            &mut iq,
            &mut phys_regs,
            &mut spec_rrt,
            &commit_rrt,
            keep_tag,
        );

        assert_eq!(phys_regs.free_count(), before_free + 1);
        assert_eq!(spec_rrt.lookup(ArchReg::Gpr(1)), keep_dest);
        assert_eq!(spec_rrt.lookup(ArchReg::Gpr(2)), zero);
        assert_eq!(rob.len(), 1);
    }

    #[test]
    fn redispatch_resets_state_without_dropping_rob_entries() {
        let mut rob = Rob::new(8);
        let mut iq = IssueQueue::new(8);
        let t1 = rob.allocate(uop(None), [None; 3], None).unwrap();
        rob.mark_issued(t1, 0, 3);

        redispatch(&mut rob, &mut iq, t1);

        assert_eq!(rob.len(), 1);
        assert_eq!(iq.occupied_count(), 1);
    }
}
