//! Physical register file and the speculative/committed rename tables.
//!
//! The physical register arena is a `Vec<PhysicalRegister>` indexed by a
//! `u32` id (the teacher's arena-of-cells-by-index pattern, applied here to
//! rename state instead of decoded blocks), with a `free_list` stack giving
//! O(1) allocate/free. `SpecRRT` is the speculative rename table dispatch
//! consults and updates; `CommitRRT` trails it and is only updated at
//! commit, so annul can reconstruct `SpecRRT` by copying from `CommitRRT`
//! (spec §4.7 "annul").

use crate::isa::transop::ArchReg;

pub type PhysRegId = u32;

/// Lifecycle state of one physical register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PhysRegState {
    /// On the free list, not bound to any architectural register.
    #[default]
    Free,
    /// Allocated to a dispatched uop; result not yet produced.
    Allocated,
    /// Result written; this is the latest value for its architectural register.
    WriteBack,
    /// The uop that wrote this register committed; it is the architectural value
    /// until `CommitRRT` retargets to a newer register.
    Committed,
    /// The producing uop faulted; reads of this register surface the fault.
    Invalid,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PhysicalRegister {
    pub state: PhysRegState,
    pub value: u64,
    /// Which architectural register this physreg is currently renamed for.
    pub arch: Option<ArchReg>,
    /// Outstanding readers (ROB entries holding this as a source operand);
    /// a register can't be freed back to `Free` while this is nonzero.
    pub refcount: u32,
}

/// Arena of physical registers with O(1) allocate/free via a free-list stack.
pub struct PhysRegFile {
    regs: Vec<PhysicalRegister>,
    free_list: Vec<PhysRegId>,
    /// The always-zero constant register, pinned and never returned by `allocate`.
    zero_reg: PhysRegId,
}

impl PhysRegFile {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut regs = vec![PhysicalRegister::default(); capacity.max(1)];
        regs[0] = PhysicalRegister {
            state: PhysRegState::Committed,
            value: 0,
            arch: Some(ArchReg::Zero),
            refcount: 1,
        };
        let free_list = (1..capacity.max(1) as u32).rev().collect();
        Self {
            regs,
            free_list,
            zero_reg: 0,
        }
    }

    #[must_use]
    pub fn zero(&self) -> PhysRegId {
        self.zero_reg
    }

    pub fn allocate(&mut self, arch: ArchReg) -> Option<PhysRegId> {
        let id = self.free_list.pop()?;
        self.regs[id as usize] = PhysicalRegister {
            state: PhysRegState::Allocated,
            value: 0,
            arch: Some(arch),
            refcount: 0,
        };
        Some(id)
    }

    pub fn write_back(&mut self, id: PhysRegId, value: u64) {
        if id == self.zero_reg {
            return;
        }
        let reg = &mut self.regs[id as usize];
        reg.value = value;
        reg.state = PhysRegState::WriteBack;
    }

    pub fn mark_invalid(&mut self, id: PhysRegId) {
        if id == self.zero_reg {
            return;
        }
        self.regs[id as usize].state = PhysRegState::Invalid;
    }

    pub fn mark_committed(&mut self, id: PhysRegId) {
        if id == self.zero_reg {
            return;
        }
        self.regs[id as usize].state = PhysRegState::Committed;
    }

    pub fn add_ref(&mut self, id: PhysRegId) {
        self.regs[id as usize].refcount += 1;
    }

    /// Releases a reference; frees the register back to the pool once its
    /// refcount reaches zero and a newer physreg has taken over its
    /// architectural register (the caller enforces the latter by only
    /// calling this once `CommitRRT` has retargeted).
    pub fn release(&mut self, id: PhysRegId) {
        if id == self.zero_reg {
            return;
        }
        let reg = &mut self.regs[id as usize];
        reg.refcount = reg.refcount.saturating_sub(1);
        if reg.refcount == 0 && reg.state == PhysRegState::Committed {
            reg.state = PhysRegState::Free;
            reg.arch = None;
            self.free_list.push(id);
        }
    }

    /// Forcibly frees a register that was allocated but never committed
    /// (squashed by annul, spec §4.7), ignoring its refcount: once `SpecRrt`
    /// is reconstructed from `CommitRrt` nothing can still reference it.
    pub fn free_speculative(&mut self, id: PhysRegId) {
        if id == self.zero_reg {
            return;
        }
        let reg = &mut self.regs[id as usize];
        reg.state = PhysRegState::Free;
        reg.arch = None;
        reg.refcount = 0;
        self.free_list.push(id);
    }

    #[must_use]
    pub fn get(&self, id: PhysRegId) -> &PhysicalRegister {
        &self.regs[id as usize]
    }

    #[must_use]
    pub fn is_ready(&self, id: PhysRegId) -> bool {
        matches!(
            self.regs[id as usize].state,
            PhysRegState::WriteBack | PhysRegState::Committed | PhysRegState::Invalid
        )
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }
}

const NUM_ARCH_REGS: usize = 17; // 16 GPRs + flags

fn arch_index(arch: ArchReg) -> usize {
    match arch {
        ArchReg::Gpr(i) => i as usize,
        ArchReg::Flags => 16,
        ArchReg::Zero => 0,
    }
}

/// Speculative rename table: the mapping dispatch consults to find each
/// source operand's current physical register, and updates for each new
/// destination.
#[derive(Clone)]
pub struct SpecRrt {
    table: [PhysRegId; NUM_ARCH_REGS],
}

impl SpecRrt {
    #[must_use]
    pub fn new(zero_reg: PhysRegId) -> Self {
        Self {
            table: [zero_reg; NUM_ARCH_REGS],
        }
    }

    #[must_use]
    pub fn lookup(&self, arch: ArchReg) -> PhysRegId {
        self.table[arch_index(arch)]
    }

    pub fn rename(&mut self, arch: ArchReg, physreg: PhysRegId) {
        if matches!(arch, ArchReg::Zero) {
            return;
        }
        self.table[arch_index(arch)] = physreg;
    }
}

/// Committed rename table: trails `SpecRrt`, updated only at commit. After
/// an annul, `SpecRrt` is reconstructed by cloning from this table so
/// in-flight renames from the squashed path are discarded (spec §4.7).
#[derive(Clone)]
pub struct CommitRrt {
    table: [PhysRegId; NUM_ARCH_REGS],
}

impl CommitRrt {
    #[must_use]
    pub fn new(zero_reg: PhysRegId) -> Self {
        Self {
            table: [zero_reg; NUM_ARCH_REGS],
        }
    }

    #[must_use]
    pub fn lookup(&self, arch: ArchReg) -> PhysRegId {
        self.table[arch_index(arch)]
    }

    pub fn commit(&mut self, arch: ArchReg, physreg: PhysRegId) {
        if matches!(arch, ArchReg::Zero) {
            return;
        }
        self.table[arch_index(arch)] = physreg;
    }

    #[must_use]
    pub fn to_spec(&self) -> SpecRrt {
        SpecRrt {
            table: self.table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_roundtrip_through_free_list() {
        let mut file = PhysRegFile::new(4);
        let before = file.free_count();
        let id = file.allocate(ArchReg::Gpr(1)).unwrap();
        assert_eq!(file.free_count(), before - 1);
        file.mark_committed(id);
        file.release(id);
        assert_eq!(file.free_count(), before);
    }

    #[test]
    fn zero_register_is_never_allocated() {
        let mut file = PhysRegFile::new(4);
        for _ in 0..3 {
            let id = file.allocate(ArchReg::Gpr(0)).unwrap();
            assert_ne!(id, file.zero());
        }
    }

    #[test]
    fn annul_reconstructs_spec_from_commit() {
        let zero = 0;
        let mut spec = SpecRrt::new(zero);
        let commit = CommitRrt::new(zero);
        spec.rename(ArchReg::Gpr(3), 7);
        assert_eq!(spec.lookup(ArchReg::Gpr(3)), 7);

        spec = commit.to_spec();
        assert_eq!(spec.lookup(ArchReg::Gpr(3)), zero);
    }
}
