//! Memory management unit: TLB probe plus the page-table-walk state machine
//! that replaces a miss with a sequence of cache wakeups (spec §4.6).

pub mod tlb;

use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::error::Trap;
use crate::config::MmuConfig;
use tlb::Tlb;

/// Result of advancing a [`PageWalker`] by one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The walk reached level 0 and the entry was present.
    Mapped(PhysAddr),
    /// A level's entry was not present: a guest page fault.
    NotPresent,
}

/// In-flight multi-level page-table walk for one faulting access.
///
/// Mirrors the `rob_tlb_miss_list` / `walk_level` countdown the spec
/// describes: each call to [`PageWalker::advance`] models one cache wakeup
/// fetching the page-table entry for the current level.
#[derive(Debug, Clone, Copy)]
pub struct PageWalker {
    pub vaddr: VirtAddr,
    pub is_write: bool,
    pub is_exec: bool,
    levels_remaining: u8,
}

impl PageWalker {
    #[must_use]
    pub fn new(vaddr: VirtAddr, is_write: bool, is_exec: bool, walk_levels: u8) -> Self {
        Self {
            vaddr,
            is_write,
            is_exec,
            levels_remaining: walk_levels,
        }
    }

    /// Advance the walk by one level. `entry_present`/`ppn` model the cache
    /// wakeup delivering that level's page-table entry. Returns `None` while
    /// the walk has more levels to go.
    pub fn advance(&mut self, entry_present: bool, ppn: u64) -> Option<WalkOutcome> {
        if !entry_present {
            return Some(WalkOutcome::NotPresent);
        }
        if self.levels_remaining == 0 {
            let page_offset = self.vaddr.page_offset();
            return Some(WalkOutcome::Mapped(PhysAddr((ppn << 12) | page_offset)));
        }
        self.levels_remaining -= 1;
        None
    }

    #[must_use]
    pub fn to_trap(self, outcome: WalkOutcome) -> Option<Trap> {
        match outcome {
            WalkOutcome::Mapped(_) => None,
            WalkOutcome::NotPresent => Some(Trap::PageFault {
                addr: self.vaddr,
                is_write: self.is_write,
            }),
        }
    }
}

/// Data and instruction TLBs plus the walk-depth the walker counts down from.
pub struct Mmu {
    pub dtlb: Tlb,
    pub itlb: Tlb,
    pub walk_levels: u8,
}

impl Mmu {
    #[must_use]
    pub fn new(cfg: &MmuConfig) -> Self {
        Self {
            dtlb: Tlb::new(cfg.dtlb_size),
            itlb: Tlb::new(cfg.itlb_size),
            walk_levels: cfg.walk_levels,
        }
    }

    /// Probe the data TLB; `None` means a walk must be started.
    #[must_use]
    pub fn probe_data(&self, vaddr: VirtAddr) -> Option<(PhysAddr, bool, bool)> {
        let vpn = vaddr.page().val();
        let (ppn, _r, w, _x, u) = self.dtlb.lookup(vpn)?;
        let page_offset = vaddr.page_offset();
        Some((PhysAddr((ppn << 12) | page_offset), w, u))
    }

    /// Probe the instruction TLB; `None` means a walk must be started.
    #[must_use]
    pub fn probe_insn(&self, vaddr: VirtAddr) -> Option<PhysAddr> {
        let vpn = vaddr.page().val();
        let (ppn, _r, _w, x, _u) = self.itlb.lookup(vpn)?;
        if !x {
            return None;
        }
        let page_offset = vaddr.page_offset();
        Some(PhysAddr((ppn << 12) | page_offset))
    }

    #[must_use]
    pub fn start_data_walk(&self, vaddr: VirtAddr, is_write: bool) -> PageWalker {
        PageWalker::new(vaddr, is_write, false, self.walk_levels)
    }

    #[must_use]
    pub fn start_insn_walk(&self, vaddr: VirtAddr) -> PageWalker {
        PageWalker::new(vaddr, false, true, self.walk_levels)
    }

    pub fn insert_data(&mut self, vaddr: VirtAddr, ppn: u64, pte: u64) {
        self.dtlb.insert(vaddr.page().val(), ppn, pte);
    }

    pub fn insert_insn(&mut self, vaddr: VirtAddr, ppn: u64, pte: u64) {
        self.itlb.insert(vaddr.page().val(), ppn, pte);
    }

    pub fn flush(&mut self) {
        self.dtlb.flush();
        self.itlb.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_reaching_level_zero_maps_address() {
        let mut walker = PageWalker::new(VirtAddr(0x4000), false, false, 2);
        assert_eq!(walker.advance(true, 0), None);
        assert_eq!(walker.advance(true, 0), None);
        match walker.advance(true, 7) {
            Some(WalkOutcome::Mapped(paddr)) => assert_eq!(paddr.0, (7 << 12)),
            other => panic!("expected mapped outcome, got {other:?}"),
        }
    }

    #[test]
    fn walk_hitting_absent_entry_faults() {
        let mut walker = PageWalker::new(VirtAddr(0x4000), true, false, 1);
        let outcome = walker.advance(false, 0).unwrap();
        assert_eq!(outcome, WalkOutcome::NotPresent);
        assert!(matches!(walker.to_trap(outcome), Some(Trap::PageFault { is_write: true, .. })));
    }

    #[test]
    fn tlb_insert_then_probe_roundtrips() {
        let mut mmu = Mmu::new(&MmuConfig::default());
        mmu.insert_data(VirtAddr(0x1000), 3, 0b0110);
        let (paddr, writable, _user) = mmu.probe_data(VirtAddr(0x1000)).unwrap();
        assert_eq!(paddr.0, 3 << 12);
        assert!(writable);
    }
}
