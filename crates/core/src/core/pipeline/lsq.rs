//! Load/Store Queue (LSQ): unified in-flight tracking for loads and stores.
//!
//! Grounded in the teacher's store-buffer FIFO (allocate/resolve/drain/
//! flush_after), generalized to also hold loads so it can do store-to-load
//! forwarding and alias detection in one structure, per spec §4.2/§4.6:
//! stores issue in two phases (address-ready, then data-ready), a store's
//! commit drains it to memory one per cycle, and a load that aliases a
//! not-yet-resolved store is replayed via the LSAP predictor (§4.6).

use crate::core::pipeline::rob::RobTag;
use crate::isa::transop::SizeShift;

/// Result of a load probing the LSQ for a forwarding store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardResult {
    /// A store fully covers the load — use the forwarded data.
    Hit(u64),
    /// No overlap with any pending store — safe to read from the cache.
    Miss,
    /// Partial overlap, or an unresolved store the LSAP predicts may alias —
    /// must stall/replay until the store resolves.
    Stall,
}

/// Lifecycle state of an LSQ entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LsqState {
    /// Allocated, address not yet generated.
    #[default]
    Pending,
    /// Phase 1 complete: address known (store) or data received (load).
    AddressValid,
    /// Phase 2 complete (stores only): data known, ready for ROB commit.
    DataValid,
    /// The ROB has committed this store; it can drain to memory.
    Committed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LsqKind {
    Load,
    Store,
}

/// A single in-flight load or store.
#[derive(Clone, Debug)]
pub struct LsqEntry {
    pub rob_tag: RobTag,
    pub kind: LsqKind,
    pub vaddr: u64,
    pub paddr: Option<u64>,
    pub data: u64,
    pub size: SizeShift,
    pub state: LsqState,
    pub valid: bool,
}

impl Default for LsqEntry {
    fn default() -> Self {
        Self {
            rob_tag: RobTag::default(),
            kind: LsqKind::Load,
            vaddr: 0,
            paddr: None,
            data: 0,
            size: SizeShift::QWORD,
            state: LsqState::Pending,
            valid: false,
        }
    }
}

/// Load-Store Alias Predictor: a small direct-mapped table keyed by the
/// issuing RIP, recording whether a load at that RIP has aliased a store
/// before. A load whose predictor bit is set is held until every older
/// store's address is known, rather than speculating past it (spec §4.6).
pub struct Lsap {
    table: Vec<bool>,
    mask: usize,
}

impl Lsap {
    #[must_use]
    pub fn new(entries: usize) -> Self {
        let size = entries.max(1).next_power_of_two();
        Self {
            table: vec![false; size],
            mask: size - 1,
        }
    }

    #[must_use]
    pub fn predicts_alias(&self, rip: u64) -> bool {
        self.table[(rip as usize) & self.mask]
    }

    pub fn record_alias(&mut self, rip: u64) {
        self.table[(rip as usize) & self.mask] = true;
    }
}

/// FIFO queue of in-flight loads and stores, ordered by program order.
pub struct Lsq {
    entries: Vec<LsqEntry>,
    head: usize,
    tail: usize,
    count: usize,
}

impl Lsq {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, LsqEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    pub fn allocate(&mut self, rob_tag: RobTag, kind: LsqKind, size: SizeShift) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries[self.tail] = LsqEntry {
            rob_tag,
            kind,
            size,
            valid: true,
            ..LsqEntry::default()
        };
        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        true
    }

    /// Phase 1: address generated (both loads and stores pass through here).
    pub fn resolve_address(&mut self, rob_tag: RobTag, vaddr: u64, paddr: u64) {
        if let Some(entry) = self.find_mut(rob_tag) {
            entry.vaddr = vaddr;
            entry.paddr = Some(paddr);
            entry.state = LsqState::AddressValid;
        }
    }

    /// Phase 2 (stores only): byte-mask and data resolved after redispatch.
    pub fn resolve_data(&mut self, rob_tag: RobTag, data: u64) {
        if let Some(entry) = self.find_mut(rob_tag) {
            entry.data = data;
            entry.state = LsqState::DataValid;
        }
    }

    pub fn mark_committed(&mut self, rob_tag: RobTag) {
        if let Some(entry) = self.find_mut(rob_tag)
            && entry.state == LsqState::DataValid
        {
            entry.state = LsqState::Committed;
        }
    }

    /// Probes every store older than `before` for an overlapping address.
    /// `before` should be the requesting load's own ROB tag so only
    /// program-order-older stores are considered. `load_rip` is consulted
    /// against `lsap`: an unresolved older store only blocks the load if
    /// its RIP has aliased a store before (spec §4.5 "otherwise the load
    /// is permitted to issue speculatively"); otherwise the load speculates
    /// straight past it.
    #[must_use]
    pub fn forward_load(
        &self,
        before: RobTag,
        load_rip: u64,
        paddr: u64,
        size: SizeShift,
        lsap: &Lsap,
    ) -> ForwardResult {
        let load_size = u64::from(size.bytes());
        let load_start = paddr;
        let load_end = paddr + load_size;

        let mut idx = if self.tail == 0 {
            self.entries.len() - 1
        } else {
            self.tail - 1
        };

        for _ in 0..self.count {
            let entry = &self.entries[idx];
            if entry.valid
                && entry.kind == LsqKind::Store
                && entry.rob_tag.0 < before.0
                && let Some(store_paddr) = entry.paddr
            {
                let store_size = u64::from(entry.size.bytes());
                let store_start = store_paddr;
                let store_end = store_paddr + store_size;

                if load_start < store_end && load_end > store_start {
                    if store_start <= load_start && store_end >= load_end {
                        let offset = (load_start - store_start) * 8;
                        let shifted = entry.data >> offset;
                        let mask = if load_size >= 8 {
                            u64::MAX
                        } else {
                            (1u64 << (load_size * 8)) - 1
                        };
                        return ForwardResult::Hit(shifted & mask);
                    }
                    return ForwardResult::Stall;
                }
            } else if entry.valid
                && entry.kind == LsqKind::Store
                && entry.paddr.is_none()
                && lsap.predicts_alias(load_rip)
            {
                // Address not yet known, and this RIP has aliased before:
                // wait rather than risk another misspeculation.
                return ForwardResult::Stall;
            }
            if idx == 0 {
                idx = self.entries.len() - 1;
            } else {
                idx -= 1;
            }
        }

        ForwardResult::Miss
    }

    /// When a store's address resolves, scans forward (younger entries) for
    /// an already-issued load to an overlapping address — one that
    /// speculated past this store while its address was still unknown and
    /// may have read stale data (spec §4.5 "store → earlier-load
    /// aliasing"). Returns the oldest such load's ROB tag, if any.
    #[must_use]
    pub fn find_aliasing_load(&self, after: RobTag, paddr: u64, size: SizeShift) -> Option<RobTag> {
        let store_size = u64::from(size.bytes());
        let store_start = paddr;
        let store_end = paddr + store_size;

        let mut idx = self.head;
        for _ in 0..self.count {
            let entry = &self.entries[idx];
            if entry.valid
                && entry.kind == LsqKind::Load
                && entry.rob_tag.0 > after.0
                && let Some(load_paddr) = entry.paddr
            {
                let load_size = u64::from(entry.size.bytes());
                let load_start = load_paddr;
                let load_end = load_paddr + load_size;
                if load_start < store_end && load_end > store_start {
                    return Some(entry.rob_tag);
                }
            }
            idx = (idx + 1) % self.entries.len();
        }
        None
    }

    /// Drains the oldest committed store, if the head entry is one.
    pub fn drain_one(&mut self) -> Option<LsqEntry> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[self.head];
        if !entry.valid || entry.kind != LsqKind::Store || entry.state != LsqState::Committed {
            return None;
        }
        let drained = self.entries[self.head].clone();
        self.entries[self.head].valid = false;
        self.head = (self.head + 1) % self.entries.len();
        self.count -= 1;
        Some(drained)
    }

    /// Removes a completed load from the head once its consumer has read it.
    pub fn retire_load(&mut self, rob_tag: RobTag) {
        if self.count > 0 {
            let entry = &self.entries[self.head];
            if entry.valid && entry.kind == LsqKind::Load && entry.rob_tag == rob_tag {
                self.entries[self.head].valid = false;
                self.head = (self.head + 1) % self.entries.len();
                self.count -= 1;
            }
        }
    }

    pub fn flush_after(&mut self, keep_tag: RobTag) {
        if self.count == 0 {
            return;
        }
        let cap = self.entries.len();
        let mut new_tail = self.head;
        let mut new_count = 0;
        let mut idx = self.head;

        for _ in 0..self.count {
            let entry = &self.entries[idx];
            if entry.valid && entry.rob_tag.0 <= keep_tag.0 {
                if idx != new_tail {
                    self.entries[new_tail] = self.entries[idx].clone();
                    self.entries[idx].valid = false;
                }
                new_tail = (new_tail + 1) % cap;
                new_count += 1;
            } else {
                self.entries[idx].valid = false;
            }
            idx = (idx + 1) % cap;
        }

        self.tail = new_tail;
        self.count = new_count;
    }

    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    fn find_mut(&mut self, rob_tag: RobTag) -> Option<&mut LsqEntry> {
        let cap = self.entries.len();
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid && self.entries[idx].rob_tag == rob_tag {
                return Some(&mut self.entries[idx]);
            }
            idx = (idx + 1) % cap;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_drains_only_after_commit() {
        let mut lsq = Lsq::new(4);
        let tag = RobTag(1);
        assert!(lsq.allocate(tag, LsqKind::Store, SizeShift::DWORD));
        assert!(lsq.drain_one().is_none());

        lsq.resolve_address(tag, 0x1000, 0x8000_0000);
        lsq.resolve_data(tag, 0xDEAD_BEEF);
        assert!(lsq.drain_one().is_none());

        lsq.mark_committed(tag);
        let entry = lsq.drain_one().unwrap();
        assert_eq!(entry.paddr, Some(0x8000_0000));
        assert_eq!(entry.data, 0xDEAD_BEEF);
    }

    #[test]
    fn load_forwards_from_older_resolved_store() {
        let mut lsq = Lsq::new(4);
        let lsap = Lsap::new(16);
        let store_tag = RobTag(1);
        lsq.allocate(store_tag, LsqKind::Store, SizeShift::DWORD);
        lsq.resolve_address(store_tag, 0x1000, 0x8000_0000);
        lsq.resolve_data(store_tag, 0x1234_5678);

        let load_tag = RobTag(2);
        let result = lsq.forward_load(load_tag, 0x2000, 0x8000_0000, SizeShift::DWORD, &lsap);
        assert_eq!(result, ForwardResult::Hit(0x1234_5678));
    }

    #[test]
    fn load_misses_when_no_store_overlaps() {
        let mut lsq = Lsq::new(4);
        let lsap = Lsap::new(16);
        let store_tag = RobTag(1);
        lsq.allocate(store_tag, LsqKind::Store, SizeShift::DWORD);
        lsq.resolve_address(store_tag, 0x1000, 0x8000_0000);
        lsq.resolve_data(store_tag, 1);

        let load_tag = RobTag(2);
        let result = lsq.forward_load(load_tag, 0x2000, 0x9000_0000, SizeShift::DWORD, &lsap);
        assert_eq!(result, ForwardResult::Miss);
    }

    #[test]
    fn load_speculates_past_unresolved_older_store_by_default() {
        let mut lsq = Lsq::new(4);
        let lsap = Lsap::new(16);
        let store_tag = RobTag(1);
        lsq.allocate(store_tag, LsqKind::Store, SizeShift::DWORD);

        let load_tag = RobTag(2);
        let result = lsq.forward_load(load_tag, 0x2000, 0x9000_0000, SizeShift::DWORD, &lsap);
        assert_eq!(result, ForwardResult::Miss);
    }

    #[test]
    fn load_stalls_on_unresolved_older_store_when_lsap_predicts_alias() {
        let mut lsq = Lsq::new(4);
        let mut lsap = Lsap::new(16);
        let load_rip = 0x2000;
        lsap.record_alias(load_rip);

        let store_tag = RobTag(1);
        lsq.allocate(store_tag, LsqKind::Store, SizeShift::DWORD);

        let load_tag = RobTag(2);
        let result = lsq.forward_load(load_tag, load_rip, 0x9000_0000, SizeShift::DWORD, &lsap);
        assert_eq!(result, ForwardResult::Stall);
    }

    #[test]
    fn lsap_records_and_predicts_alias() {
        let mut lsap = Lsap::new(16);
        assert!(!lsap.predicts_alias(0x1000));
        lsap.record_alias(0x1000);
        assert!(lsap.predicts_alias(0x1000));
    }

    #[test]
    fn find_aliasing_load_detects_younger_overlapping_load() {
        // The load speculates past the store while its address is still
        // unknown (lsap is empty), then the store resolves to the same
        // address the load already read from: a misspeculation the store
        // must detect and recover from.
        let mut lsq = Lsq::new(4);
        let lsap = Lsap::new(16);
        let store_tag = RobTag(1);
        let load_tag = RobTag(2);

        lsq.allocate(store_tag, LsqKind::Store, SizeShift::DWORD);
        lsq.allocate(load_tag, LsqKind::Load, SizeShift::DWORD);
        lsq.resolve_address(load_tag, 0x3000, 0x8000_0000);
        assert_eq!(
            lsq.forward_load(load_tag, 0x4000, 0x8000_0000, SizeShift::DWORD, &lsap),
            ForwardResult::Miss
        );

        assert_eq!(
            lsq.find_aliasing_load(store_tag, 0x8000_0000, SizeShift::DWORD),
            Some(load_tag)
        );
    }

    #[test]
    fn flush_after_keeps_only_older_entries() {
        let mut lsq = Lsq::new(4);
        let t1 = RobTag(1);
        let t2 = RobTag(2);
        lsq.allocate(t1, LsqKind::Store, SizeShift::DWORD);
        lsq.allocate(t2, LsqKind::Store, SizeShift::DWORD);
        lsq.flush_after(t1);
        assert_eq!(lsq.len(), 1);
    }
}
