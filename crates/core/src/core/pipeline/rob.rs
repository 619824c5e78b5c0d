//! Reorder Buffer (ROB) for out-of-order commit.
//!
//! A circular buffer tracking in-flight micro-ops from dispatch through
//! commit: allocation assigns a tag, completion marks a result ready,
//! in-order commit retires from the head, and `flush_after` squashes
//! everything dispatched after a mispredicted branch (spec §4.2/§4.7).

use crate::common::error::Trap;
use crate::isa::transop::TransOp;

/// Unique tag identifying an in-flight micro-op in the ROB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct RobTag(pub u32);

/// Lifecycle state of a ROB entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RobState {
    /// Entry allocated, waiting on the issue queue to select it.
    #[default]
    Dispatched,
    /// Selected for issue; executing or waiting on a TLB walk/cache miss.
    Issued,
    /// Execution complete, result available, waiting to commit.
    Completed,
    /// Physreg is marked invalid (a fault); delivered in program order.
    ReadyToCommit,
}

/// One in-flight micro-op: the decoded `TransOp`, its renamed operand and
/// destination physical registers, and bookkeeping for in-flight TLB walks
/// and cache misses (spec §4.2 "ReorderBufferEntry").
#[derive(Clone, Debug)]
pub struct RobEntry {
    pub tag: RobTag,
    pub uop: TransOp,
    /// Renamed source physical-register ids (rs.0/rs.1/rs.2 in spec terms).
    pub src_physregs: [Option<u32>; 3],
    /// Renamed destination physical-register id, `None` for uops with no result.
    pub dest_physreg: Option<u32>,
    /// Issue-queue slot this entry currently occupies, if dispatched.
    pub issue_queue_slot: Option<u32>,
    /// Functional-unit cluster this entry issued to.
    pub cluster_id: Option<u8>,
    /// LSQ entry id, for loads and stores.
    pub lsq_entry: Option<u32>,
    /// Cycles remaining before the functional unit produces a result.
    pub cycles_left: u32,
    /// Set while this entry is on the TLB-miss list, walking a page table.
    pub tlb_walk_level: Option<u8>,
    pub state: RobState,
    /// Fault surfaced at commit, if the physreg was marked invalid.
    pub trap: Option<Trap>,
    /// Held a cache-line lock for a locked RMW (spec §4.5); must release at commit.
    pub lock_acquired: bool,
    pub valid: bool,
}

impl Default for RobEntry {
    fn default() -> Self {
        Self {
            tag: RobTag::default(),
            uop: TransOp::new(crate::isa::transop::Opcode::Nop, 0),
            src_physregs: [None; 3],
            dest_physreg: None,
            issue_queue_slot: None,
            cluster_id: None,
            lsq_entry: None,
            cycles_left: 0,
            tlb_walk_level: None,
            state: RobState::Dispatched,
            trap: None,
            lock_acquired: false,
            valid: false,
        }
    }
}

/// Reorder Buffer — circular buffer for in-order commit.
pub struct Rob {
    entries: Vec<RobEntry>,
    head: usize,
    tail: usize,
    count: usize,
    next_tag: u32,
}

impl Rob {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, RobEntry::default);
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
            next_tag: 1,
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

    #[inline]
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.entries.len() - self.count
    }

    /// Allocates a new ROB entry for a dispatched uop. Returns `None` if full.
    pub fn allocate(
        &mut self,
        uop: TransOp,
        src_physregs: [Option<u32>; 3],
        dest_physreg: Option<u32>,
    ) -> Option<RobTag> {
        if self.is_full() {
            return None;
        }

        let tag = RobTag(self.next_tag);
        self.next_tag = self.next_tag.wrapping_add(1);
        if self.next_tag == 0 {
            self.next_tag = 1;
        }

        self.entries[self.tail] = RobEntry {
            tag,
            uop,
            src_physregs,
            dest_physreg,
            valid: true,
            ..RobEntry::default()
        };

        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        Some(tag)
    }

    pub fn mark_issued(&mut self, tag: RobTag, cluster_id: u8, cycles_left: u32) {
        if let Some(entry) = self.find_entry_mut(tag) {
            entry.state = RobState::Issued;
            entry.cluster_id = Some(cluster_id);
            entry.cycles_left = cycles_left;
        }
    }

    pub fn complete(&mut self, tag: RobTag) {
        if let Some(entry) = self.find_entry_mut(tag) {
            entry.state = RobState::Completed;
        }
    }

    /// Marks an entry's physreg invalid: a fault delivered in program order
    /// (spec §7, "memory faults ... force-committed so the fault surfaces
    /// in program order").
    pub fn fault(&mut self, tag: RobTag, trap: Trap) {
        if let Some(entry) = self.find_entry_mut(tag) {
            entry.state = RobState::ReadyToCommit;
            entry.trap = Some(trap);
        }
    }

    pub fn peek_head(&self) -> Option<&RobEntry> {
        if self.count == 0 {
            None
        } else {
            Some(&self.entries[self.head])
        }
    }

    /// Commits the head entry if it is `Completed` or `ReadyToCommit`.
    pub fn commit_head(&mut self) -> Option<RobEntry> {
        if self.count == 0 {
            return None;
        }

        let entry = &self.entries[self.head];
        if matches!(entry.state, RobState::Dispatched | RobState::Issued) {
            return None;
        }

        let committed = self.entries[self.head].clone();
        self.entries[self.head].valid = false;
        self.head = (self.head + 1) % self.entries.len();
        self.count -= 1;
        Some(committed)
    }

    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Squashes every entry dispatched after `tag` (exclusive); `tag` itself
    /// is kept. Used on branch mispredict / annul (spec §4.7).
    pub fn flush_after(&mut self, tag: RobTag) {
        if self.count == 0 {
            return;
        }

        let mut idx = self.head;
        let mut found = false;
        for _ in 0..self.count {
            if self.entries[idx].tag == tag {
                found = true;
                break;
            }
            idx = (idx + 1) % self.entries.len();
        }

        if !found {
            return;
        }

        let keep_idx = (idx + 1) % self.entries.len();
        let mut remove_idx = keep_idx;
        while remove_idx != self.tail {
            self.entries[remove_idx].valid = false;
            remove_idx = (remove_idx + 1) % self.entries.len();
        }

        self.tail = keep_idx;
        self.count = 0;
        let mut i = self.head;
        while i != self.tail {
            if self.entries[i].valid {
                self.count += 1;
            }
            i = (i + 1) % self.entries.len();
        }
    }

    fn find_entry_mut(&mut self, tag: RobTag) -> Option<&mut RobEntry> {
        if self.count == 0 {
            return None;
        }
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid && self.entries[idx].tag == tag {
                return Some(&mut self.entries[idx]);
            }
            idx = (idx + 1) % self.entries.len();
        }
        None
    }

    #[must_use]
    pub fn find_entry(&self, tag: RobTag) -> Option<&RobEntry> {
        if self.count == 0 {
            return None;
        }
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid && self.entries[idx].tag == tag {
                return Some(&self.entries[idx]);
            }
            idx = (idx + 1) % self.entries.len();
        }
        None
    }

    pub fn for_each_valid(&self, mut f: impl FnMut(&RobEntry)) {
        if self.count == 0 {
            return;
        }
        let mut idx = self.head;
        for _ in 0..self.count {
            if self.entries[idx].valid {
                f(&self.entries[idx]);
            }
            idx = (idx + 1) % self.entries.len();
        }
    }

    /// Decrements `cycles_left` for every `Issued` entry, transitioning any
    /// that reach zero to `Completed`. Returns the tags that completed this
    /// cycle (spec §4.4 "result arrives now on hit or later via cache
    /// wakeup" — the wakeup is modeled as this countdown).
    pub fn tick(&mut self) -> Vec<RobTag> {
        let mut completed = Vec::new();
        if self.count == 0 {
            return completed;
        }
        let mut idx = self.head;
        for _ in 0..self.count {
            let entry = &mut self.entries[idx];
            if entry.valid && entry.state == RobState::Issued {
                if entry.cycles_left > 0 {
                    entry.cycles_left -= 1;
                }
                if entry.cycles_left == 0 {
                    entry.state = RobState::Completed;
                    completed.push(entry.tag);
                }
            }
            idx = (idx + 1) % self.entries.len();
        }
        completed
    }

    /// Resets every entry from `tag` (inclusive) to the tail back to
    /// `Dispatched`, for redispatch of a tainted dependency chain (spec §4.7
    /// "Redispatch of dependents"). Returns the tags reset, in program order.
    pub fn redispatch_from(&mut self, tag: RobTag) -> Vec<RobTag> {
        let mut reset = Vec::new();
        if self.count == 0 {
            return reset;
        }
        let mut idx = self.head;
        let mut found = false;
        for _ in 0..self.count {
            if self.entries[idx].valid && self.entries[idx].tag == tag {
                found = true;
            }
            if found {
                let entry = &mut self.entries[idx];
                entry.state = RobState::Dispatched;
                entry.issue_queue_slot = None;
                entry.cycles_left = 0;
                reset.push(entry.tag);
            }
            idx = (idx + 1) % self.entries.len();
        }
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::transop::Opcode;

    fn uop() -> TransOp {
        TransOp::new(Opcode::Add, 0x1000)
    }

    #[test]
    fn allocate_and_commit_roundtrips() {
        let mut rob = Rob::new(4);
        assert!(rob.is_empty());
        let tag = rob.allocate(uop(), [None; 3], Some(3)).unwrap();
        assert_eq!(rob.len(), 1);
        assert!(rob.commit_head().is_none());
        rob.complete(tag);
        let entry = rob.commit_head().unwrap();
        assert_eq!(entry.dest_physreg, Some(3));
        assert!(rob.is_empty());
    }

    #[test]
    fn full_rob_rejects_allocation() {
        let mut rob = Rob::new(2);
        rob.allocate(uop(), [None; 3], None).unwrap();
        rob.allocate(uop(), [None; 3], None).unwrap();
        assert!(rob.is_full());
        assert!(rob.allocate(uop(), [None; 3], None).is_none());
    }

    #[test]
    fn in_order_commit_blocks_on_older_entry() {
        let mut rob = Rob::new(4);
        let t1 = rob.allocate(uop(), [None; 3], None).unwrap();
        let t2 = rob.allocate(uop(), [None; 3], None).unwrap();
        rob.complete(t2);
        assert!(rob.commit_head().is_none());
        rob.complete(t1);
        assert!(rob.commit_head().is_some());
        assert!(rob.commit_head().is_some());
    }

    #[test]
    fn fault_is_delivered_in_program_order() {
        let mut rob = Rob::new(4);
        let t1 = rob.allocate(uop(), [None; 3], None).unwrap();
        rob.fault(t1, Trap::InvalidOpcode(crate::common::VirtAddr(0x1000)));
        let entry = rob.commit_head().unwrap();
        assert_eq!(entry.state, RobState::ReadyToCommit);
        assert!(entry.trap.is_some());
    }

    #[test]
    fn flush_after_squashes_younger_entries() {
        let mut rob = Rob::new(8);
        let t1 = rob.allocate(uop(), [None; 3], None).unwrap();
        rob.allocate(uop(), [None; 3], None).unwrap();
        rob.allocate(uop(), [None; 3], None).unwrap();
        assert_eq!(rob.len(), 3);
        rob.flush_after(t1);
        assert_eq!(rob.len(), 1);
    }

    #[test]
    fn circular_wraparound_preserves_order() {
        let mut rob = Rob::new(2);
        for i in 0..10u32 {
            let tag = rob.allocate(uop(), [None; 3], Some(i)).unwrap();
            rob.complete(tag);
            let entry = rob.commit_head().unwrap();
            assert_eq!(entry.dest_physreg, Some(i));
        }
    }
}
