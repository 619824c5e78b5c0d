//! `BasicBlockCache`: RIP-keyed block storage with SMC invalidation and reclaim.
//!
//! Grounded in the arena-of-cells pattern from `pipeline/rob.rs` (a `Vec`
//! indexed by a stable id, with auxiliary indexes into it), adapted here to
//! a RIP-keyed cache plus a page-frame reverse index for the SMC hot path
//! spec §4.1 calls for.

use std::collections::HashMap;

use crate::common::RipVirtPhys;
use crate::isa::basicblock::BasicBlock;

/// Why a basic block was invalidated, for stats/diagnostics (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationReason {
    SmcDirty,
    Reclaim,
    Spurious,
}

/// RIP-keyed cache of decoded basic blocks, with a page-frame reverse index
/// for self-modifying-code invalidation.
#[derive(Debug, Default)]
pub struct BasicBlockCache {
    blocks: HashMap<RipVirtPhys, BasicBlock>,
    /// page frame -> identities of every cached block that touches it.
    frame_index: HashMap<u64, Vec<RipVirtPhys>>,
    /// Blocks that were due for free but had a non-zero refcount; retried on
    /// the next invalidation pass touching the same frame.
    pending_free: Vec<RipVirtPhys>,
}

impl BasicBlockCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, identity: &RipVirtPhys) -> Option<&BasicBlock> {
        self.blocks.get(identity)
    }

    /// Inserts a freshly decoded block, indexing it by every frame it touches.
    pub fn insert(&mut self, block: BasicBlock) {
        let identity = block.identity;
        self.frame_index
            .entry(identity.frame)
            .or_default()
            .push(identity);
        if let Some(hi) = identity.frame_hi {
            self.frame_index.entry(hi).or_default().push(identity);
        }
        self.blocks.insert(identity, block);
    }

    /// A store touched `frame`: free every block that overlaps it, unless
    /// its refcount keeps it alive (in which case it is retried later).
    ///
    /// Returns the number of blocks actually freed.
    pub fn invalidate_page(&mut self, frame: u64) -> usize {
        let mut freed = 0;
        let Some(identities) = self.frame_index.remove(&frame) else {
            return 0;
        };
        for identity in identities {
            match self.blocks.get(&identity) {
                Some(b) if b.refcount > 0 => self.pending_free.push(identity),
                Some(_) => {
                    self.blocks.remove(&identity);
                    freed += 1;
                }
                None => {}
            }
        }
        freed
    }

    /// Classifies what an `invalidate_page(frame)` call is about to do,
    /// without mutating anything: `Spurious` when nothing cached touches
    /// `frame` (a data write, not SMC), `SmcDirty` otherwise.
    #[must_use]
    pub fn classify_invalidation(&self, frame: u64) -> InvalidationReason {
        if self.frame_index.contains_key(&frame) {
            InvalidationReason::SmcDirty
        } else {
            InvalidationReason::Spurious
        }
    }

    /// Retries freeing any block whose refcount dropped to zero since it was
    /// deferred by `invalidate_page`.
    pub fn retry_pending_frees(&mut self) -> usize {
        let mut still_pending = Vec::new();
        let mut freed = 0;
        for identity in self.pending_free.drain(..) {
            match self.blocks.get(&identity) {
                Some(b) if b.refcount == 0 => {
                    self.blocks.remove(&identity);
                    freed += 1;
                }
                Some(_) => still_pending.push(identity),
                None => {}
            }
        }
        self.pending_free = still_pending;
        freed
    }

    /// Single-pass LRU approximation (spec §4.1 "Reclaim"): evict every
    /// unreferenced block whose `lastused_cycle` is at or below the average
    /// across all cached blocks.
    pub fn reclaim(&mut self) -> usize {
        if self.blocks.is_empty() {
            return 0;
        }
        let total: u64 = self.blocks.values().map(|b| b.lastused_cycle).sum();
        let average = total / self.blocks.len() as u64;
        let victims: Vec<RipVirtPhys> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.refcount == 0 && b.lastused_cycle <= average)
            .map(|(id, _)| *id)
            .collect();
        for id in &victims {
            self.blocks.remove(id);
        }
        self.remove_dangling_frame_entries();
        victims.len()
    }

    fn remove_dangling_frame_entries(&mut self) {
        for ids in self.frame_index.values_mut() {
            ids.retain(|id| self.blocks.contains_key(id));
        }
        self.frame_index.retain(|_, ids| !ids.is_empty());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn touch(&mut self, identity: &RipVirtPhys, cycle: u64) {
        if let Some(b) = self.blocks.get_mut(identity) {
            b.lastused_cycle = cycle;
        }
    }

    /// Bumps the refcount of a cached block a fetch is about to dispatch
    /// from, keeping it alive against SMC invalidation while in flight.
    pub fn add_ref(&mut self, identity: &RipVirtPhys) {
        if let Some(b) = self.blocks.get_mut(identity) {
            b.add_ref();
        }
    }

    /// Drops the refcount a prior `add_ref` took, once the block has been
    /// fully dispatched. May make a pending SMC free eligible; the caller
    /// should follow up with `retry_pending_frees`.
    pub fn drop_ref(&mut self, identity: &RipVirtPhys) {
        if let Some(b) = self.blocks.get_mut(identity) {
            b.drop_ref();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Mode, PhysAddr, VirtAddr};
    use crate::isa::basicblock::BranchType;
    use crate::isa::transop::{Opcode, TransOp};

    fn id(rip: u64, frame: u64) -> RipVirtPhys {
        RipVirtPhys::new(VirtAddr(rip), PhysAddr(frame << 12), Mode::default())
    }

    fn block(identity: RipVirtPhys) -> BasicBlock {
        BasicBlock::new(
            identity,
            vec![TransOp::new(Opcode::Nop, identity.rip.val())],
            BranchType::Unconditional,
        )
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let mut cache = BasicBlockCache::new();
        let identity = id(0x1000, 1);
        cache.insert(block(identity));
        assert!(cache.lookup(&identity).is_some());
    }

    #[test]
    fn smc_invalidation_frees_unreferenced_block() {
        let mut cache = BasicBlockCache::new();
        let identity = id(0x1000, 1);
        cache.insert(block(identity));
        assert_eq!(cache.invalidate_page(1), 1);
        assert!(cache.lookup(&identity).is_none());
    }

    #[test]
    fn referenced_block_survives_invalidation_until_dropped() {
        let mut cache = BasicBlockCache::new();
        let identity = id(0x1000, 1);
        let mut b = block(identity);
        b.add_ref();
        cache.insert(b);
        assert_eq!(cache.invalidate_page(1), 0);
        assert!(cache.lookup(&identity).is_some());

        cache.blocks.get_mut(&identity).unwrap().drop_ref();
        assert_eq!(cache.retry_pending_frees(), 1);
        assert!(cache.lookup(&identity).is_none());
    }

    #[test]
    fn reclaim_evicts_only_below_average_lastused() {
        let mut cache = BasicBlockCache::new();
        let old = id(0x1000, 1);
        let new = id(0x2000, 2);
        let mut old_b = block(old);
        old_b.lastused_cycle = 0;
        let mut new_b = block(new);
        new_b.lastused_cycle = 100;
        cache.insert(old_b);
        cache.insert(new_b);
        let freed = cache.reclaim();
        assert_eq!(freed, 1);
        assert!(cache.lookup(&old).is_none());
        assert!(cache.lookup(&new).is_some());
    }

    #[test]
    fn cross_page_block_indexed_under_both_frames() {
        let mut cache = BasicBlockCache::new();
        let identity = id(0xfff, 1).with_high_frame(2);
        cache.insert(block(identity));
        assert_eq!(cache.invalidate_page(2), 1);
        assert!(cache.lookup(&identity).is_none());
    }
}
