//! Out-of-order issue queue: tag-broadcast wakeup over a fixed pool of slots.
//!
//! A single concrete type parameterized by plain `usize` capacity and
//! operand-count fields rather than const generics, so it stays a
//! non-generic type usable behind the same kind of dispatch the teacher
//! uses for `PipelineDispatch` (spec §9 "single concrete type with
//! size/operand-count in a header"). Each cycle, every waiting slot's
//! unready source operands are checked against the broadcast tag(s) from
//! registers that completed last cycle; when all three sources are ready
//! the slot is eligible for select (spec §4.3).

use crate::core::pipeline::rob::RobTag;
use crate::core::physreg::PhysRegId;

/// One waiting uop: its ROB tag, its (up to three) source physregs, and
/// which of them are still outstanding.
#[derive(Clone, Debug)]
struct Slot {
    rob_tag: RobTag,
    sources: [Option<PhysRegId>; 3],
    ready: [bool; 3],
    occupied: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            rob_tag: RobTag::default(),
            sources: [None; 3],
            ready: [true; 3],
            occupied: false,
        }
    }
}

/// Fixed-capacity issue queue with tag-broadcast wakeup.
pub struct IssueQueue {
    slots: Vec<Slot>,
    capacity: usize,
}

impl IssueQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupied).count()
    }

    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(|s| !s.occupied)
    }

    /// Dispatches a uop into a free slot. `sources[i].is_ready` is supplied
    /// by the caller (rename already knows whether each physreg's producer
    /// has written back).
    pub fn dispatch(
        &mut self,
        rob_tag: RobTag,
        sources: [Option<(PhysRegId, bool)>; 3],
    ) -> Option<usize> {
        let idx = self.slots.iter().position(|s| !s.occupied)?;
        let mut phys = [None; 3];
        let mut ready = [true; 3];
        for (i, src) in sources.into_iter().enumerate() {
            if let Some((reg, is_ready)) = src {
                phys[i] = Some(reg);
                ready[i] = is_ready;
            }
        }
        self.slots[idx] = Slot {
            rob_tag,
            sources: phys,
            ready,
            occupied: true,
        };
        Some(idx)
    }

    /// A physical register completed this cycle: wake any waiting source
    /// operand that matches it.
    pub fn wakeup(&mut self, physreg: PhysRegId) {
        for slot in &mut self.slots {
            if !slot.occupied {
                continue;
            }
            for i in 0..3 {
                if slot.sources[i] == Some(physreg) {
                    slot.ready[i] = true;
                }
            }
        }
    }

    /// Selects up to `width` ready slots for issue this cycle (oldest-first
    /// by slot index, a simple age proxy), removing them from the queue.
    pub fn select(&mut self, width: usize) -> Vec<RobTag> {
        let mut selected = Vec::with_capacity(width);
        for slot in &mut self.slots {
            if selected.len() >= width {
                break;
            }
            if slot.occupied && slot.ready.iter().all(|&r| r) {
                selected.push(slot.rob_tag);
                slot.occupied = false;
            }
        }
        selected
    }

    /// Removes every slot whose ROB tag is strictly newer than `keep_tag`
    /// (annul-on-mispredict, spec §4.7).
    pub fn flush_after(&mut self, keep_tag: RobTag) {
        for slot in &mut self.slots {
            if slot.occupied && slot.rob_tag.0 > keep_tag.0 {
                slot.occupied = false;
            }
        }
    }

    /// Removes every slot whose ROB tag is `from_tag` or newer, ahead of a
    /// redispatch re-insertion for the same tags (spec §4.7 "Redispatch of
    /// dependents").
    pub fn flush_from(&mut self, from_tag: RobTag) {
        for slot in &mut self.slots {
            if slot.occupied && slot.rob_tag.0 >= from_tag.0 {
                slot.occupied = false;
            }
        }
    }

    pub fn flush_all(&mut self) {
        for slot in &mut self.slots {
            slot.occupied = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_not_selected_until_all_sources_ready() {
        let mut iq = IssueQueue::new(4);
        let tag = RobTag(1);
        iq.dispatch(tag, [Some((5, false)), Some((6, true)), None]);
        assert!(iq.select(4).is_empty());
        iq.wakeup(5);
        assert_eq!(iq.select(4), vec![tag]);
    }

    #[test]
    fn select_respects_width() {
        let mut iq = IssueQueue::new(4);
        let t1 = RobTag(1);
        let t2 = RobTag(2);
        iq.dispatch(t1, [None, None, None]);
        iq.dispatch(t2, [None, None, None]);
        let selected = iq.select(1);
        assert_eq!(selected.len(), 1);
        assert_eq!(iq.occupied_count(), 1);
    }

    #[test]
    fn flush_after_removes_younger_slots() {
        let mut iq = IssueQueue::new(4);
        let t1 = RobTag(1);
        let t2 = RobTag(2);
        iq.dispatch(t1, [None, None, None]);
        iq.dispatch(t2, [None, None, None]);
        iq.flush_after(t1);
        assert_eq!(iq.occupied_count(), 1);
    }
}
