//! `MemoryHierarchy`: the cache/DRAM/interconnect collaborator (spec §6).
//!
//! Out of scope as a design target — caches, DRAM timing and the
//! interconnect are someone else's problem. The pipeline only needs: an
//! async request/wakeup protocol for loads, stores, and page-table-entry
//! fetches during a TLB walk; a cache-line lock table for locked RMW
//! (`probe_lock`/`grab_lock`/`invalidate_lock`, spec §4.5/§5 "shared
//! resources"); and a way to cancel an in-flight request when its ROB
//! entry is annulled so a late response can't resurrect stale state.
//!
//! `SimpleMemoryHierarchy` is a single-cycle-latency stand-in: every
//! request completes on the next `poll`, enough to drive the backends'
//! miss/wakeup paths in tests without modeling real cache timing.

use std::collections::VecDeque;

/// A pending request: loads/stores carry a physical address, PTE fetches
/// during a walk carry the walk's identity instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Load { paddr: u64 },
    Store { paddr: u64 },
    PageTableEntry { paddr: u64 },
}

/// A request's identity, used to cancel it on annul and to match a late
/// response back to its requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId {
    pub core: u8,
    pub thread: u8,
    pub rob_tag: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub id: RequestId,
    pub kind: RequestKind,
}

pub trait MemoryHierarchy {
    /// Issues an async request; completion arrives via a later `poll`.
    fn request(&mut self, id: RequestId, kind: RequestKind);

    /// Cancels a request for an annulled ROB entry (spec §9 "cancellation":
    /// "the memory hierarchy receives an explicit annul_request ... so late
    /// cache responses can be matched against current ROB UUIDs and ignored
    /// if stale").
    fn annul_request(&mut self, id: RequestId);

    /// Advances internal timing by one cycle and returns every request that
    /// completed this cycle.
    fn poll(&mut self) -> Vec<Completion>;

    /// Attempts to acquire the cache-line lock for a locked RMW. `holder`
    /// identifies the requesting core (spec: "the cpu_index as the holder
    /// identity").
    fn grab_lock(&mut self, line: u64, holder: u8) -> bool;

    fn probe_lock(&self, line: u64) -> Option<u8>;

    fn invalidate_lock(&mut self, line: u64, holder: u8);
}

struct InFlight {
    id: RequestId,
    kind: RequestKind,
    cycles_left: u32,
    cancelled: bool,
}

/// Fixed-latency stand-in: every request completes after `latency` cycles
/// unless cancelled first.
pub struct SimpleMemoryHierarchy {
    latency: u32,
    inflight: VecDeque<InFlight>,
    locks: std::collections::HashMap<u64, u8>,
}

impl SimpleMemoryHierarchy {
    #[must_use]
    pub fn new(latency: u32) -> Self {
        Self {
            latency: latency.max(1),
            inflight: VecDeque::new(),
            locks: std::collections::HashMap::new(),
        }
    }
}

impl MemoryHierarchy for SimpleMemoryHierarchy {
    fn request(&mut self, id: RequestId, kind: RequestKind) {
        self.inflight.push_back(InFlight {
            id,
            kind,
            cycles_left: self.latency,
            cancelled: false,
        });
    }

    fn annul_request(&mut self, id: RequestId) {
        for req in &mut self.inflight {
            if req.id == id {
                req.cancelled = true;
            }
        }
    }

    fn poll(&mut self) -> Vec<Completion> {
        let mut completed = Vec::new();
        for req in &mut self.inflight {
            if req.cycles_left > 0 {
                req.cycles_left -= 1;
            }
        }
        self.inflight.retain(|req| {
            if req.cycles_left == 0 {
                if !req.cancelled {
                    completed.push(Completion {
                        id: req.id,
                        kind: req.kind,
                    });
                }
                false
            } else {
                true
            }
        });
        completed
    }

    fn grab_lock(&mut self, line: u64, holder: u8) -> bool {
        match self.locks.get(&line) {
            Some(&h) if h != holder => false,
            _ => {
                self.locks.insert(line, holder);
                true
            }
        }
    }

    fn probe_lock(&self, line: u64) -> Option<u8> {
        self.locks.get(&line).copied()
    }

    fn invalidate_lock(&mut self, line: u64, holder: u8) {
        if self.locks.get(&line) == Some(&holder) {
            self.locks.remove(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: u32) -> RequestId {
        RequestId {
            core: 0,
            thread: 0,
            rob_tag: tag,
        }
    }

    #[test]
    fn request_completes_after_latency() {
        let mut mem = SimpleMemoryHierarchy::new(2);
        mem.request(id(1), RequestKind::Load { paddr: 0x1000 });
        assert!(mem.poll().is_empty());
        let completed = mem.poll();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, id(1));
    }

    #[test]
    fn annulled_request_never_completes() {
        let mut mem = SimpleMemoryHierarchy::new(1);
        mem.request(id(2), RequestKind::Load { paddr: 0x2000 });
        mem.annul_request(id(2));
        assert!(mem.poll().is_empty());
    }

    #[test]
    fn lock_is_exclusive_per_holder() {
        let mut mem = SimpleMemoryHierarchy::new(1);
        assert!(mem.grab_lock(64, 0));
        assert!(!mem.grab_lock(64, 1));
        mem.invalidate_lock(64, 0);
        assert!(mem.grab_lock(64, 1));
    }
}
