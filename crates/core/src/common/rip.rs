//! `RipVirtPhys`: the identity of a code location.
//!
//! Two code locations compare equal only when both their virtual and
//! physical halves match. That is the invariant that makes self-modifying
//! code safe: a write that changes the physical bytes underneath a virtual
//! address, without changing the virtual address itself, produces a new
//! `RipVirtPhys` the next time that page is translated, so a stale
//! [`BasicBlock`](crate::isa::basicblock::BasicBlock) can never be replayed
//! silently — the old entry is found only by frame-indexed invalidation.

use crate::common::addr::{PhysAddr, VirtAddr};

/// Execution-mode bits that participate in a basic block's identity: a
/// block decoded in 64-bit mode is never reused for the same bytes decoded
/// in 32-bit compatibility mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mode {
    pub long_mode: bool,
    pub kernel: bool,
    pub direction_flag: bool,
}

impl Default for Mode {
    fn default() -> Self {
        Self {
            long_mode: true,
            kernel: false,
            direction_flag: false,
        }
    }
}

/// Virtual RIP plus the physical frame(s) backing it plus mode bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RipVirtPhys {
    pub rip: VirtAddr,
    pub frame: u64,
    /// Second frame number, present only when the block's bytes cross a page
    /// boundary.
    pub frame_hi: Option<u64>,
    pub mode: Mode,
}

impl RipVirtPhys {
    #[must_use]
    pub fn new(rip: VirtAddr, phys: PhysAddr, mode: Mode) -> Self {
        Self {
            rip,
            frame: phys.frame(),
            frame_hi: None,
            mode,
        }
    }

    #[must_use]
    pub fn with_high_frame(mut self, frame_hi: u64) -> Self {
        self.frame_hi = Some(frame_hi);
        self
    }

    #[must_use]
    pub fn touches_frame(&self, frame: u64) -> bool {
        self.frame == frame || self.frame_hi == Some(frame)
    }
}
