//! Architectural fault taxonomy and translation results.
//!
//! `Trap` covers every condition that is visible to the host [`Context`](crate::core::context::Context)
//! — decoder-detected faults and memory faults, surfaced in program order at
//! commit. `ReplayReason` is a disjoint, non-`Error` type for purely internal
//! pipeline conditions (replay, refetch, speculative skip) that never reach
//! the host; keeping them separate preserves the "architectural vs replay"
//! distinction the error-handling design calls for.

use super::addr::{PhysAddr, VirtAddr};

/// Architectural faults and assists, reported to the host `Context` at commit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    /// The decoder could not map a byte sequence to any known opcode.
    #[error("invalid opcode at {0:?}")]
    InvalidOpcode(VirtAddr),

    /// A privileged or malformed instruction violated protection rules.
    #[error("general protection fault at {0:?}")]
    GeneralProtection(VirtAddr),

    /// Instruction fetch faulted while walking the page table.
    #[error("execution page fault at {0:?}")]
    ExecPageFault(VirtAddr),

    /// A load or store faulted while walking the page table.
    #[error("page fault at {addr:?} (write={is_write})")]
    PageFault { addr: VirtAddr, is_write: bool },

    /// A memory access was not naturally aligned where alignment is required.
    #[error("alignment check fault at {0:?}")]
    AlignmentCheck(VirtAddr),

    /// A software or hardware breakpoint was hit.
    #[error("breakpoint at {0:?}")]
    Breakpoint(VirtAddr),

    /// A microcode assist (syscall, cpuid, wrmsr, ...) is pending at commit.
    #[error("assist {0:?} pending")]
    Assist(AssistId),

    /// A fault occurred while the processor was already handling a fault.
    #[error("double fault at {0:?}")]
    DoubleFault(VirtAddr),
}

/// Numeric identity of a microcode assist, dispatched atomically at commit.
///
/// The handler bodies live in the host `Context`/assist library (out of
/// scope, §6); the pipeline only needs a stable id to select and to decide
/// whether the assist requires a pipeline flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AssistId {
    Cpuid,
    Rdtsc,
    Syscall,
    Sysret,
    Iret,
    WriteCr0,
    WriteCr2,
    WriteCr3,
    WriteCr4,
    Wrmsr,
    Rdmsr,
    LongJump,
    InvalidatePage,
    LoadSegmentTable,
    LoadTaskRegister,
    Halt,
    PushFlags,
    PopFlags,
    IoPortIn,
    IoPortOut,
    FxSave,
    FxRestore,
    LoadMxcsr,
    X87Fpu,
}

impl AssistId {
    /// Whether this assist unconditionally requires a pipeline flush once committed.
    #[must_use]
    pub fn flushes(self) -> bool {
        !matches!(
            self,
            AssistId::Cpuid
                | AssistId::Rdtsc
                | AssistId::PushFlags
                | AssistId::PopFlags
                | AssistId::IoPortIn
                | AssistId::IoPortOut
        )
    }
}

/// A "light assist": handled inline at execute, never causes a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum LightAssistId {
    SetInterruptFlag,
    ClearInterruptFlag,
    PushFlags,
    PopFlags,
    IoPortIn,
    IoPortOut,
    Pause,
    Popcnt,
    X87Fist,
}

/// Internal, non-architectural condition requiring the issue queue or
/// pipeline to retry a uop. Never surfaced to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayReason {
    /// A resource (FU, cache port, lock) was unavailable; retry next cycle.
    NeedsReplay,
    /// A mis-speculation was detected that requires refetching from a RIP.
    NeedsRefetch,
    /// A load-store alias was detected after the fact; redispatch required.
    LoadStoreAlias,
    /// A speculative check failed benignly; skip to the recovery RIP.
    Skipped,
    /// Waiting on a foreign cache-line lock; move to the back of the queue.
    ReplayLocked,
}

/// Outcome of a virtual-to-physical address translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationResult {
    /// The translated physical address, meaningless if `trap` is `Some`.
    pub paddr: PhysAddr,
    /// Cycles consumed walking the page table (0 on a TLB hit).
    pub cycles: u64,
    /// Fault encountered during translation, if any.
    pub trap: Option<Trap>,
}

impl TranslationResult {
    #[inline]
    #[must_use]
    pub fn success(paddr: PhysAddr, cycles: u64) -> Self {
        Self {
            paddr,
            cycles,
            trap: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn fault(trap: Trap, cycles: u64) -> Self {
        Self {
            paddr: PhysAddr(0),
            cycles,
            trap: Some(trap),
        }
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.trap.is_some()
    }
}
