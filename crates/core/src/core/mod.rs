//! Core processor implementation.
//!
//! Contains the shared in-flight bookkeeping (ROB, LSQ, physical registers,
//! issue queue, state lists), the memory-side units (cache, MMU), the
//! external-collaborator traits (`Context`, `MemoryHierarchy`,
//! `BranchPredictor`), and the two pipeline backends built on top of them.

/// Atom (in-order) pipeline backend.
pub mod atom;

/// Branch prediction interface and a static stand-in implementation.
pub mod branch_predictor;

/// Host architectural-state collaborator.
pub mod context;

/// Load-store aliasing, TLB miss, and cache-miss memory-hierarchy collaborator.
pub mod memory_hierarchy;

/// Tag-broadcast-wakeup issue queue used by the out-of-order backend.
pub mod issuequeue;

/// Out-of-order pipeline backend.
pub mod ooo;

/// Per-thread/core/machine driver tying the frontend and a backend together.
pub mod machine;

/// Shared pipeline bookkeeping (ROB, LSQ).
pub mod pipeline;

/// Renamed physical-register file and speculative/committed rename tables.
pub mod physreg;

/// Intrusive-style state lists built on an arena of cells.
pub mod statelist;

/// Execution units (cache hierarchy, MMU/TLB).
pub mod units;
