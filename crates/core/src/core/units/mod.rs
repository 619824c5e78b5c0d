//! Execution units and functional components.
//!
//! This module contains the memory-side units shared by both pipeline
//! backends: the cache hierarchy and the TLB/page-walk machinery.

/// Cache hierarchy implementation (L1, L2, L3) with replacement policies.
pub mod cache;

/// Memory management unit: TLB and page-table walker.
pub mod mmu;
