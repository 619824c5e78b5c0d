//! x86 decoder and basic-block cache.
//!
//! Decoded instructions are represented as [`TransOp`] micro-ops, grouped
//! into [`BasicBlock`]s keyed by [`RipVirtPhys`](crate::common::RipVirtPhys)
//! identity and cached in a [`BasicBlockCache`].

/// Assist-id tables (microcode and light assists).
pub mod assists;
/// The basic-block container.
pub mod basicblock;
/// The basic-block cache: SMC invalidation and reclaim.
pub mod bbcache;
/// The decoder: fast/complex/sse/x87 dispatch over a byte stream.
pub mod decode;
/// The `TransOp` micro-op representation.
pub mod transop;

pub use basicblock::{BasicBlock, BranchType};
pub use bbcache::BasicBlockCache;
pub use transop::{Opcode, TransOp};
