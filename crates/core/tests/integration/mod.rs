//! End-to-end scenarios driving a full `Simulator` across both backends.

mod atom_arithmetic;
mod branch_recovery;
mod multicore;
mod ooo_arithmetic;
mod smc_invalidation;
