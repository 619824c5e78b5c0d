//! A store that overwrites the frame holding already-cached code,
//! triggering SMC invalidation of the basic block caching it (spec §4.1).
//!
//! Invalidation here is frame-granularity, not content-granularity, so the
//! store writes back the very same `OP_NOP` byte already there: the point
//! is to exercise cache invalidation, not to prove a data hazard.
//!
//! Layout (byte offsets):
//! ```text
//! 0:   branch ALWAYS -> 100
//! 10:  mov r0, 100              (address of the nop to "corrupt")
//! 20:  mov r1, 0                (byte value: still OP_NOP)
//! 30:  store [r0] <- r1, size 0
//! 34:  branch ALWAYS -> 100
//! 100: nop
//! 101: branch ALWAYS -> 10
//! ```
//! This loops indefinitely, so the test runs a fixed cycle budget instead
//! of a `run_until` halt condition.

use x86sim_core::config::Backend;

use crate::common::encode::{cond, Program, SIZE_BYTE};
use crate::common::harness::simulator_for;

#[test]
fn store_into_cached_code_page_invalidates_the_block() {
    let program = Program::new()
        .branch(cond::ALWAYS, 100) // rip 0 -> 100
        .mov_ri(0, 100)
        .mov_ri(1, 0)
        .store(0, 1, SIZE_BYTE)
        .branch(cond::ALWAYS, 66) // rip 34 -> 100
        .pad_to(100)
        .nop() // rip 100
        .branch(cond::ALWAYS, -91) // rip 101 -> 10
        .build();

    let mut sim = simulator_for(Backend::Atom, &program);
    for _ in 0..2000 {
        sim.tick();
    }

    assert!(sim.stats.bb_cache_smc_invalidations > 0);
    assert!(sim.stats.bb_cache_misses > 3);
}
