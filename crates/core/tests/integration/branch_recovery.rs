//! A data-dependent conditional branch that mispredicts against the
//! always-not-taken static predictor, and whose wrong path writes a
//! register that must never become architectural (spec §4.6 annul,
//! spec §3.4 Atom flush-on-redirect).
//!
//! Layout (byte offsets):
//! ```text
//! 0:  mov r0, 5
//! 10: mov r1, 5
//! 20: cmp r0, r1
//! 23: branch EQUAL -> 53      (taken: r0 == r1)
//! 33: mov r3, 999             (wrong path, must not commit)
//! 43: branch ALWAYS -> 43     (wrong-path halt, unreachable if correct)
//! 53: mov r3, 111             (correct landing)
//! 63: branch ALWAYS -> 63     (final halt)
//! ```

use x86sim_core::config::Backend;

use crate::common::encode::{cond, Program};
use crate::common::harness::{run_until, simulator_for};

fn program() -> Vec<u8> {
    Program::new()
        .mov_ri(0, 5)
        .mov_ri(1, 5)
        .cmp(0, 1)
        .branch(cond::EQUAL, 30) // at RIP 23, targets 23 + 30 = 53
        .mov_ri(3, 999)
        .branch(cond::ALWAYS, 0) // at RIP 43, self-halt
        .mov_ri(3, 111)
        .branch(cond::ALWAYS, 0) // at RIP 63, self-halt
        .build()
}

#[test]
fn atom_never_architecturally_commits_the_wrong_path() {
    let program = program();
    let mut sim = simulator_for(Backend::Atom, &program);
    run_until(&mut sim, 63, 1000);

    assert_eq!(sim.ctx.registers().read(3), 111);
    assert!(sim.stats.branch_mispredicts >= 1);
}

#[test]
fn ooo_never_architecturally_commits_the_wrong_path() {
    let program = program();
    let mut sim = simulator_for(Backend::OutOfOrder, &program);
    run_until(&mut sim, 63, 2000);

    assert_eq!(sim.ctx.registers().read(3), 111);
    assert!(sim.stats.branch_mispredicts >= 1);
    assert!(sim.stats.annuls >= 1);
}
