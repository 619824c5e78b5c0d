//! A straight-line arithmetic sequence run to completion on the in-order
//! "Atom" backend, ending in a self-branch that the driver treats as a
//! stable halt point (spec §3).

use x86sim_core::config::Backend;

use crate::common::encode::{cond, Program};
use crate::common::harness::{run_until, simulator_for};

#[test]
fn add_of_two_immediates_commits_architecturally() {
    // mov_ri x2 (10 bytes each) + add (4 bytes) lands the halting branch at
    // RIP 24; it targets itself (rip + imm, imm = 0).
    let halt_addr = 24u64;
    let program = Program::new()
        .mov_ri(0, 5)
        .mov_ri(1, 7)
        .add(2, 0, 1)
        .branch(cond::ALWAYS, 0)
        .build();
    assert_eq!(program.len(), halt_addr as usize + 10);

    let mut sim = simulator_for(Backend::Atom, &program);
    run_until(&mut sim, halt_addr, 500);

    assert_eq!(sim.ctx.registers().rip(), halt_addr);
    assert_eq!(sim.ctx.registers().read(2), 12);
    assert!(sim.stats.macro_ops_committed >= 3);
}
