//! The same straight-line arithmetic sequence as `atom_arithmetic`, run on
//! the out-of-order backend (ROB/rename/LSQ/issue queue) instead, to
//! confirm both backends reach identical architectural state (spec §4).

use x86sim_core::config::Backend;

use crate::common::encode::{cond, Program};
use crate::common::harness::{run_until, simulator_for};

#[test]
fn add_of_two_immediates_commits_architecturally() {
    let halt_addr = 24u64;
    let program = Program::new()
        .mov_ri(0, 5)
        .mov_ri(1, 7)
        .add(2, 0, 1)
        .branch(cond::ALWAYS, 0)
        .build();
    assert_eq!(program.len(), halt_addr as usize + 10);

    let mut sim = simulator_for(Backend::OutOfOrder, &program);
    run_until(&mut sim, halt_addr, 2000);

    assert_eq!(sim.ctx.registers().rip(), halt_addr);
    assert_eq!(sim.ctx.registers().read(2), 12);
    assert!(sim.stats.macro_ops_committed >= 3);
}
