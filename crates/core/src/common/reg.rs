//! Architectural register storage for the `Context` test double.
//!
//! The pipelines never touch this directly — they address values through
//! physical registers and the commit-time rename tables. This flat array is
//! only what the host `Context` stand-in uses to hold committed state.

/// Number of general-purpose integer registers (RAX..R15).
pub const NUM_GPRS: usize = 16;

/// Flat architectural register file: 16 GPRs, RFLAGS, and RIP.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    gpr: [u64; NUM_GPRS],
    rflags: u64,
    rip: u64,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gpr: [0; NUM_GPRS],
            rflags: 0x2, // bit 1 is always set on x86
            rip: 0,
        }
    }

    #[must_use]
    pub fn read(&self, idx: usize) -> u64 {
        self.gpr[idx % NUM_GPRS]
    }

    pub fn write(&mut self, idx: usize, val: u64) {
        self.gpr[idx % NUM_GPRS] = val;
    }

    #[must_use]
    pub fn rflags(&self) -> u64 {
        self.rflags
    }

    pub fn set_rflags(&mut self, val: u64) {
        self.rflags = val;
    }

    #[must_use]
    pub fn rip(&self) -> u64 {
        self.rip
    }

    pub fn set_rip(&mut self, val: u64) {
        self.rip = val;
    }

    pub fn dump(&self) {
        for (i, v) in self.gpr.iter().enumerate() {
            eprintln!("r{i:<2} = {v:#018x}");
        }
        eprintln!("rflags = {:#018x}", self.rflags);
        eprintln!("rip    = {:#018x}", self.rip);
    }
}
