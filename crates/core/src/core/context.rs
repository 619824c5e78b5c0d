//! `Context`: the host architectural-state collaborator (spec §6).
//!
//! Out of scope as a design target — the pipeline only needs a place to
//! fetch instruction bytes from and a place to deliver committed state and
//! faults to. `TestContext` is a minimal in-memory stand-in used by tests
//! and the CLI's single-process run mode.

use std::collections::HashMap;

use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::error::Trap;
use crate::common::reg::RegisterFile;

/// The host-provided architectural state and byte-level memory the
/// pipeline reads instructions from and commits results into.
pub trait Context {
    /// Reads up to `len` instruction bytes starting at `vaddr`. Returns
    /// fewer bytes than requested at the end of mapped memory (the decoder
    /// treats that as an exec-page-fault boundary, spec §4.1).
    fn fetch_bytes(&self, vaddr: VirtAddr, len: usize) -> Vec<u8>;

    fn translate(&self, vaddr: VirtAddr, is_write: bool, is_exec: bool) -> Result<PhysAddr, Trap>;

    fn read_memory(&self, paddr: PhysAddr, len: usize) -> u64;

    fn write_memory(&mut self, paddr: PhysAddr, value: u64, len: usize);

    fn registers(&self) -> &RegisterFile;

    fn registers_mut(&mut self) -> &mut RegisterFile;

    /// Delivers a committed architectural fault to the host, in program order.
    fn deliver_trap(&mut self, trap: Trap);

    /// Notifies the host that a store at `paddr` committed, so it can
    /// invalidate any basic blocks caching code at that frame (spec §4.1 SMC).
    fn notify_store(&mut self, paddr: PhysAddr);
}

/// A flat byte-addressable memory and register file, with a simple
/// identity virtual-to-physical mapping. Sufficient for unit tests and the
/// CLI's single-process mode; not a faithful MMU (the real translation
/// logic lives in `core::units::mmu`, exercised separately).
#[derive(Default)]
pub struct TestContext {
    pub memory: HashMap<u64, u8>,
    pub regs: RegisterFile,
    pub delivered_traps: Vec<Trap>,
    pub stores_notified: Vec<PhysAddr>,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_bytes(&mut self, at: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(at + i as u64, *b);
        }
    }
}

impl Context for TestContext {
    fn fetch_bytes(&self, vaddr: VirtAddr, len: usize) -> Vec<u8> {
        (0..len as u64)
            .map(|i| *self.memory.get(&(vaddr.val() + i)).unwrap_or(&0))
            .collect()
    }

    fn translate(
        &self,
        vaddr: VirtAddr,
        _is_write: bool,
        _is_exec: bool,
    ) -> Result<PhysAddr, Trap> {
        Ok(PhysAddr(vaddr.val()))
    }

    fn read_memory(&self, paddr: PhysAddr, len: usize) -> u64 {
        let mut value = 0u64;
        for i in 0..len.min(8) {
            let byte = *self.memory.get(&(paddr.val() + i as u64)).unwrap_or(&0);
            value |= u64::from(byte) << (i * 8);
        }
        value
    }

    fn write_memory(&mut self, paddr: PhysAddr, value: u64, len: usize) {
        for i in 0..len.min(8) {
            let byte = ((value >> (i * 8)) & 0xff) as u8;
            self.memory.insert(paddr.val() + i as u64, byte);
        }
        self.notify_store(paddr);
    }

    fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    fn deliver_trap(&mut self, trap: Trap) {
        self.delivered_traps.push(trap);
    }

    fn notify_store(&mut self, paddr: PhysAddr) {
        self.stores_notified.push(paddr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_bytes_reads_loaded_memory() {
        let mut ctx = TestContext::new();
        ctx.load_bytes(0x1000, &[0xaa, 0xbb, 0xcc]);
        assert_eq!(ctx.fetch_bytes(VirtAddr(0x1000), 3), vec![0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn write_memory_notifies_store() {
        let mut ctx = TestContext::new();
        ctx.write_memory(PhysAddr(0x2000), 0x1234, 4);
        assert_eq!(ctx.stores_notified, vec![PhysAddr(0x2000)]);
        assert_eq!(ctx.read_memory(PhysAddr(0x2000), 4), 0x1234);
    }
}
