//! Byte encoders for `isa::decode::fast`'s fixed-layout instruction format.
//!
//! Mirrors the opcode byte values private to `isa::decode::fast` (spec §1:
//! the byte layout is inert data, not a design target, so tests build
//! instruction streams directly against it rather than through an
//! assembler).

const OP_NOP: u8 = 0x00;
const OP_MOV_RI: u8 = 0x02;
const OP_ADD: u8 = 0x03;
const OP_CMP: u8 = 0x0b;
const OP_STORE: u8 = 0x0f;
const OP_BRANCH: u8 = 0x10;

/// Condition-code byte values (`isa::decode::fast::cond_from`).
pub mod cond {
    pub const ALWAYS: u8 = 0;
    pub const EQUAL: u8 = 1;
}

/// A byte-size shift tag (`isa::transop::SizeShift`'s raw encoding).
pub const SIZE_BYTE: u8 = 0;

/// An in-memory byte program, built instruction by instruction.
#[derive(Default)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn nop(mut self) -> Self {
        self.bytes.push(OP_NOP);
        self
    }

    #[must_use]
    pub fn mov_ri(mut self, rd: u8, imm: i64) -> Self {
        self.bytes.push(OP_MOV_RI);
        self.bytes.push(rd);
        self.bytes.extend_from_slice(&imm.to_le_bytes());
        self
    }

    #[must_use]
    pub fn add(mut self, rd: u8, ra: u8, rb: u8) -> Self {
        self.bytes.push(OP_ADD);
        self.bytes.push(rd);
        self.bytes.push(ra);
        self.bytes.push(rb);
        self
    }

    #[must_use]
    pub fn cmp(mut self, ra: u8, rb: u8) -> Self {
        self.bytes.push(OP_CMP);
        self.bytes.push(ra);
        self.bytes.push(rb);
        self
    }

    #[must_use]
    pub fn store(mut self, addr_reg: u8, src_reg: u8, size_byte: u8) -> Self {
        self.bytes.push(OP_STORE);
        self.bytes.push(addr_reg);
        self.bytes.push(src_reg);
        self.bytes.push(size_byte);
        self
    }

    /// A branch whose target is relative to the *start* of this branch
    /// instruction's own RIP (matching `Opcode::Branch`'s `rip + imm` rule).
    #[must_use]
    pub fn branch(mut self, cond_byte: u8, rel_target: i64) -> Self {
        self.bytes.push(OP_BRANCH);
        self.bytes.push(cond_byte);
        self.bytes.extend_from_slice(&rel_target.to_le_bytes());
        self
    }

    /// Pads to `len` bytes with NOPs, so a caller can line a later
    /// instruction up at a known RIP.
    #[must_use]
    pub fn pad_to(mut self, len: usize) -> Self {
        while self.bytes.len() < len {
            self.bytes.push(OP_NOP);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
