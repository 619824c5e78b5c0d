//! The decode loop: turns a byte stream at a RIP into a [`BasicBlock`](crate::isa::basicblock::BasicBlock).
//!
//! Dispatches each instruction to one of four subroutines selected by
//! [`tables::class_of`] on the first byte, appends the resulting `TransOp`s,
//! and stops at a branch, an assist, or a configured resource limit (§4.1
//! "Basic-block boundaries").

pub mod complex;
pub mod fast;
pub mod sse;
pub mod tables;
pub mod x87;

use crate::config::DecodeConfig;
use crate::isa::basicblock::BranchType;
use crate::isa::transop::{Opcode, TransOp};
use tables::DecodeClass;

/// A failure while decoding a single instruction. Distinguished from a
/// `Trap` because whether it becomes `InvalidOpcode` or `ExecPageFault`
/// depends on whether the cursor ran past the supplied byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The opcode byte (or one of its operand bytes) does not encode a
    /// known instruction.
    InvalidOpcode,
    /// The cursor needed more bytes than the caller supplied — the caller
    /// is expected to detect whether this means "page boundary" (triggers
    /// an exec page fault) or "end of a deliberately short test buffer".
    OutOfBytes,
}

/// A cursor over the raw instruction-byte stream, tracking consumption so
/// the block decode loop knows how many bytes each instruction used.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn take_u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.bytes.get(self.pos).ok_or(DecodeError::OutOfBytes)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn take_i64(&mut self) -> Result<i64, DecodeError> {
        let end = self.pos + 8;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::OutOfBytes)?;
        self.pos = end;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(slice);
        Ok(i64::from_le_bytes(buf))
    }

    #[must_use]
    pub fn consumed(&self) -> usize {
        self.pos
    }
}

/// Result of decoding exactly one x86 instruction.
pub struct DecodedInsn {
    pub uops: Vec<TransOp>,
    pub consumed: usize,
}

fn decode_one(bytes: &[u8], rip: u64) -> Result<DecodedInsn, DecodeError> {
    let opcode_byte = *bytes.first().ok_or(DecodeError::OutOfBytes)?;
    match tables::class_of(opcode_byte) {
        DecodeClass::Fast => fast::decode(bytes, rip),
        DecodeClass::Complex => complex::decode(bytes, rip),
        DecodeClass::Sse => sse::decode(bytes, rip),
        DecodeClass::X87 => x87::decode(bytes, rip),
        DecodeClass::Invalid => Err(DecodeError::InvalidOpcode),
    }
}

/// Decode a basic block starting at `rip` out of `bytes` (already relocated
/// so `bytes[0]` is the byte at `rip`). `identity` is attached to the result
/// by the caller (the decoder itself has no notion of physical frames).
///
/// Stops at: a branch/call/ret, an assist, exceeding `max_bb_uops`, or
/// running out of `bytes` (treated as an exec-page-fault boundary by the
/// caller, which decides whether to re-fetch or fault).
pub fn decode_block(bytes: &[u8], rip: u64, cfg: &DecodeConfig) -> DecodedBlockResult {
    let mut uops = Vec::new();
    let mut offset = 0usize;
    let mut cur_rip = rip;

    loop {
        if offset >= cfg.max_bb_bytes || uops.len() >= cfg.max_bb_uops {
            return DecodedBlockResult {
                uops,
                byte_length: offset,
                branch_type: BranchType::Split,
                fault: None,
            };
        }
        let remaining = &bytes[offset.min(bytes.len())..];
        match decode_one(remaining, cur_rip) {
            Ok(insn) => {
                let consumed = insn.consumed.max(1);
                let terminal = insn.uops.last().map(|u| {
                    if u.is_branch() {
                        Some(branch_type_of(u))
                    } else if u.is_assist() {
                        Some(BranchType::Assist)
                    } else {
                        None
                    }
                });
                uops.extend(insn.uops);
                offset += consumed;
                cur_rip += consumed as u64;
                if let Some(Some(bt)) = terminal {
                    return DecodedBlockResult {
                        uops,
                        byte_length: offset,
                        branch_type: bt,
                        fault: None,
                    };
                }
            }
            Err(DecodeError::InvalidOpcode) => {
                uops.push(TransOp::new(Opcode::InvalidOpcodeFault, cur_rip));
                return DecodedBlockResult {
                    uops,
                    byte_length: offset,
                    branch_type: BranchType::Assist,
                    fault: Some(DecodeError::InvalidOpcode),
                };
            }
            Err(DecodeError::OutOfBytes) => {
                if offset == 0 {
                    uops.push(TransOp::new(Opcode::ExecFault, cur_rip));
                    return DecodedBlockResult {
                        uops,
                        byte_length: offset,
                        branch_type: BranchType::Assist,
                        fault: Some(DecodeError::OutOfBytes),
                    };
                }
                return DecodedBlockResult {
                    uops,
                    byte_length: offset,
                    branch_type: BranchType::Split,
                    fault: None,
                };
            }
        }
    }
}

fn branch_type_of(u: &TransOp) -> BranchType {
    match u.opcode {
        Opcode::Branch(crate::isa::transop::ConditionCode::Always) => BranchType::Unconditional,
        Opcode::Branch(_) => BranchType::Conditional,
        Opcode::BranchIndirect | Opcode::Call | Opcode::Ret => BranchType::Indirect,
        _ => BranchType::Unconditional,
    }
}

/// Output of decoding one basic block's worth of instructions.
pub struct DecodedBlockResult {
    pub uops: Vec<TransOp>,
    pub byte_length: usize,
    pub branch_type: BranchType,
    /// Set if the block ended because of a decode fault rather than a
    /// natural branch/budget boundary.
    pub fault: Option<DecodeError>,
}
