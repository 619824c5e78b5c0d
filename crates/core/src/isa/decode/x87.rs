//! x87 decode: same contract as [`super::sse`] — a single opaque `FpAssist`
//! uop per instruction, no semantic emulation (spec §1).

use super::{Cursor, DecodeError, DecodedInsn};
use crate::isa::transop::{ConditionCode, Opcode, SizeShift, TransOp};

/// x87 instructions carry a 1-byte operand descriptor (register/memory form)
/// in this synthetic encoding.
const X87_OPERAND_BYTES: usize = 1;

pub fn decode(bytes: &[u8], rip: u64) -> Result<DecodedInsn, DecodeError> {
    let mut c = Cursor::new(bytes);
    let _opcode_byte = c.take_u8()?;
    for _ in 0..X87_OPERAND_BYTES {
        c.take_u8()?;
    }

    let uop = TransOp {
        opcode: Opcode::FpAssist,
        rd: None,
        ra: None,
        rb: None,
        rc: None,
        imm: 0,
        size: SizeShift::QWORD,
        cond: ConditionCode::Always,
        writes_flags: false,
        som: true,
        eom: true,
        rip,
        insn_bytes: c.consumed() as u8,
    };

    Ok(DecodedInsn {
        uops: vec![uop],
        consumed: c.consumed(),
    })
}
