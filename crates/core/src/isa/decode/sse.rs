//! SSE decode: every instruction in this class lowers to a single opaque
//! `FpAssist` uop. Full SSE semantic emulation is out of scope (spec §1);
//! the decoder only needs to preserve basic-block boundaries and byte
//! accounting around these instructions.

use super::{Cursor, DecodeError, DecodedInsn};
use crate::isa::transop::{ConditionCode, Opcode, SizeShift, TransOp};

/// Fixed operand width for the synthetic SSE encoding: opcode byte plus a
/// 2-byte operand descriptor, matching the teacher's "decode tables are
/// data" stance — only the lowering contract (one `FpAssist` uop) matters.
const SSE_OPERAND_BYTES: usize = 2;

pub fn decode(bytes: &[u8], rip: u64) -> Result<DecodedInsn, DecodeError> {
    let mut c = Cursor::new(bytes);
    let _opcode_byte = c.take_u8()?;
    for _ in 0..SSE_OPERAND_BYTES {
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
