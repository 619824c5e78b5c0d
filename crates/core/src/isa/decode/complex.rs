//! Complex-path decode: microcode assists and locked read-modify-write forms.
//!
//! Byte 0x40 selects a microcode assist by mnemonic id (looked up in
//! [`crate::isa::assists`]); everything else in the 0x40-0x5f range is a
//! light assist, resolved inline at execute rather than deferred to commit
//! (spec §4.1 "microcode assist vs. light assist").

use super::{Cursor, DecodeError, DecodedInsn};
use crate::common::error::{AssistId, LightAssistId};
use crate::isa::transop::{ConditionCode, Opcode, SizeShift, TransOp};

const OP_MICROCODE_ASSIST: u8 = 0x40;
const OP_LIGHT_ASSIST: u8 = 0x41;

fn assist_from_id(id: u8) -> Option<AssistId> {
    use AssistId::*;
    const TABLE: &[AssistId] = &[
        Cpuid,
        Rdtsc,
        Syscall,
        Sysret,
        Iret,
        WriteCr0,
        WriteCr2,
        WriteCr3,
        WriteCr4,
        Wrmsr,
        Rdmsr,
        LongJump,
        InvalidatePage,
        LoadSegmentTable,
        LoadTaskRegister,
        Halt,
        PushFlags,
        PopFlags,
        IoPortIn,
        IoPortOut,
        FxSave,
        FxRestore,
        LoadMxcsr,
        X87Fpu,
    ];
    TABLE.get(id as usize).copied()
}

fn light_assist_from_id(id: u8) -> Option<LightAssistId> {
    use LightAssistId::*;
    const TABLE: &[LightAssistId] = &[
        SetInterruptFlag,
        ClearInterruptFlag,
        PushFlags,
        PopFlags,
        IoPortIn,
        IoPortOut,
        Pause,
        Popcnt,
        X87Fist,
    ];
    TABLE.get(id as usize).copied()
}

pub fn decode(bytes: &[u8], rip: u64) -> Result<DecodedInsn, DecodeError> {
    let mut c = Cursor::new(bytes);
    let opcode_byte = c.take_u8()?;

    let base = TransOp {
        opcode: Opcode::Nop,
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
        insn_bytes: 0,
    };

    let uop = match opcode_byte {
        OP_MICROCODE_ASSIST => {
            let id_byte = c.take_u8()?;
            let assist = assist_from_id(id_byte).ok_or(DecodeError::InvalidOpcode)?;
            TransOp {
                opcode: Opcode::Assist(assist),
                ..base
            }
        }
        OP_LIGHT_ASSIST => {
            let id_byte = c.take_u8()?;
            let assist = light_assist_from_id(id_byte).ok_or(DecodeError::InvalidOpcode)?;
            TransOp {
                opcode: Opcode::LightAssist(assist),
                ..base
            }
        }
        _ => return Err(DecodeError::InvalidOpcode),
    };

    let consumed = c.consumed();
    let uop = TransOp {
        insn_bytes: consumed as u8,
        ..uop
    };

    Ok(DecodedInsn {
        uops: vec![uop],
        consumed,
    })
}
