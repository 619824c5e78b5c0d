//! Fast-path decode: simple ALU, mov, lea, load/store, and branch instructions.
//!
//! Operates on a small fixed-layout instruction byte format — the real x86
//! opcode maps are treated as inert data per spec §1 ("not part of the
//! design to reproduce"); what matters here is the lowering *rules* §4.1
//! describes (explicit address-generation before load/store, locked RMW
//! fenced on both sides, flags written by ALU ops) rather than faithfully
//! reproducing the legacy encoding.

use super::{Cursor, DecodeError, DecodedInsn};
use crate::isa::transop::{ArchReg, ConditionCode, FenceKind, Opcode, SizeShift, TransOp};

const OP_NOP: u8 = 0x00;
const OP_MOV_RR: u8 = 0x01;
const OP_MOV_RI: u8 = 0x02;
const OP_ADD: u8 = 0x03;
const OP_SUB: u8 = 0x04;
const OP_AND: u8 = 0x05;
const OP_OR: u8 = 0x06;
const OP_XOR: u8 = 0x07;
const OP_SHL: u8 = 0x08;
const OP_SHR: u8 = 0x09;
const OP_SAR: u8 = 0x0a;
const OP_CMP: u8 = 0x0b;
const OP_TEST: u8 = 0x0c;
const OP_LEA: u8 = 0x0d;
const OP_LOAD: u8 = 0x0e;
const OP_STORE: u8 = 0x0f;
const OP_BRANCH: u8 = 0x10;
const OP_BRANCH_INDIRECT: u8 = 0x11;
const OP_CALL: u8 = 0x12;
const OP_RET: u8 = 0x13;
const OP_FENCE: u8 = 0x14;
const OP_LOCKED_RMW: u8 = 0x15;

fn reg(byte: u8) -> Option<ArchReg> {
    if byte == 0xff {
        None
    } else {
        Some(ArchReg::Gpr(byte & 0x0f))
    }
}

fn cond_from(byte: u8) -> ConditionCode {
    match byte {
        0 => ConditionCode::Always,
        1 => ConditionCode::Equal,
        2 => ConditionCode::NotEqual,
        3 => ConditionCode::Less,
        4 => ConditionCode::LessEqual,
        5 => ConditionCode::Greater,
        6 => ConditionCode::GreaterEqual,
        7 => ConditionCode::Below,
        8 => ConditionCode::BelowEqual,
        9 => ConditionCode::Above,
        10 => ConditionCode::AboveEqual,
        11 => ConditionCode::Sign,
        12 => ConditionCode::NotSign,
        13 => ConditionCode::Overflow,
        14 => ConditionCode::NotOverflow,
        15 => ConditionCode::Parity,
        _ => ConditionCode::NotParity,
    }
}

fn fence_kind(byte: u8) -> FenceKind {
    match byte {
        0 => FenceKind::LoadFence,
        1 => FenceKind::StoreFence,
        _ => FenceKind::FullFence,
    }
}

pub fn decode(bytes: &[u8], rip: u64) -> Result<DecodedInsn, DecodeError> {
    let mut c = Cursor::new(bytes);
    let opcode_byte = c.take_u8()?;

    let mut op = |opcode: Opcode, rd, ra, rb, rc, imm, writes_flags| TransOp {
        opcode,
        rd,
        ra,
        rb,
        rc,
        imm,
        size: SizeShift::QWORD,
        cond: ConditionCode::Always,
        writes_flags,
        som: true,
        eom: true,
        rip,
        insn_bytes: 0,
    };

    let mut uops: Vec<TransOp> = Vec::new();

    match opcode_byte {
        OP_NOP => uops.push(op(Opcode::Nop, None, None, None, None, 0, false)),
        OP_MOV_RR => {
            let rd = reg(c.take_u8()?);
            let ra = reg(c.take_u8()?);
            uops.push(op(Opcode::Mov, rd, ra, None, None, 0, false));
        }
        OP_MOV_RI => {
            let rd = reg(c.take_u8()?);
            let imm = c.take_i64()?;
            uops.push(op(Opcode::Mov, rd, None, None, None, imm, false));
        }
        OP_ADD | OP_SUB | OP_AND | OP_OR | OP_XOR => {
            let rd = reg(c.take_u8()?);
            let ra = reg(c.take_u8()?);
            let rb = reg(c.take_u8()?);
            let opcode = match opcode_byte {
                OP_ADD => Opcode::Add,
                OP_SUB => Opcode::Sub,
                OP_AND => Opcode::And,
                OP_OR => Opcode::Or,
                _ => Opcode::Xor,
            };
            uops.push(op(opcode, rd, ra, rb, None, 0, true));
        }
        OP_SHL | OP_SHR | OP_SAR => {
            let rd = reg(c.take_u8()?);
            let ra = reg(c.take_u8()?);
            let shift_amount = i64::from(c.take_u8()?);
            let opcode = match opcode_byte {
                OP_SHL => Opcode::Shl,
                OP_SHR => Opcode::Shr,
                _ => Opcode::Sar,
            };
            uops.push(op(opcode, rd, ra, None, None, shift_amount, true));
        }
        OP_CMP | OP_TEST => {
            let ra = reg(c.take_u8()?);
            let rb = reg(c.take_u8()?);
            let opcode = if opcode_byte == OP_CMP {
                Opcode::Cmp
            } else {
                Opcode::Test
            };
            uops.push(op(opcode, None, ra, rb, None, 0, true));
        }
        OP_LEA => {
            let rd = reg(c.take_u8()?);
            let base = reg(c.take_u8()?);
            let index = reg(c.take_u8()?);
            let shift = i64::from(c.take_u8()?);
            let disp = c.take_i64()?;
            // spec §4.1: memory operands lower to explicit address-gen (add/adda).
            uops.push(TransOp {
                imm: disp + (shift << 32),
                ..op(Opcode::Lea, rd, base, index, None, 0, false)
            });
        }
        OP_LOAD => {
            let rd = reg(c.take_u8()?);
            let addr = reg(c.take_u8()?);
            let size_byte = c.take_u8()?;
            uops.push(TransOp {
                size: SizeShift(size_byte & 0x3),
                ..op(Opcode::Load, rd, addr, None, None, 0, false)
            });
        }
        OP_STORE => {
            let addr = reg(c.take_u8()?);
            let src = reg(c.take_u8()?);
            let size_byte = c.take_u8()?;
            uops.push(TransOp {
                size: SizeShift(size_byte & 0x3),
                ..op(Opcode::Store, None, addr, src, None, 0, false)
            });
        }
        OP_BRANCH => {
            let cond_byte = c.take_u8()?;
            let target = c.take_i64()?;
            uops.push(op(
                Opcode::Branch(cond_from(cond_byte)),
                None,
                None,
                None,
                None,
                target,
                false,
            ));
        }
        OP_BRANCH_INDIRECT => {
            let target_reg = reg(c.take_u8()?);
            uops.push(op(
                Opcode::BranchIndirect,
                None,
                target_reg,
                None,
                None,
                0,
                false,
            ));
        }
        OP_CALL => {
            let target = c.take_i64()?;
            uops.push(op(Opcode::Call, None, None, None, None, target, false));
        }
        OP_RET => uops.push(op(Opcode::Ret, None, None, None, None, 0, false)),
        OP_FENCE => {
            let kind_byte = c.take_u8()?;
            uops.push(op(
                Opcode::Fence(fence_kind(kind_byte)),
                None,
                None,
                None,
                None,
                0,
                false,
            ));
        }
        OP_LOCKED_RMW => {
            // spec §4.5: locked RMW instructions are always paired with a
            // fence on both sides.
            let rd = reg(c.take_u8()?);
            let ra = reg(c.take_u8()?);
            let rb = reg(c.take_u8()?);
            uops.push(op(
                Opcode::Fence(FenceKind::FullFence),
                None,
                None,
                None,
                None,
                0,
                false,
            ));
            uops.push(op(Opcode::Add, rd, ra, rb, None, 0, true));
            uops.push(op(
                Opcode::Fence(FenceKind::FullFence),
                None,
                None,
                None,
                None,
                0,
                false,
            ));
        }
        _ => return Err(DecodeError::InvalidOpcode),
    }

    if let Some(first) = uops.first_mut() {
        first.som = true;
    }
    let consumed = c.consumed();
    if let Some(last) = uops.last_mut() {
        last.eom = true;
        last.insn_bytes = consumed as u8;
    }
    for u in uops.iter_mut().rev().skip(1) {
        u.eom = false;
    }
    for u in uops.iter_mut().skip(1) {
        u.som = false;
    }

    Ok(DecodedInsn { uops, consumed })
}
