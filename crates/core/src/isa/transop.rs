//! `TransOp`: the three-operand micro-op every x86 instruction lowers to.

use crate::common::error::{AssistId, LightAssistId};

/// An architectural register reference. `Gpr(0..16)` are RAX..R15;
/// `Flags` is the renamed-independently condition-code register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchReg {
    Gpr(u8),
    Flags,
    /// The always-zero/constant register, never renamed to a writable slot.
    Zero,
}

/// Condition codes used by conditional branches and `cmov`-style uops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ConditionCode {
    Always,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Below,
    BelowEqual,
    Above,
    AboveEqual,
    Sign,
    NotSign,
    Overflow,
    NotOverflow,
    Parity,
    NotParity,
}

/// The operation an uop performs. Memory operands are always pre-lowered
/// into an explicit address-generation uop followed by `Load`/`Store`
/// (§4.1 "micro-op lowering rules").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    Nop,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Mul,
    Imul,
    Div,
    Idiv,
    Cmp,
    Test,
    Mov,
    Movsx,
    Movzx,
    Cmov(ConditionCode),
    /// Address generation: `dest = base + (index << shift) + disp`.
    Lea,
    Load,
    Store,
    /// Branch with a condition; `Always` for unconditional jumps.
    Branch(ConditionCode),
    /// Indirect branch (call/jmp/ret through a register or memory operand).
    BranchIndirect,
    Call,
    Ret,
    /// Memory fence: `lfence`/`sfence`/`mfence` distinguished by `FenceKind`.
    Fence(FenceKind),
    /// A microcode assist: the decoder could not, or chose not to, inline
    /// this instruction. Resolved atomically at commit (§6).
    Assist(AssistId),
    /// The decoder found a byte sequence matching no known instruction.
    /// Lowers to `Trap::InvalidOpcode` at commit.
    InvalidOpcodeFault,
    /// Instruction-fetch hit an unmapped/faulting page while decoding.
    /// Lowers to `Trap::ExecPageFault` at commit.
    ExecFault,
    /// An inline light assist: resolved at execute, never flushes (§6).
    LightAssist(LightAssistId),
    /// Placeholder for x87/FPU and SSE instructions (decoding contract only,
    /// semantic emulation out of scope — §1).
    FpAssist,
}

/// Which load/store classes a fence blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceKind {
    LoadFence,
    StoreFence,
    FullFence,
}

/// Operand size, encoded as a left-shift of 1 byte (0..3 => 1/2/4/8 bytes),
/// matching the spec's `size shift` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SizeShift(pub u8);

impl SizeShift {
    pub const BYTE: Self = Self(0);
    pub const WORD: Self = Self(1);
    pub const DWORD: Self = Self(2);
    pub const QWORD: Self = Self(3);

    #[must_use]
    pub fn bytes(self) -> u8 {
        1 << self.0
    }
}

/// A single three-operand micro-op, immutable once decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct TransOp {
    pub opcode: Opcode,
    /// Destination register, or `None` for ops with no register result
    /// (e.g. a bare `Store` or `Branch`).
    pub rd: Option<ArchReg>,
    pub ra: Option<ArchReg>,
    pub rb: Option<ArchReg>,
    pub rc: Option<ArchReg>,
    /// Immediate payload (displacement, shift count, branch target, …).
    pub imm: i64,
    pub size: SizeShift,
    pub cond: ConditionCode,
    /// Whether this uop updates the (renamed) flags register.
    pub writes_flags: bool,
    /// First uop of the x86 macro-op this uop was decoded from.
    pub som: bool,
    /// Last uop of the x86 macro-op this uop was decoded from.
    pub eom: bool,
    /// Virtual RIP of the macro-op this uop belongs to, for annul/redispatch
    /// macro-op-boundary walks (§4.7).
    pub rip: u64,
    /// Byte length of the originating x86 instruction (0 for synthetic uops
    /// introduced by lowering, e.g. the second half of a split unaligned access).
    pub insn_bytes: u8,
}

impl TransOp {
    /// A minimal ALU-shaped uop, convenient for tests and synthetic blocks.
    #[must_use]
    pub fn new(opcode: Opcode, rip: u64) -> Self {
        Self {
            opcode,
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
        }
    }

    #[must_use]
    pub fn is_load(&self) -> bool {
        matches!(self.opcode, Opcode::Load)
    }

    #[must_use]
    pub fn is_store(&self) -> bool {
        matches!(self.opcode, Opcode::Store)
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Branch(_) | Opcode::BranchIndirect | Opcode::Call | Opcode::Ret
        )
    }

    #[must_use]
    pub fn is_fence(&self) -> bool {
        matches!(self.opcode, Opcode::Fence(_))
    }

    #[must_use]
    pub fn is_assist(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Assist(_) | Opcode::InvalidOpcodeFault | Opcode::ExecFault
        )
    }
}
