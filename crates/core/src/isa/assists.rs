//! Assist classification: which instructions the decoder lowers to a
//! microcode assist (committed atomically, may flush) versus a light
//! assist (resolved inline at execute, never flushes). See spec §6.

pub use crate::common::error::{AssistId, LightAssistId};

/// Returns the microcode assist a complex-decode instruction maps to, if any.
///
/// A real decoder would dispatch on the full opcode map; this stand-in maps
/// a small representative set of x86 mnemonics that the complex-decode path
/// is responsible for (spec §4.1), sufficient to exercise the commit-time
/// assist contract end to end.
#[must_use]
pub fn microcode_assist_for_mnemonic(mnemonic: &str) -> Option<AssistId> {
    match mnemonic {
        "cpuid" => Some(AssistId::Cpuid),
        "rdtsc" => Some(AssistId::Rdtsc),
        "syscall" => Some(AssistId::Syscall),
        "sysret" => Some(AssistId::Sysret),
        "iret" | "iretq" => Some(AssistId::Iret),
        "wrmsr" => Some(AssistId::Wrmsr),
        "rdmsr" => Some(AssistId::Rdmsr),
        "mov_cr0" => Some(AssistId::WriteCr0),
        "mov_cr2" => Some(AssistId::WriteCr2),
        "mov_cr3" => Some(AssistId::WriteCr3),
        "mov_cr4" => Some(AssistId::WriteCr4),
        "ljmp" => Some(AssistId::LongJump),
        "invlpg" => Some(AssistId::InvalidatePage),
        "lldt" => Some(AssistId::LoadSegmentTable),
        "ltr" => Some(AssistId::LoadTaskRegister),
        "hlt" => Some(AssistId::Halt),
        "fxsave" => Some(AssistId::FxSave),
        "fxrstor" => Some(AssistId::FxRestore),
        "ldmxcsr" => Some(AssistId::LoadMxcsr),
        _ => None,
    }
}

/// Returns the light assist a fast/complex-decode instruction maps to, if any.
#[must_use]
pub fn light_assist_for_mnemonic(mnemonic: &str) -> Option<LightAssistId> {
    match mnemonic {
        "sti" => Some(LightAssistId::SetInterruptFlag),
        "cli" => Some(LightAssistId::ClearInterruptFlag),
        "pushf" | "pushfq" => Some(LightAssistId::PushFlags),
        "popf" | "popfq" => Some(LightAssistId::PopFlags),
        "in" => Some(LightAssistId::IoPortIn),
        "out" => Some(LightAssistId::IoPortOut),
        "pause" => Some(LightAssistId::Pause),
        "popcnt" => Some(LightAssistId::Popcnt),
        "fist" | "fistp" => Some(LightAssistId::X87Fist),
        _ => None,
    }
}
