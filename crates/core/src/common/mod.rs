//! Common types shared across the decoder, both pipelines, and the memory model.

/// Virtual/physical address newtypes.
pub mod addr;

/// Architectural fault taxonomy and translation results.
pub mod error;

/// Flat register-file storage for the `Context` test double.
pub mod reg;

/// Code-location identity (`RIPVirtPhys`) used to key the basic-block cache.
pub mod rip;

pub use addr::{PhysAddr, VirtAddr};
pub use error::{AssistId, LightAssistId, ReplayReason, TranslationResult, Trap};
pub use reg::RegisterFile;
pub use rip::{Mode, RipVirtPhys};
